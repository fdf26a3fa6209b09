use crate::client::{ApiClient, Host};
use crate::error::Result;
use crate::models::{Agent, AgentPool, JobRequest, ResourceUsage};

impl ApiClient {
    /// Agent pools of the organisation.
    pub async fn list_agent_pools(&self) -> Result<Vec<AgentPool>> {
        self.collect_all(Host::Core, "_apis/distributedtask/pools", Vec::new())
            .await
    }

    /// Agents of a pool, each with the job it is currently running.
    pub async fn list_agents(&self, pool_id: i64) -> Result<Vec<Agent>> {
        let path = format!("_apis/distributedtask/pools/{pool_id}/agents");
        let params = vec![
            ("includeCapabilities", "false".to_string()),
            ("includeAssignedRequest", "true".to_string()),
        ];
        self.collect_all(Host::Core, &path, params).await
    }

    /// Job requests (queued, running and recently finished) of a pool.
    pub async fn list_agent_pool_jobs(&self, pool_id: i64) -> Result<Vec<JobRequest>> {
        let path = format!("_apis/distributedtask/pools/{pool_id}/jobrequests");
        self.collect_all(Host::Core, &path, Vec::new()).await
    }

    /// Parallel job usage and limits for one parallelism tag.
    pub async fn build_resource_usage(
        &self,
        parallelism_tag: &str,
        hosted: bool,
    ) -> Result<ResourceUsage> {
        let params = [
            ("parallelismTag", parallelism_tag.to_string()),
            ("poolIsHosted", hosted.to_string()),
            ("includeRunningRequests", "true".to_string()),
        ];
        self.get_object(Host::Core, "_apis/distributedtask/resourceusage", &params)
            .await
    }
}
