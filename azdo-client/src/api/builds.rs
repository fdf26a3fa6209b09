use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};

use super::time_param;
use crate::client::{ApiClient, Host};
use crate::error::Result;
use crate::models::{Build, BuildDefinition, Timeline};
use crate::page::retain_most_recent;

impl ApiClient {
    /// The most recent build of every definition in a project.
    pub async fn list_latest_builds(&self, project_id: &str) -> Result<Vec<Build>> {
        let path = format!("{project_id}/_apis/build/builds");
        let params = vec![
            ("maxBuildsPerDefinition", "1".to_string()),
            ("queryOrder", "queueTimeDescending".to_string()),
        ];
        self.collect_all(Host::Core, &path, params).await
    }

    /// The `limit` most recently queued builds since `since`.
    ///
    /// The whole window is read (bounded by `max_records`) and ranked by
    /// queue time, so the result does not depend on the server's order.
    pub async fn list_builds(
        &self,
        project_id: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Build>> {
        let path = format!("{project_id}/_apis/build/builds");
        let params = vec![
            ("minTime", time_param(since)),
            ("queryOrder", "queueTimeDescending".to_string()),
        ];
        let builds = self.collect_all(Host::Core, &path, params).await?;
        Ok(retain_most_recent(builds, limit, |b: &Build| b.queue_time))
    }

    /// Build definitions of a project, at most `limit`.
    pub async fn list_build_definitions(
        &self,
        project_id: &str,
        limit: usize,
    ) -> Result<Vec<BuildDefinition>> {
        let path = format!("{project_id}/_apis/build/definitions");
        let params = vec![
            ("includeLatestBuilds", "false".to_string()),
            ("$top", limit.to_string()),
        ];
        self.list_all(Host::Core, path, params)
            .take(limit)
            .try_collect()
            .await
    }

    /// Stage, job and task records of one build.
    pub async fn build_timeline(&self, project_id: &str, build_id: i64) -> Result<Timeline> {
        let path = format!("{project_id}/_apis/build/builds/{build_id}/timeline");
        self.get_object(Host::Core, &path, &[]).await
    }
}
