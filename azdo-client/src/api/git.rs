use chrono::{DateTime, Utc};

use super::time_param;
use crate::client::{ApiClient, Host};
use crate::error::Result;
use crate::models::{Commit, PullRequest, Push, Repository};

impl ApiClient {
    /// Git repositories of a project.
    pub async fn list_repositories(&self, project_id: &str) -> Result<Vec<Repository>> {
        let path = format!("{project_id}/_apis/git/repositories");
        self.collect_all(Host::Core, &path, Vec::new()).await
    }

    /// Commits of a repository since `since`, across all branches.
    pub async fn list_commits_since(
        &self,
        project_id: &str,
        repository_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Commit>> {
        let path = format!("{project_id}/_apis/git/repositories/{repository_id}/commits");
        let params = vec![("searchCriteria.fromDate", time_param(since))];
        self.collect_all(Host::Core, &path, params).await
    }

    /// Pushes to a repository since `since`.
    pub async fn list_pushes_since(
        &self,
        project_id: &str,
        repository_id: &str,
        since: DateTime<Utc>,
    ) -> Result<Vec<Push>> {
        let path = format!("{project_id}/_apis/git/repositories/{repository_id}/pushes");
        let params = vec![("searchCriteria.fromDate", time_param(since))];
        self.collect_all(Host::Core, &path, params).await
    }

    /// Pull requests of a project in the given state (`active`, `completed`, ...).
    pub async fn list_pull_requests(
        &self,
        project_id: &str,
        status: &str,
    ) -> Result<Vec<PullRequest>> {
        let path = format!("{project_id}/_apis/git/pullrequests");
        let params = vec![("searchCriteria.status", status.to_string())];
        self.collect_all(Host::Core, &path, params).await
    }
}
