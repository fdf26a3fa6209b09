use chrono::{DateTime, Utc};
use futures::{StreamExt, TryStreamExt};

use super::time_param;
use crate::client::{ApiClient, Host};
use crate::error::Result;
use crate::models::{Deployment, Release, ReleaseDefinition};
use crate::page::retain_most_recent;

impl ApiClient {
    /// Release definitions of a project, at most `limit`.
    pub async fn list_release_definitions(
        &self,
        project_id: &str,
        limit: usize,
    ) -> Result<Vec<ReleaseDefinition>> {
        let path = format!("{project_id}/_apis/release/definitions");
        let params = vec![("$top", limit.to_string())];
        self.list_all(Host::Release, path, params)
            .take(limit)
            .try_collect()
            .await
    }

    /// The `limit` most recently created releases of a definition since
    /// `since`, with environments and artifacts expanded. Ranked by creation
    /// time over the whole window.
    pub async fn list_releases(
        &self,
        project_id: &str,
        definition_id: i64,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<Release>> {
        let path = format!("{project_id}/_apis/release/releases");
        let params = vec![
            ("definitionId", definition_id.to_string()),
            ("minCreatedTime", time_param(since)),
            ("queryOrder", "descending".to_string()),
            ("$expand", "environments,artifacts".to_string()),
        ];
        let releases = self.collect_all(Host::Release, &path, params).await?;
        Ok(retain_most_recent(releases, limit, |r: &Release| r.created_on))
    }

    /// The `limit` most recently queued deployments of a release definition.
    /// Ranked by queue time over everything the server returns, bounded by
    /// `max_records`.
    pub async fn list_release_deployments(
        &self,
        project_id: &str,
        definition_id: i64,
        limit: usize,
    ) -> Result<Vec<Deployment>> {
        let path = format!("{project_id}/_apis/release/deployments");
        let params = vec![
            ("definitionId", definition_id.to_string()),
            ("queryOrder", "descending".to_string()),
        ];
        let deployments = self.collect_all(Host::Release, &path, params).await?;
        Ok(retain_most_recent(deployments, limit, |d: &Deployment| d.queued_on))
    }
}
