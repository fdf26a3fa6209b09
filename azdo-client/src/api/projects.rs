use futures::{StreamExt, TryStreamExt};

use crate::client::{ApiClient, Host};
use crate::error::Result;
use crate::models::Project;

impl ApiClient {
    /// Projects of the organisation, at most `limit`.
    pub async fn list_projects(&self, limit: usize) -> Result<Vec<Project>> {
        self.list_all(Host::Core, "_apis/projects", vec![("$top", limit.to_string())])
            .take(limit)
            .try_collect()
            .await
    }
}
