use crate::client::{ApiClient, Host};
use crate::error::Result;
use crate::models::{WiqlResult, WorkItem};

/// Largest id list the work item batch endpoint accepts.
const WORK_ITEM_BATCH: usize = 200;

impl ApiClient {
    /// Run a saved WIQL query and return the matching work item references.
    pub async fn run_saved_query(&self, project_id: &str, query_id: &str) -> Result<WiqlResult> {
        let path = format!("{project_id}/_apis/wit/wiql/{query_id}");
        self.get_object(Host::Core, &path, &[]).await
    }

    /// Fetch work items by id, in batches, keeping the order of `ids`.
    pub async fn get_work_items(
        &self,
        project_id: &str,
        ids: &[i64],
        fields: &[&str],
    ) -> Result<Vec<WorkItem>> {
        let path = format!("{project_id}/_apis/wit/workitems");
        let mut items = Vec::with_capacity(ids.len());

        for chunk in ids.chunks(WORK_ITEM_BATCH) {
            let ids = chunk
                .iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",");

            let mut params = vec![("ids", ids)];
            if !fields.is_empty() {
                params.push(("fields", fields.join(",")));
            }

            let page = self.get::<WorkItem>(Host::Core, &path, &params).await?;
            items.extend(page.items);
        }

        Ok(items)
    }
}
