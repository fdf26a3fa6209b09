//! Saved work item queries.

use azdo_client::models::WorkItem;

use crate::batch::{FamilyDesc, MetricBatch};
use crate::error::CollectError;
use crate::plugins::CollectContext;
use crate::resource::QueryTarget;

pub const QUERY_RESULT: FamilyDesc = FamilyDesc {
    name: "azure_devops_query_result",
    help: "Azure DevOps work item returned by a saved query",
    labels: &[
        "projectID",
        "queryID",
        "workItemID",
        "title",
        "workItemType",
        "state",
        "assignedTo",
    ],
};

pub const QUERY_RESULT_COUNT: FamilyDesc = FamilyDesc {
    name: "azure_devops_query_result_count",
    help: "Azure DevOps number of work items returned by a saved query",
    labels: &["projectID", "queryID"],
};

pub const FAMILIES: &[FamilyDesc] = &[QUERY_RESULT, QUERY_RESULT_COUNT];

const FIELDS: &[&str] = &[
    "System.Title",
    "System.WorkItemType",
    "System.State",
    "System.AssignedTo",
];

pub async fn collect(ctx: &CollectContext, query: &QueryTarget) -> Result<MetricBatch, CollectError> {
    let result = ctx
        .client
        .run_saved_query(&query.project_id, &query.query_id)
        .await?;

    let ids: Vec<i64> = result
        .work_items
        .iter()
        .take(ctx.limits.work_items_per_query)
        .map(|w| w.id)
        .collect();
    let items = if ids.is_empty() {
        Vec::new()
    } else {
        ctx.client
            .get_work_items(&query.project_id, &ids, FIELDS)
            .await?
    };

    let mut batch = MetricBatch::new();
    batch.add_gauge(
        &QUERY_RESULT_COUNT,
        [
            ("projectID", query.project_id.clone()),
            ("queryID", query.query_id.clone()),
        ],
        result.work_items.len() as f64,
    );
    for item in &items {
        add_work_item(&mut batch, query, item);
    }

    Ok(batch)
}

fn add_work_item(batch: &mut MetricBatch, query: &QueryTarget, item: &WorkItem) {
    batch.add_info(
        &QUERY_RESULT,
        [
            ("projectID", query.project_id.clone()),
            ("queryID", query.query_id.clone()),
            ("workItemID", item.id.to_string()),
            ("title", item.field("System.Title")),
            ("workItemType", item.field("System.WorkItemType")),
            ("state", item.field("System.State")),
            ("assignedTo", item.field("System.AssignedTo")),
        ],
    );
}
