//! Parallel job limits and usage of the organisation's self-hosted pools.

use crate::batch::{FamilyDesc, MetricBatch};
use crate::error::CollectError;
use crate::plugins::CollectContext;

pub const RESOURCE_USAGE_BUILD: FamilyDesc = FamilyDesc {
    name: "azure_devops_resourceusage_build",
    help: "Azure DevOps build parallelism usage and limits",
    labels: &["name"],
};

pub const FAMILIES: &[FamilyDesc] = &[RESOURCE_USAGE_BUILD];

pub async fn collect(ctx: &CollectContext) -> Result<MetricBatch, CollectError> {
    let usage = ctx.client.build_resource_usage("Private", true).await?;
    let limit = &usage.resource_limit;

    let values = [
        ("totalCount", limit.total_count as f64),
        ("totalMinutes", limit.total_minutes as f64),
        ("usedCount", usage.used_count as f64),
        ("usedMinutes", usage.used_minutes as f64),
        ("runningRequests", usage.running_requests.len() as f64),
        ("isPremium", if limit.is_premium { 1.0 } else { 0.0 }),
    ];

    let mut batch = MetricBatch::new();
    for (name, value) in values {
        batch.add_gauge(&RESOURCE_USAGE_BUILD, [("name", name.to_string())], value);
    }
    Ok(batch)
}
