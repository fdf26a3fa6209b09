use azdo_client::models::Project;

use crate::batch::{FamilyDesc, MetricBatch};
use crate::error::CollectError;
use crate::plugins::CollectContext;
use crate::plugins::build::{BUILD_INFO_LABELS, BUILD_STATUS_LABELS, add_status, info_labels};

pub const LATEST_INFO: FamilyDesc = FamilyDesc {
    name: "azure_devops_build_latest_info",
    help: "Azure DevOps latest build of each definition",
    labels: BUILD_INFO_LABELS,
};

pub const LATEST_STATUS: FamilyDesc = FamilyDesc {
    name: "azure_devops_build_latest_status",
    help: "Azure DevOps latest build status (timestamps and duration in seconds)",
    labels: BUILD_STATUS_LABELS,
};

pub const FAMILIES: &[FamilyDesc] = &[LATEST_INFO, LATEST_STATUS];

/// The most recent build of every definition in the project.
pub async fn collect(ctx: &CollectContext, project: &Project) -> Result<MetricBatch, CollectError> {
    let builds = ctx.client.list_latest_builds(&project.id).await?;

    let mut batch = MetricBatch::new();
    for build in &builds {
        batch.add_info(&LATEST_INFO, info_labels(&project.id, build));
        add_status(&mut batch, &LATEST_STATUS, &project.id, build);
    }

    Ok(batch)
}
