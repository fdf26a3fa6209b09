use azdo_client::models::Project;

use crate::batch::{FamilyDesc, MetricBatch};

pub const PROJECT_INFO: FamilyDesc = FamilyDesc {
    name: "azure_devops_project_info",
    help: "Azure DevOps project",
    labels: &["projectID", "projectName"],
};

pub const FAMILIES: &[FamilyDesc] = &[PROJECT_INFO];

/// Project info comes straight from the discovery snapshot.
pub fn collect(project: &Project) -> MetricBatch {
    let mut batch = MetricBatch::new();
    batch.add_info(
        &PROJECT_INFO,
        [
            ("projectID", project.id.clone()),
            ("projectName", project.name.clone()),
        ],
    );
    batch
}
