//! Release deployments, per release definition.

use azdo_client::models::{Deployment, Project};

use crate::batch::{FamilyDesc, MetricBatch, elapsed};
use crate::error::CollectError;
use crate::plugins::CollectContext;

pub const DEPLOYMENT_INFO: FamilyDesc = FamilyDesc {
    name: "azure_devops_deployment_info",
    help: "Azure DevOps deployment",
    labels: &[
        "projectID",
        "deploymentID",
        "releaseID",
        "releaseName",
        "releaseDefinitionID",
        "requestedBy",
        "deploymentName",
        "deploymentStatus",
        "operationStatus",
        "reason",
        "attempt",
        "environmentId",
        "environmentName",
        "approvedBy",
    ],
};

pub const DEPLOYMENT_STATUS: FamilyDesc = FamilyDesc {
    name: "azure_devops_deployment_status",
    help: "Azure DevOps deployment status (timestamps and duration in seconds)",
    labels: &["projectID", "deploymentID", "type"],
};

pub const FAMILIES: &[FamilyDesc] = &[DEPLOYMENT_INFO, DEPLOYMENT_STATUS];

/// Any failing definition fails the whole project: partial deployment lists
/// would silently drop series.
pub async fn collect(ctx: &CollectContext, project: &Project) -> Result<MetricBatch, CollectError> {
    let limits = &ctx.limits;
    let definitions = ctx
        .client
        .list_release_definitions(&project.id, limits.release_definitions_per_project)
        .await?;

    let mut batch = MetricBatch::new();
    for definition in &definitions {
        let deployments = ctx
            .client
            .list_release_deployments(&project.id, definition.id, limits.deployments_per_definition)
            .await?;

        for deployment in &deployments {
            add_deployment(&mut batch, &project.id, deployment);
        }
    }

    Ok(batch)
}

fn add_deployment(batch: &mut MetricBatch, project_id: &str, deployment: &Deployment) {
    let deployment_id = deployment.id.to_string();

    batch.add_info(
        &DEPLOYMENT_INFO,
        [
            ("projectID", project_id.to_string()),
            ("deploymentID", deployment_id.clone()),
            ("releaseID", deployment.release.id.to_string()),
            ("releaseName", deployment.release.name.clone()),
            ("releaseDefinitionID", deployment.release_definition.id.to_string()),
            ("requestedBy", deployment.requested_by.display_name.clone()),
            ("deploymentName", deployment.name.clone()),
            ("deploymentStatus", deployment.deployment_status.clone()),
            ("operationStatus", deployment.operation_status.clone()),
            ("reason", deployment.reason.clone()),
            ("attempt", deployment.attempt.to_string()),
            ("environmentId", deployment.release_environment.id.to_string()),
            ("environmentName", deployment.release_environment.name.clone()),
            ("approvedBy", deployment.approved_by().to_string()),
        ],
    );

    let labels = |kind: &str| {
        [
            ("projectID", project_id.to_string()),
            ("deploymentID", deployment_id.clone()),
            ("type", kind.to_string()),
        ]
    };
    if let Some(queued) = deployment.queued_on {
        batch.add_time(&DEPLOYMENT_STATUS, labels("queued"), queued);
    }
    if let Some(started) = deployment.started_on {
        batch.add_time(&DEPLOYMENT_STATUS, labels("started"), started);
    }
    if let Some(finished) = deployment.completed_on {
        batch.add_time(&DEPLOYMENT_STATUS, labels("finished"), finished);
    }
    if let (Some(started), Some(finished)) = (deployment.started_on, deployment.completed_on) {
        batch.add_duration(
            &DEPLOYMENT_STATUS,
            labels("jobDuration"),
            elapsed(started, finished),
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use azdo_client::models::{Approval, IdentityRef};
    use chrono::{TimeZone, Utc};

    #[test]
    fn test_deployment_samples() {
        let deployment = Deployment {
            id: 12,
            attempt: 2,
            started_on: Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap()),
            completed_on: Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 45).unwrap()),
            pre_deploy_approvals: vec![Approval {
                status: "approved".into(),
                is_automated: false,
                approved_by: Some(IdentityRef {
                    display_name: "Robin".into(),
                    ..Default::default()
                }),
                ..Default::default()
            }],
            ..Default::default()
        };

        let mut batch = MetricBatch::new();
        add_deployment(&mut batch, "p1", &deployment);

        let info = &batch.samples()[0];
        assert_eq!(info.labels.len(), DEPLOYMENT_INFO.labels.len());
        assert!(info.labels.contains(&("approvedBy", "Robin".to_string())));
        assert!(info.labels.contains(&("attempt", "2".to_string())));

        let duration = batch.samples().last().map(|s| s.value.as_f64());
        assert_eq!(duration, Some(45.0));
    }
}
