//! Release definitions and the releases of the history window.

use std::time::Duration;

use azdo_client::models::{Project, Release};
use azdo_client::retain_most_recent;
use chrono::Utc;

use crate::batch::{FamilyDesc, MetricBatch};
use crate::error::CollectError;
use crate::plugins::CollectContext;

pub const DEFINITION_INFO: FamilyDesc = FamilyDesc {
    name: "azure_devops_release_definition_info",
    help: "Azure DevOps release definition",
    labels: &[
        "projectID",
        "releaseDefinitionID",
        "releaseNameFormat",
        "releaseDefinitionName",
        "path",
        "url",
    ],
};

pub const RELEASE_INFO: FamilyDesc = FamilyDesc {
    name: "azure_devops_release_info",
    help: "Azure DevOps release",
    labels: &[
        "projectID",
        "releaseID",
        "releaseDefinitionID",
        "requestedBy",
        "releaseName",
        "status",
        "reason",
    ],
};

pub const RELEASE_ARTIFACT: FamilyDesc = FamilyDesc {
    name: "azure_devops_release_artifact",
    help: "Azure DevOps release artifact",
    labels: &[
        "projectID",
        "releaseID",
        "releaseDefinitionID",
        "sourceId",
        "branch",
        "type",
        "alias",
        "version",
    ],
};

pub const RELEASE_ENVIRONMENT: FamilyDesc = FamilyDesc {
    name: "azure_devops_release_environment",
    help: "Azure DevOps release environment",
    labels: &[
        "projectID",
        "releaseID",
        "releaseDefinitionID",
        "environmentID",
        "environmentName",
        "status",
        "rank",
    ],
};

pub const ENVIRONMENT_STATUS: FamilyDesc = FamilyDesc {
    name: "azure_devops_release_environment_status",
    help: "Azure DevOps release environment status (timestamps and duration in seconds)",
    labels: &["projectID", "releaseID", "environmentID", "type"],
};

pub const FAMILIES: &[FamilyDesc] = &[
    DEFINITION_INFO,
    RELEASE_INFO,
    RELEASE_ARTIFACT,
    RELEASE_ENVIRONMENT,
    ENVIRONMENT_STATUS,
];

pub async fn collect(ctx: &CollectContext, project: &Project) -> Result<MetricBatch, CollectError> {
    let limits = &ctx.limits;
    let definitions = ctx
        .client
        .list_release_definitions(&project.id, limits.release_definitions_per_project)
        .await?;

    let since = Utc::now() - limits.release_history();
    let mut releases = Vec::new();

    let mut batch = MetricBatch::new();
    for definition in &definitions {
        batch.add_info(
            &DEFINITION_INFO,
            [
                ("projectID", project.id.clone()),
                ("releaseDefinitionID", definition.id.to_string()),
                ("releaseNameFormat", definition.release_name_format.clone()),
                ("releaseDefinitionName", definition.name.clone()),
                ("path", definition.path.clone()),
                ("url", definition.url.clone()),
            ],
        );

        releases.extend(
            ctx.client
                .list_releases(&project.id, definition.id, since, limits.releases_per_definition)
                .await?,
        );
    }

    let releases = retain_most_recent(releases, limits.releases_per_project, |r| r.created_on);
    for release in &releases {
        add_release(&mut batch, &project.id, release);
    }

    Ok(batch)
}

fn add_release(batch: &mut MetricBatch, project_id: &str, release: &Release) {
    let release_id = release.id.to_string();
    let definition_id = release.release_definition.id.to_string();

    batch.add_info(
        &RELEASE_INFO,
        [
            ("projectID", project_id.to_string()),
            ("releaseID", release_id.clone()),
            ("releaseDefinitionID", definition_id.clone()),
            ("requestedBy", release.created_by.display_name.clone()),
            ("releaseName", release.name.clone()),
            ("status", release.status.clone()),
            ("reason", release.reason.clone()),
        ],
    );

    for artifact in &release.artifacts {
        batch.add_info(
            &RELEASE_ARTIFACT,
            [
                ("projectID", project_id.to_string()),
                ("releaseID", release_id.clone()),
                ("releaseDefinitionID", definition_id.clone()),
                ("sourceId", artifact.source_id.clone()),
                ("branch", artifact.branch().to_string()),
                ("type", artifact.artifact_type.clone()),
                ("alias", artifact.alias.clone()),
                ("version", artifact.version().to_string()),
            ],
        );
    }

    for environment in &release.environments {
        let environment_id = environment.id.to_string();

        batch.add_info(
            &RELEASE_ENVIRONMENT,
            [
                ("projectID", project_id.to_string()),
                ("releaseID", release_id.clone()),
                ("releaseDefinitionID", definition_id.clone()),
                ("environmentID", environment_id.clone()),
                ("environmentName", environment.name.clone()),
                ("status", environment.status.clone()),
                ("rank", environment.rank.to_string()),
            ],
        );

        let labels = |kind: &str| {
            [
                ("projectID", project_id.to_string()),
                ("releaseID", release_id.clone()),
                ("environmentID", environment_id.clone()),
                ("type", kind.to_string()),
            ]
        };
        if let Some(created) = environment.created_on {
            batch.add_time(&ENVIRONMENT_STATUS, labels("created"), created);
        }
        if let Some(modified) = environment.modified_on {
            batch.add_time(&ENVIRONMENT_STATUS, labels("modified"), modified);
        }
        // timeToDeploy is reported in minutes.
        let minutes = environment.time_to_deploy.max(0.0);
        batch.add_duration(
            &ENVIRONMENT_STATUS,
            labels("jobDuration"),
            Duration::from_secs_f64(minutes * 60.0),
        );
    }
}
