//! Builds of the history window, with their stages, jobs and tasks.

use std::collections::BTreeMap;

use azdo_client::models::{Build, Project, TimelineRecord};
use azdo_client::retain_most_recent;
use chrono::Utc;

use crate::batch::{FamilyDesc, MetricBatch, elapsed};
use crate::error::CollectError;
use crate::plugins::{CollectContext, opt};

/// Labels shared by `build_info` and `build_latest_info`.
pub(crate) const BUILD_INFO_LABELS: &[&str] = &[
    "projectID",
    "buildDefinitionID",
    "buildID",
    "agentPoolID",
    "requestedBy",
    "buildNumber",
    "buildName",
    "sourceBranch",
    "sourceVersion",
    "status",
    "reason",
    "result",
    "url",
];

/// Labels shared by `build_status` and `build_latest_status`.
pub(crate) const BUILD_STATUS_LABELS: &[&str] = &[
    "projectID",
    "buildID",
    "buildDefinitionID",
    "buildNumber",
    "result",
    "type",
];

const TIMELINE_LABELS: &[&str] = &[
    "projectID",
    "buildID",
    "buildDefinitionID",
    "buildNumber",
    "name",
    "id",
    "parentId",
    "result",
    "type",
];

pub const DEFINITION_INFO: FamilyDesc = FamilyDesc {
    name: "azure_devops_build_definition_info",
    help: "Azure DevOps build definition",
    labels: &[
        "projectID",
        "buildDefinitionID",
        "buildDefinitionName",
        "path",
        "url",
    ],
};

pub const BUILD_INFO: FamilyDesc = FamilyDesc {
    name: "azure_devops_build_info",
    help: "Azure DevOps build",
    labels: BUILD_INFO_LABELS,
};

pub const BUILD_STATUS: FamilyDesc = FamilyDesc {
    name: "azure_devops_build_status",
    help: "Azure DevOps build status (timestamps and duration in seconds)",
    labels: BUILD_STATUS_LABELS,
};

pub const BUILD_STAGE: FamilyDesc = FamilyDesc {
    name: "azure_devops_build_stage",
    help: "Azure DevOps build stage",
    labels: TIMELINE_LABELS,
};

pub const BUILD_JOB: FamilyDesc = FamilyDesc {
    name: "azure_devops_build_job",
    help: "Azure DevOps build job",
    labels: TIMELINE_LABELS,
};

pub const BUILD_TASK: FamilyDesc = FamilyDesc {
    name: "azure_devops_build_task",
    help: "Azure DevOps build task",
    labels: TIMELINE_LABELS,
};

pub const FAMILIES: &[FamilyDesc] = &[
    DEFINITION_INFO,
    BUILD_INFO,
    BUILD_STATUS,
    BUILD_STAGE,
    BUILD_JOB,
    BUILD_TASK,
];

pub async fn collect(ctx: &CollectContext, project: &Project) -> Result<MetricBatch, CollectError> {
    let limits = &ctx.limits;
    let definitions = ctx
        .client
        .list_build_definitions(&project.id, limits.build_definitions_per_project)
        .await?;

    let since = Utc::now() - limits.build_history();
    let builds = ctx
        .client
        .list_builds(&project.id, since, limits.builds_per_project)
        .await?;
    let builds = cap_per_definition(builds, limits.builds_per_definition);

    let mut batch = MetricBatch::new();

    for definition in &definitions {
        batch.add_info(
            &DEFINITION_INFO,
            [
                ("projectID", project.id.clone()),
                ("buildDefinitionID", definition.id.to_string()),
                ("buildDefinitionName", definition.name.clone()),
                ("path", definition.path.clone()),
                ("url", definition.url.clone()),
            ],
        );
    }

    for build in &builds {
        batch.add_info(&BUILD_INFO, info_labels(&project.id, build));
        add_status(&mut batch, &BUILD_STATUS, &project.id, build);

        if build.finish_time.is_none() {
            continue;
        }

        let timeline = ctx.client.build_timeline(&project.id, build.id).await?;
        for record in &timeline.records {
            let family = match record.record_type.as_str() {
                "Stage" => &BUILD_STAGE,
                "Job" => &BUILD_JOB,
                "Task" => &BUILD_TASK,
                _ => continue,
            };
            add_timeline_record(&mut batch, family, &project.id, build, record);
        }
    }

    Ok(batch)
}

/// Keep at most `cap` builds per definition, the most recent ones.
fn cap_per_definition(builds: Vec<Build>, cap: usize) -> Vec<Build> {
    let mut by_definition: BTreeMap<i64, Vec<Build>> = BTreeMap::new();
    for build in builds {
        by_definition.entry(build.definition.id).or_default().push(build);
    }

    by_definition
        .into_values()
        .flat_map(|builds| retain_most_recent(builds, cap, |b| b.queue_time))
        .collect()
}

pub(crate) fn info_labels(project_id: &str, build: &Build) -> Vec<(&'static str, String)> {
    let pool_id = build
        .pool()
        .map(|p| p.id.to_string())
        .unwrap_or_default();

    vec![
        ("projectID", project_id.to_string()),
        ("buildDefinitionID", build.definition.id.to_string()),
        ("buildID", build.id.to_string()),
        ("agentPoolID", pool_id),
        ("requestedBy", build.requested_by.display_name.clone()),
        ("buildNumber", build.build_number.clone()),
        ("buildName", build.definition.name.clone()),
        ("sourceBranch", build.source_branch.clone()),
        ("sourceVersion", build.source_version.clone()),
        ("status", build.status.clone()),
        ("reason", build.reason.clone()),
        ("result", opt(&build.result)),
        ("url", build.url.clone()),
    ]
}

/// Queue, start and finish timestamps plus the job duration of a build.
pub(crate) fn add_status(batch: &mut MetricBatch, family: &FamilyDesc, project_id: &str, build: &Build) {
    let labels = |kind: &str| {
        [
            ("projectID", project_id.to_string()),
            ("buildID", build.id.to_string()),
            ("buildDefinitionID", build.definition.id.to_string()),
            ("buildNumber", build.build_number.clone()),
            ("result", build.outcome().to_string()),
            ("type", kind.to_string()),
        ]
    };

    if let Some(queued) = build.queue_time {
        batch.add_time(family, labels("queued"), queued);
    }
    if let Some(started) = build.start_time {
        batch.add_time(family, labels("started"), started);
    }
    if let Some(finished) = build.finish_time {
        batch.add_time(family, labels("finished"), finished);
    }
    if let (Some(started), Some(finished)) = (build.start_time, build.finish_time) {
        batch.add_duration(family, labels("jobDuration"), elapsed(started, finished));
    }
}

fn add_timeline_record(
    batch: &mut MetricBatch,
    family: &FamilyDesc,
    project_id: &str,
    build: &Build,
    record: &TimelineRecord,
) {
    let labels = |kind: &str| {
        [
            ("projectID", project_id.to_string()),
            ("buildID", build.id.to_string()),
            ("buildDefinitionID", build.definition.id.to_string()),
            ("buildNumber", build.build_number.clone()),
            ("name", record.name.clone()),
            ("id", record.id.clone()),
            ("parentId", opt(&record.parent_id)),
            ("result", opt(&record.result)),
            ("type", kind.to_string()),
        ]
    };

    if let Some(started) = record.start_time {
        batch.add_time(family, labels("started"), started);
    }
    if let Some(finished) = record.finish_time {
        batch.add_time(family, labels("finished"), finished);
    }
    if let (Some(started), Some(finished)) = (record.start_time, record.finish_time) {
        batch.add_duration(family, labels("duration"), elapsed(started, finished));
    }
    batch.add_gauge(family, labels("errorCount"), record.error_count as f64);
    batch.add_gauge(family, labels("warningCount"), record.warning_count as f64);
}

#[cfg(test)]
mod tests {
    use super::*;
    use azdo_client::models::DefinitionRef;
    use chrono::{TimeZone, Utc};

    fn build(id: i64, definition: i64, queued_minute: u32) -> Build {
        Build {
            id,
            definition: DefinitionRef {
                id: definition,
                ..Default::default()
            },
            queue_time: Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, queued_minute, 0).unwrap()),
            ..Default::default()
        }
    }

    #[test]
    fn test_cap_per_definition_keeps_most_recent() {
        let builds = vec![
            build(1, 7, 1),
            build(2, 7, 3),
            build(3, 8, 0),
            build(4, 7, 2),
        ];

        let kept: Vec<i64> = cap_per_definition(builds, 2).iter().map(|b| b.id).collect();
        assert_eq!(kept, vec![2, 4, 3]);
    }

    #[test]
    fn test_status_samples() {
        let mut b = build(1, 7, 0);
        b.start_time = Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 1, 0).unwrap());
        b.finish_time = Some(Utc.with_ymd_and_hms(2024, 3, 1, 10, 4, 0).unwrap());
        b.result = Some("succeeded".into());

        let mut batch = MetricBatch::new();
        add_status(&mut batch, &BUILD_STATUS, "p1", &b);

        let kinds: Vec<&str> = batch
            .samples()
            .iter()
            .map(|s| s.labels[5].1.as_str())
            .collect();
        assert_eq!(kinds, vec!["queued", "started", "finished", "jobDuration"]);
        assert_eq!(batch.samples()[3].value.as_f64(), 180.0);
        assert_eq!(batch.samples()[0].labels[4].1, "succeeded");
    }

    #[test]
    fn test_info_labels_match_family() {
        let labels = info_labels("p1", &build(1, 7, 0));
        let names: Vec<&str> = labels.iter().map(|(k, _)| *k).collect();
        assert_eq!(names, BUILD_INFO.labels);
    }
}
