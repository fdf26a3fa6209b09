//! Aggregated build statistics over the window since the previous cycle.

use std::collections::BTreeMap;

use azdo_client::models::{Build, Project};

use crate::batch::{FamilyDesc, MetricBatch, elapsed};
use crate::error::CollectError;
use crate::plugins::CollectContext;

const PROJECT_LABELS: &[&str] = &["projectID", "buildDefinitionID", "result"];

pub const PROJECT_BUILDS: FamilyDesc = FamilyDesc {
    name: "azure_devops_stats_project_builds",
    help: "Azure DevOps builds per definition and result",
    labels: PROJECT_LABELS,
};

pub const PROJECT_BUILD_DURATION: FamilyDesc = FamilyDesc {
    name: "azure_devops_stats_project_build_duration_seconds",
    help: "Azure DevOps average build duration",
    labels: PROJECT_LABELS,
};

pub const PROJECT_BUILD_WAIT: FamilyDesc = FamilyDesc {
    name: "azure_devops_stats_project_build_wait_seconds",
    help: "Azure DevOps average time builds wait for an agent",
    labels: PROJECT_LABELS,
};

pub const AGENTPOOL_BUILDS: FamilyDesc = FamilyDesc {
    name: "azure_devops_stats_agentpool_builds",
    help: "Azure DevOps builds per agentpool and result",
    labels: &["agentPoolID", "projectID", "result"],
};

pub const FAMILIES: &[FamilyDesc] = &[
    PROJECT_BUILDS,
    PROJECT_BUILD_DURATION,
    PROJECT_BUILD_WAIT,
    AGENTPOOL_BUILDS,
];

#[derive(Debug, Default)]
struct Summary {
    count: usize,
    duration_secs: f64,
    durations: usize,
    wait_secs: f64,
    waits: usize,
}

impl Summary {
    fn add(&mut self, build: &Build) {
        self.count += 1;
        if let (Some(started), Some(finished)) = (build.start_time, build.finish_time) {
            self.duration_secs += elapsed(started, finished).as_secs_f64();
            self.durations += 1;
        }
        if let (Some(queued), Some(started)) = (build.queue_time, build.start_time) {
            self.wait_secs += elapsed(queued, started).as_secs_f64();
            self.waits += 1;
        }
    }

    fn average_duration(&self) -> Option<f64> {
        (self.durations > 0).then(|| self.duration_secs / self.durations as f64)
    }

    fn average_wait(&self) -> Option<f64> {
        (self.waits > 0).then(|| self.wait_secs / self.waits as f64)
    }
}

pub async fn collect(ctx: &CollectContext, project: &Project) -> Result<MetricBatch, CollectError> {
    let builds = ctx
        .client
        .list_builds(&project.id, ctx.window_start(), ctx.limits.builds_per_project)
        .await?;

    Ok(summarise(&project.id, &builds))
}

fn summarise(project_id: &str, builds: &[Build]) -> MetricBatch {
    let mut per_definition: BTreeMap<(i64, &str), Summary> = BTreeMap::new();
    let mut per_pool: BTreeMap<(i64, &str), usize> = BTreeMap::new();

    for build in builds {
        per_definition
            .entry((build.definition.id, build.outcome()))
            .or_default()
            .add(build);
        if let Some(pool) = build.pool() {
            *per_pool.entry((pool.id, build.outcome())).or_default() += 1;
        }
    }

    let mut batch = MetricBatch::new();
    for ((definition_id, result), summary) in &per_definition {
        let labels = || {
            [
                ("projectID", project_id.to_string()),
                ("buildDefinitionID", definition_id.to_string()),
                ("result", result.to_string()),
            ]
        };

        batch.add_gauge(&PROJECT_BUILDS, labels(), summary.count as f64);
        if let Some(duration) = summary.average_duration() {
            batch.add_gauge(&PROJECT_BUILD_DURATION, labels(), duration);
        }
        if let Some(wait) = summary.average_wait() {
            batch.add_gauge(&PROJECT_BUILD_WAIT, labels(), wait);
        }
    }

    for ((pool_id, result), count) in &per_pool {
        batch.add_gauge(
            &AGENTPOOL_BUILDS,
            [
                ("agentPoolID", pool_id.to_string()),
                ("projectID", project_id.to_string()),
                ("result", result.to_string()),
            ],
            *count as f64,
        );
    }

    batch
}
