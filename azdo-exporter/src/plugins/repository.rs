//! Git repositories: size and activity since the previous cycle.

use azdo_client::models::Project;

use crate::batch::{FamilyDesc, MetricBatch};
use crate::error::CollectError;
use crate::plugins::CollectContext;

pub const REPOSITORY_INFO: FamilyDesc = FamilyDesc {
    name: "azure_devops_repository_info",
    help: "Azure DevOps repository",
    labels: &["projectID", "repositoryID", "repositoryName"],
};

pub const REPOSITORY_STATS: FamilyDesc = FamilyDesc {
    name: "azure_devops_repository_stats",
    help: "Azure DevOps repository statistics",
    labels: &["projectID", "repositoryID", "type"],
};

pub const REPOSITORY_COMMITS: FamilyDesc = FamilyDesc {
    name: "azure_devops_repository_commits",
    help: "Azure DevOps repository commits since the previous cycle",
    labels: &["projectID", "repositoryID"],
};

pub const REPOSITORY_PUSHES: FamilyDesc = FamilyDesc {
    name: "azure_devops_repository_pushes",
    help: "Azure DevOps repository pushes since the previous cycle",
    labels: &["projectID", "repositoryID"],
};

pub const FAMILIES: &[FamilyDesc] = &[
    REPOSITORY_INFO,
    REPOSITORY_STATS,
    REPOSITORY_COMMITS,
    REPOSITORY_PUSHES,
];

pub async fn collect(ctx: &CollectContext, project: &Project) -> Result<MetricBatch, CollectError> {
    let repositories = ctx.client.list_repositories(&project.id).await?;
    let since = ctx.window_start();

    let mut batch = MetricBatch::new();
    // Disabled repositories reject git queries.
    for repository in repositories.iter().filter(|r| !r.is_disabled) {
        let ids = || {
            [
                ("projectID", project.id.clone()),
                ("repositoryID", repository.id.clone()),
            ]
        };

        batch.add_info(
            &REPOSITORY_INFO,
            [
                ("projectID", project.id.clone()),
                ("repositoryID", repository.id.clone()),
                ("repositoryName", repository.name.clone()),
            ],
        );
        batch.add_gauge(
            &REPOSITORY_STATS,
            [
                ("projectID", project.id.clone()),
                ("repositoryID", repository.id.clone()),
                ("type", "size".to_string()),
            ],
            repository.size as f64,
        );

        let commits = ctx
            .client
            .list_commits_since(&project.id, &repository.id, since)
            .await?;
        batch.add_gauge(&REPOSITORY_COMMITS, ids(), commits.len() as f64);

        let pushes = ctx
            .client
            .list_pushes_since(&project.id, &repository.id, since)
            .await?;
        batch.add_gauge(&REPOSITORY_PUSHES, ids(), pushes.len() as f64);
    }

    Ok(batch)
}
