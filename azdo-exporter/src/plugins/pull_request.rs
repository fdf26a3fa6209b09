//! Active pull requests with their review state and labels.

use azdo_client::models::Project;

use crate::batch::{FamilyDesc, MetricBatch};
use crate::error::CollectError;
use crate::plugins::{CollectContext, bool_label};

pub const PR_INFO: FamilyDesc = FamilyDesc {
    name: "azure_devops_pullrequest_info",
    help: "Azure DevOps pullrequest",
    labels: &[
        "projectID",
        "repositoryID",
        "pullrequestID",
        "pullrequestTitle",
        "status",
        "voteStatus",
        "creator",
        "isDraft",
        "sourceBranch",
        "targetBranch",
    ],
};

pub const PR_STATUS: FamilyDesc = FamilyDesc {
    name: "azure_devops_pullrequest_status",
    help: "Azure DevOps pullrequest status (timestamps)",
    labels: &["projectID", "pullrequestID", "type"],
};

pub const PR_LABEL: FamilyDesc = FamilyDesc {
    name: "azure_devops_pullrequest_label",
    help: "Azure DevOps pullrequest label",
    labels: &["projectID", "pullrequestID", "label", "active"],
};

pub const FAMILIES: &[FamilyDesc] = &[PR_INFO, PR_STATUS, PR_LABEL];

pub async fn collect(ctx: &CollectContext, project: &Project) -> Result<MetricBatch, CollectError> {
    let pull_requests = ctx.client.list_pull_requests(&project.id, "active").await?;

    let mut batch = MetricBatch::new();
    for pr in &pull_requests {
        let pr_id = pr.pull_request_id.to_string();

        batch.add_info(
            &PR_INFO,
            [
                ("projectID", project.id.clone()),
                ("repositoryID", pr.repository.id.clone()),
                ("pullrequestID", pr_id.clone()),
                ("pullrequestTitle", pr.title.clone()),
                ("status", pr.status.clone()),
                ("voteStatus", vote_status(pr.vote_summary()).to_string()),
                ("creator", pr.created_by.display_name.clone()),
                ("isDraft", bool_label(pr.is_draft)),
                ("sourceBranch", pr.source_ref_name.clone()),
                ("targetBranch", pr.target_ref_name.clone()),
            ],
        );

        if let Some(created) = pr.creation_date {
            batch.add_time(
                &PR_STATUS,
                [
                    ("projectID", project.id.clone()),
                    ("pullrequestID", pr_id.clone()),
                    ("type", "created".to_string()),
                ],
                created,
            );
        }

        for label in &pr.labels {
            batch.add_info(
                &PR_LABEL,
                [
                    ("projectID", project.id.clone()),
                    ("pullrequestID", pr_id.clone()),
                    ("label", label.name.clone()),
                    ("active", bool_label(label.active)),
                ],
            );
        }
    }

    Ok(batch)
}

fn vote_status(vote: i64) -> &'static str {
    match vote {
        10 => "approved",
        5 => "approvedWithSuggestions",
        -5 => "waitingForAuthor",
        -10 => "rejected",
        _ => "noVote",
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vote_status() {
        assert_eq!(vote_status(10), "approved");
        assert_eq!(vote_status(5), "approvedWithSuggestions");
        assert_eq!(vote_status(0), "noVote");
        assert_eq!(vote_status(-5), "waitingForAuthor");
        assert_eq!(vote_status(-10), "rejected");
    }
}
