//! Agent pools: size, utilisation, queue and per-agent state.

use azdo_client::models::AgentPool;

use crate::batch::{FamilyDesc, MetricBatch};
use crate::error::CollectError;
use crate::plugins::{CollectContext, bool_label};

pub const POOL_INFO: FamilyDesc = FamilyDesc {
    name: "azure_devops_agentpool_info",
    help: "Azure DevOps agentpool",
    labels: &["agentPoolID", "agentPoolName", "agentPoolType", "isHosted"],
};

pub const POOL_SIZE: FamilyDesc = FamilyDesc {
    name: "azure_devops_agentpool_size",
    help: "Azure DevOps agentpool size",
    labels: &["agentPoolID"],
};

pub const POOL_USAGE: FamilyDesc = FamilyDesc {
    name: "azure_devops_agentpool_usage",
    help: "Azure DevOps agentpool usage (running jobs / online agents)",
    labels: &["agentPoolID"],
};

pub const POOL_QUEUE_LENGTH: FamilyDesc = FamilyDesc {
    name: "azure_devops_agentpool_queue_length",
    help: "Azure DevOps agentpool queue length",
    labels: &["agentPoolID"],
};

pub const AGENT_INFO: FamilyDesc = FamilyDesc {
    name: "azure_devops_agentpool_agent_info",
    help: "Azure DevOps agent",
    labels: &[
        "agentPoolID",
        "agentPoolAgentID",
        "agentPoolAgentName",
        "agentPoolAgentVersion",
        "agentPoolAgentOs",
        "agentPoolAgentEnabled",
        "agentPoolAgentStatus",
    ],
};

pub const AGENT_STATUS: FamilyDesc = FamilyDesc {
    name: "azure_devops_agentpool_agent_status",
    help: "Azure DevOps agent status",
    labels: &["agentPoolAgentID", "type"],
};

pub const AGENT_JOB: FamilyDesc = FamilyDesc {
    name: "azure_devops_agentpool_agent_job",
    help: "Azure DevOps job currently running on an agent (start time)",
    labels: &[
        "agentPoolAgentID",
        "jobRequestId",
        "definitionID",
        "definitionName",
        "planType",
        "scopeID",
    ],
};

pub const FAMILIES: &[FamilyDesc] = &[
    POOL_INFO,
    POOL_SIZE,
    POOL_USAGE,
    POOL_QUEUE_LENGTH,
    AGENT_INFO,
    AGENT_STATUS,
    AGENT_JOB,
];

pub async fn collect(ctx: &CollectContext, pool: &AgentPool) -> Result<MetricBatch, CollectError> {
    let agents = ctx.client.list_agents(pool.id).await?;
    let jobs = ctx.client.list_agent_pool_jobs(pool.id).await?;

    let pool_id = pool.id.to_string();
    let mut batch = MetricBatch::new();

    batch.add_info(
        &POOL_INFO,
        [
            ("agentPoolID", pool_id.clone()),
            ("agentPoolName", pool.name.clone()),
            ("agentPoolType", pool.pool_type.clone()),
            ("isHosted", bool_label(pool.is_hosted)),
        ],
    );
    batch.add_gauge(&POOL_SIZE, [("agentPoolID", pool_id.clone())], pool.size as f64);

    let online = agents
        .iter()
        .filter(|a| a.enabled && a.status.eq_ignore_ascii_case("online"))
        .count();
    let running = jobs.iter().filter(|j| j.is_running()).count();
    let queued = jobs.iter().filter(|j| j.is_queued()).count();

    let usage = if online > 0 {
        running as f64 / online as f64
    } else {
        0.0
    };
    batch.add_gauge(&POOL_USAGE, [("agentPoolID", pool_id.clone())], usage);
    batch.add_gauge(&POOL_QUEUE_LENGTH, [("agentPoolID", pool_id.clone())], queued as f64);

    for agent in &agents {
        let agent_id = agent.id.to_string();

        batch.add_info(
            &AGENT_INFO,
            [
                ("agentPoolID", pool_id.clone()),
                ("agentPoolAgentID", agent_id.clone()),
                ("agentPoolAgentName", agent.name.clone()),
                ("agentPoolAgentVersion", agent.version.clone()),
                ("agentPoolAgentOs", agent.os_description.clone()),
                ("agentPoolAgentEnabled", bool_label(agent.enabled)),
                ("agentPoolAgentStatus", agent.status.clone()),
            ],
        );

        if let Some(created) = agent.created_on {
            batch.add_time(
                &AGENT_STATUS,
                [("agentPoolAgentID", agent_id.clone()), ("type", "created".into())],
                created,
            );
        }
        batch.add_bool(
            &AGENT_STATUS,
            [("agentPoolAgentID", agent_id.clone()), ("type", "busy".into())],
            agent.assigned_request.is_some(),
        );

        if let Some(job) = &agent.assigned_request {
            let (definition_id, definition_name) = job
                .definition
                .as_ref()
                .map(|d| (d.id.to_string(), d.name.clone()))
                .unwrap_or_default();

            let labels = [
                ("agentPoolAgentID", agent_id.clone()),
                ("jobRequestId", job.request_id.to_string()),
                ("definitionID", definition_id),
                ("definitionName", definition_name),
                ("planType", job.plan_type.clone()),
                ("scopeID", job.scope_id.clone()),
            ];
            match job.receive_time.or(job.assign_time) {
                Some(started) => batch.add_time(&AGENT_JOB, labels, started),
                None => batch.add_gauge(&AGENT_JOB, labels, 0.0),
            }
        }
    }

    Ok(batch)
}
