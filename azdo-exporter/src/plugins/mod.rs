//! Metrics collector plug-ins.
//!
//! The set of plug-ins is closed: [`CollectorKind`] enumerates them and
//! dispatches `collect` by `match`. A plug-in owns the families it declares,
//! reads the API through the shared client and returns one [`MetricBatch`]
//! per resource. It never touches the registry.

use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use azdo_client::SharedClient;
use chrono::{DateTime, TimeDelta, Utc};

use crate::batch::{FamilyDesc, MetricBatch};
use crate::config::LimitsConfig;
use crate::error::CollectError;
use crate::resource::{Resource, Scope};

pub mod agent_pool;
pub mod build;
pub mod deployment;
pub mod general;
pub mod latest_build;
pub mod project;
pub mod pull_request;
pub mod query;
pub mod release;
pub mod repository;
pub mod resource_usage;
pub mod stats;

/// Shared, read-only inputs of every plug-in invocation.
#[derive(Clone)]
pub struct CollectContext {
    pub client: SharedClient,
    pub limits: LimitsConfig,
    /// Organisation name, used as a label by organisation-wide plug-ins.
    pub organisation: String,
    /// Interval of the collector; windows "since the last cycle" use it.
    pub interval: Duration,
}

impl CollectContext {
    /// Start of the window covered by one cycle: now minus the interval.
    pub fn window_start(&self) -> DateTime<Utc> {
        let window = TimeDelta::from_std(self.interval).unwrap_or(TimeDelta::MAX);
        Utc::now()
            .checked_sub_signed(window)
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }
}

/// Every plug-in the exporter knows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum CollectorKind {
    General,
    Project,
    AgentPool,
    LatestBuild,
    Repository,
    PullRequest,
    Build,
    Release,
    Deployment,
    Stats,
    ResourceUsage,
    Query,
}

impl CollectorKind {
    pub const ALL: [CollectorKind; 12] = [
        CollectorKind::General,
        CollectorKind::Project,
        CollectorKind::AgentPool,
        CollectorKind::LatestBuild,
        CollectorKind::Repository,
        CollectorKind::PullRequest,
        CollectorKind::Build,
        CollectorKind::Release,
        CollectorKind::Deployment,
        CollectorKind::Stats,
        CollectorKind::ResourceUsage,
        CollectorKind::Query,
    ];

    /// Name used in configuration, logs and self-metrics.
    pub fn name(self) -> &'static str {
        match self {
            CollectorKind::General => "general",
            CollectorKind::Project => "project",
            CollectorKind::AgentPool => "agentpool",
            CollectorKind::LatestBuild => "latestbuild",
            CollectorKind::Repository => "repository",
            CollectorKind::PullRequest => "pullrequest",
            CollectorKind::Build => "build",
            CollectorKind::Release => "release",
            CollectorKind::Deployment => "deployment",
            CollectorKind::Stats => "stats",
            CollectorKind::ResourceUsage => "resourceusage",
            CollectorKind::Query => "query",
        }
    }

    pub fn scope(self) -> Scope {
        match self {
            CollectorKind::General | CollectorKind::ResourceUsage => Scope::Organisation,
            CollectorKind::AgentPool => Scope::AgentPool,
            CollectorKind::Query => Scope::Query,
            _ => Scope::Project,
        }
    }

    /// Families this plug-in owns exclusively.
    pub fn families(self) -> &'static [FamilyDesc] {
        match self {
            CollectorKind::General => general::FAMILIES,
            CollectorKind::Project => project::FAMILIES,
            CollectorKind::AgentPool => agent_pool::FAMILIES,
            CollectorKind::LatestBuild => latest_build::FAMILIES,
            CollectorKind::Repository => repository::FAMILIES,
            CollectorKind::PullRequest => pull_request::FAMILIES,
            CollectorKind::Build => build::FAMILIES,
            CollectorKind::Release => release::FAMILIES,
            CollectorKind::Deployment => deployment::FAMILIES,
            CollectorKind::Stats => stats::FAMILIES,
            CollectorKind::ResourceUsage => resource_usage::FAMILIES,
            CollectorKind::Query => query::FAMILIES,
        }
    }

    /// Collect one resource.
    pub async fn collect(
        self,
        ctx: &CollectContext,
        resource: &Resource,
    ) -> Result<MetricBatch, CollectError> {
        match (self, resource) {
            (CollectorKind::General, Resource::Organisation) => Ok(general::collect(ctx)),
            (CollectorKind::ResourceUsage, Resource::Organisation) => {
                resource_usage::collect(ctx).await
            }
            (CollectorKind::Project, Resource::Project(p)) => Ok(project::collect(p)),
            (CollectorKind::LatestBuild, Resource::Project(p)) => {
                latest_build::collect(ctx, p).await
            }
            (CollectorKind::Repository, Resource::Project(p)) => repository::collect(ctx, p).await,
            (CollectorKind::PullRequest, Resource::Project(p)) => {
                pull_request::collect(ctx, p).await
            }
            (CollectorKind::Build, Resource::Project(p)) => build::collect(ctx, p).await,
            (CollectorKind::Release, Resource::Project(p)) => release::collect(ctx, p).await,
            (CollectorKind::Deployment, Resource::Project(p)) => deployment::collect(ctx, p).await,
            (CollectorKind::Stats, Resource::Project(p)) => stats::collect(ctx, p).await,
            (CollectorKind::AgentPool, Resource::AgentPool(pool)) => {
                agent_pool::collect(ctx, pool).await
            }
            (CollectorKind::Query, Resource::Query(q)) => query::collect(ctx, q).await,
            (kind, resource) => Err(CollectError::ScopeMismatch {
                collector: kind.name(),
                expected: kind.scope(),
                resource: resource.key(),
            }),
        }
    }
}

impl fmt::Display for CollectorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for CollectorKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        CollectorKind::ALL
            .into_iter()
            .find(|k| k.name().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown collector '{s}'"))
    }
}

/// Label value for an optional string.
pub(crate) fn opt(value: &Option<String>) -> String {
    value.clone().unwrap_or_default()
}

pub(crate) fn bool_label(value: bool) -> String {
    if value { "true" } else { "false" }.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_names_round_trip() {
        for kind in CollectorKind::ALL {
            assert_eq!(kind.name().parse::<CollectorKind>(), Ok(kind));
        }
        assert_eq!("PullRequest".parse::<CollectorKind>(), Ok(CollectorKind::PullRequest));
        assert!("nope".parse::<CollectorKind>().is_err());
    }

    #[test]
    fn test_family_names_are_unique_and_prefixed() {
        let mut seen = HashSet::new();
        for kind in CollectorKind::ALL {
            assert!(!kind.families().is_empty(), "{kind} declares no family");
            for family in kind.families() {
                assert!(family.name.starts_with("azure_devops_"), "{}", family.name);
                assert!(seen.insert(family.name), "{} declared twice", family.name);
            }
        }
    }

    #[test]
    fn test_scopes() {
        assert_eq!(CollectorKind::General.scope(), Scope::Organisation);
        assert_eq!(CollectorKind::ResourceUsage.scope(), Scope::Organisation);
        assert_eq!(CollectorKind::AgentPool.scope(), Scope::AgentPool);
        assert_eq!(CollectorKind::Query.scope(), Scope::Query);
        assert_eq!(CollectorKind::Deployment.scope(), Scope::Project);
    }
}
