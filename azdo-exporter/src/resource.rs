//! Resources collectors iterate over, and the snapshot discovery publishes.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use azdo_client::models::{AgentPool, Project};
use chrono::{DateTime, Utc};
use tokio::sync::watch;

/// The kind of resource a collector runs against.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Scope {
    /// One invocation per cycle for the whole organisation.
    Organisation,
    Project,
    AgentPool,
    Query,
}

/// A saved work item query, configured as `<query id>@<project id>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryTarget {
    pub query_id: String,
    pub project_id: String,
}

impl FromStr for QueryTarget {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let parts: Vec<&str> = s.split('@').collect();
        match parts.as_slice() {
            [query, project] if !query.trim().is_empty() && !project.trim().is_empty() => {
                Ok(Self {
                    query_id: query.trim().to_string(),
                    project_id: project.trim().to_string(),
                })
            }
            _ => Err(format!(
                "invalid query '{s}': expected '<query id>@<project id>'"
            )),
        }
    }
}

impl fmt::Display for QueryTarget {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.query_id, self.project_id)
    }
}

/// One unit of collection work.
#[derive(Debug, Clone)]
pub enum Resource {
    Organisation,
    Project(Arc<Project>),
    AgentPool(Arc<AgentPool>),
    Query(Arc<QueryTarget>),
}

impl Resource {
    pub fn scope(&self) -> Scope {
        match self {
            Resource::Organisation => Scope::Organisation,
            Resource::Project(_) => Scope::Project,
            Resource::AgentPool(_) => Scope::AgentPool,
            Resource::Query(_) => Scope::Query,
        }
    }

    /// Owner key tagging every series this resource produced.
    pub fn key(&self) -> String {
        match self {
            Resource::Organisation => "organisation".to_string(),
            Resource::Project(p) => format!("project:{}", p.id),
            Resource::AgentPool(p) => format!("agentpool:{}", p.id),
            Resource::Query(q) => format!("query:{q}"),
        }
    }
}

/// Projects and agent pools found by the last successful discovery.
#[derive(Debug, Clone, Default)]
pub struct ResourceSnapshot {
    pub projects: Vec<Arc<Project>>,
    pub agent_pools: Vec<Arc<AgentPool>>,
    /// `None` until the first successful discovery.
    pub discovered_at: Option<DateTime<Utc>>,
}

impl ResourceSnapshot {
    pub fn new(projects: Vec<Project>, agent_pools: Vec<AgentPool>) -> Self {
        Self {
            projects: projects.into_iter().map(Arc::new).collect(),
            agent_pools: agent_pools.into_iter().map(Arc::new).collect(),
            discovered_at: Some(Utc::now()),
        }
    }
}

/// Read side of discovery, plus the static query list.
#[derive(Debug, Clone)]
pub struct ResourceSource {
    snapshot: watch::Receiver<Arc<ResourceSnapshot>>,
    queries: Arc<[Arc<QueryTarget>]>,
}

impl ResourceSource {
    pub fn new(snapshot: watch::Receiver<Arc<ResourceSnapshot>>, queries: Vec<QueryTarget>) -> Self {
        Self {
            snapshot,
            queries: queries.into_iter().map(Arc::new).collect(),
        }
    }

    /// A source with a fixed snapshot.
    pub fn fixed(snapshot: ResourceSnapshot, queries: Vec<QueryTarget>) -> Self {
        let (_tx, rx) = watch::channel(Arc::new(snapshot));
        Self::new(rx, queries)
    }

    /// Resources of `scope` for the cycle starting now.
    pub fn resources(&self, scope: Scope) -> Vec<Resource> {
        match scope {
            Scope::Organisation => vec![Resource::Organisation],
            Scope::Query => self.queries.iter().cloned().map(Resource::Query).collect(),
            Scope::Project => {
                let snapshot = self.snapshot.borrow().clone();
                snapshot.projects.iter().cloned().map(Resource::Project).collect()
            }
            Scope::AgentPool => {
                let snapshot = self.snapshot.borrow().clone();
                snapshot
                    .agent_pools
                    .iter()
                    .cloned()
                    .map(Resource::AgentPool)
                    .collect()
            }
        }
    }
}
