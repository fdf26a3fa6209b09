//! Periodic discovery of projects and agent pools.
//!
//! A refresh publishes a new snapshot only when both listings succeed;
//! otherwise collectors keep iterating over the previous one.

use std::sync::Arc;

use azdo_client::SharedClient;
use azdo_client::models::{AgentPool, Project};
use tokio::sync::watch;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{info, warn};

use crate::config::DiscoverySettings;
use crate::error::DiscoveryError;
use crate::registry::SharedRegistry;
use crate::resource::ResourceSnapshot;

pub struct Discovery {
    client: SharedClient,
    settings: DiscoverySettings,
    registry: SharedRegistry,
    tx: watch::Sender<Arc<ResourceSnapshot>>,
}

impl Discovery {
    /// Create the discovery task and the receiver collectors read from.
    /// The receiver starts with an empty snapshot.
    pub fn new(
        client: SharedClient,
        settings: DiscoverySettings,
        registry: SharedRegistry,
    ) -> (Self, watch::Receiver<Arc<ResourceSnapshot>>) {
        let (tx, rx) = watch::channel(Arc::new(ResourceSnapshot::default()));
        let discovery = Self {
            client,
            settings,
            registry,
            tx,
        };
        (discovery, rx)
    }

    pub fn subscribe(&self) -> watch::Receiver<Arc<ResourceSnapshot>> {
        self.tx.subscribe()
    }

    /// The snapshot currently published.
    pub fn current(&self) -> Arc<ResourceSnapshot> {
        self.tx.borrow().clone()
    }

    /// List projects and agent pools and publish them as one snapshot.
    pub async fn refresh(&self) -> Result<Arc<ResourceSnapshot>, DiscoveryError> {
        match self.discover().await {
            Ok(snapshot) => {
                let snapshot = Arc::new(snapshot);
                self.registry.record_discovery(
                    snapshot.projects.len(),
                    snapshot.agent_pools.len(),
                    snapshot.discovered_at.unwrap_or_default(),
                );
                info!(
                    projects = snapshot.projects.len(),
                    agent_pools = snapshot.agent_pools.len(),
                    "Discovery refreshed"
                );
                self.tx.send_replace(Arc::clone(&snapshot));
                Ok(snapshot)
            }
            Err(e) => {
                self.registry.record_discovery_error();
                warn!(error = %e, "Discovery failed, keeping previous resources");
                Err(e)
            }
        }
    }

    async fn discover(&self) -> Result<ResourceSnapshot, DiscoveryError> {
        let projects = self
            .client
            .list_projects(self.settings.project_limit)
            .await
            .map_err(DiscoveryError::Projects)?;
        let projects = filter_projects(projects, &self.settings);

        let pools = self
            .client
            .list_agent_pools()
            .await
            .map_err(DiscoveryError::AgentPools)?;
        let pools = filter_pools(pools, &self.settings.agent_pool_ids);

        Ok(ResourceSnapshot::new(projects, pools))
    }

    /// Refresh on the discovery interval until shutdown. The first refresh
    /// is expected to have run before.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval_at(
            Instant::now() + self.settings.interval,
            self.settings.interval,
        );
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    // Failures are logged and counted by refresh.
                    let _ = self.refresh().await;
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!("Discovery stopped");
    }
}

/// Keep projects named in the filter (all when it is empty), minus the
/// blacklist. Entries match a project id or name.
fn filter_projects(projects: Vec<Project>, settings: &DiscoverySettings) -> Vec<Project> {
    let matches = |list: &[String], project: &Project| {
        list.iter()
            .any(|entry| entry == &project.id || entry.eq_ignore_ascii_case(&project.name))
    };

    projects
        .into_iter()
        .filter(|p| settings.filter_projects.is_empty() || matches(&settings.filter_projects, p))
        .filter(|p| !matches(&settings.blacklist_projects, p))
        .collect()
}

/// Keep the configured pools, or every pool when none is configured.
fn filter_pools(pools: Vec<AgentPool>, ids: &[i64]) -> Vec<AgentPool> {
    if ids.is_empty() {
        return pools;
    }
    pools.into_iter().filter(|p| ids.contains(&p.id)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn project(id: &str, name: &str) -> Project {
        Project {
            id: id.into(),
            name: name.into(),
            ..Default::default()
        }
    }

    fn settings(filter: &[&str], blacklist: &[&str]) -> DiscoverySettings {
        DiscoverySettings {
            interval: Duration::from_secs(60),
            project_limit: 100,
            filter_projects: filter.iter().map(|s| s.to_string()).collect(),
            blacklist_projects: blacklist.iter().map(|s| s.to_string()).collect(),
            agent_pool_ids: Vec::new(),
        }
    }

    fn names(projects: &[Project]) -> Vec<&str> {
        projects.iter().map(|p| p.name.as_str()).collect()
    }

    #[test]
    fn test_filter_projects() {
        let all = vec![project("1", "Alpha"), project("2", "Beta"), project("3", "Gamma")];

        let kept = filter_projects(all.clone(), &settings(&[], &[]));
        assert_eq!(names(&kept), vec!["Alpha", "Beta", "Gamma"]);

        let kept = filter_projects(all.clone(), &settings(&["alpha", "3"], &[]));
        assert_eq!(names(&kept), vec!["Alpha", "Gamma"]);

        let kept = filter_projects(all, &settings(&[], &["2"]));
        assert_eq!(names(&kept), vec!["Alpha", "Gamma"]);
    }

    #[test]
    fn test_filter_pools() {
        let pools = vec![
            AgentPool {
                id: 1,
                ..Default::default()
            },
            AgentPool {
                id: 2,
                ..Default::default()
            },
        ];

        assert_eq!(filter_pools(pools.clone(), &[]).len(), 2);
        let kept = filter_pools(pools, &[2]);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, 2);
    }
}
