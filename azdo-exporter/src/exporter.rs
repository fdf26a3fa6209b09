//! Startup wiring: HTTP server, discovery and collectors.

use std::sync::Arc;
use std::time::Duration;

use azdo_client::{ApiClient, SharedClient};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use crate::config::Settings;
use crate::discovery::Discovery;
use crate::http::HttpServer;
use crate::registry::{Registry, SharedRegistry};
use crate::resource::ResourceSource;
use crate::scheduler::Scheduler;

/// A running exporter.
pub struct Exporter {
    client: SharedClient,
    registry: SharedRegistry,
    tasks: Vec<JoinHandle<()>>,
}

impl Exporter {
    /// Start serving, then discover resources and start the collectors.
    ///
    /// The HTTP server is up before the first discovery, so health checks
    /// answer while the backend is slow or down. Collectors start once the
    /// initial discovery finished, successfully or not.
    pub fn start(settings: &Settings, shutdown: watch::Receiver<bool>) -> anyhow::Result<Self> {
        let client = Arc::new(ApiClient::new(settings.client.clone())?);
        let registry = Arc::new(Registry::new());

        let (discovery, snapshot_rx) = Discovery::new(
            Arc::clone(&client),
            settings.discovery.clone(),
            Arc::clone(&registry),
        );
        let source = ResourceSource::new(snapshot_rx, settings.queries.clone());
        let scheduler = Scheduler::new(settings, Arc::clone(&client), Arc::clone(&registry), source)?;

        let http_server = HttpServer::new(
            Arc::clone(&registry),
            settings.server.listen,
            settings.server.metrics_path.clone(),
            settings.server.request_timeout,
        );
        let http_shutdown = shutdown.clone();
        let http_task = tokio::spawn(async move {
            if let Err(e) = http_server.run(http_shutdown).await {
                error!("HTTP server error: {}", e);
            }
        });

        let collect_task = tokio::spawn(async move {
            if discovery.refresh().await.is_err() {
                warn!("Initial discovery failed, collectors start without projects and agent pools");
            }
            let collectors = scheduler.spawn(shutdown.clone());
            discovery.run(shutdown).await;
            for task in collectors {
                let _ = task.await;
            }
        });

        Ok(Self {
            client,
            registry,
            tasks: vec![http_task, collect_task],
        })
    }

    pub fn client(&self) -> &SharedClient {
        &self.client
    }

    pub fn registry(&self) -> &SharedRegistry {
        &self.registry
    }

    /// Wait for every task to stop, at most `timeout`. In-flight cycles are
    /// abandoned.
    pub async fn join(self, timeout: Duration) {
        let finished = tokio::time::timeout(timeout, async {
            for task in self.tasks {
                let _ = task.await;
            }
        })
        .await;

        if finished.is_err() {
            info!("Shutdown timed out, abandoning remaining tasks");
        }
    }
}
