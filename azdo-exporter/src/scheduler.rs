//! Builds one collector per enabled plug-in and starts their timers.

use std::sync::Arc;

use azdo_client::SharedClient;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::info;

use crate::collector::Collector;
use crate::config::Settings;
use crate::error::RegistryError;
use crate::plugins::{CollectContext, CollectorKind};
use crate::registry::SharedRegistry;
use crate::resource::ResourceSource;

pub struct Scheduler {
    collectors: Vec<Arc<Collector>>,
}

impl Scheduler {
    /// Register the families of every enabled collector. Fails if two
    /// collectors declare the same family.
    pub fn new(
        settings: &Settings,
        client: SharedClient,
        registry: SharedRegistry,
        source: ResourceSource,
    ) -> Result<Self, RegistryError> {
        let mut collectors = Vec::new();

        for schedule in settings.schedules.iter().filter(|s| s.enabled) {
            registry.register(schedule.kind.name(), schedule.kind.families())?;

            let ctx = CollectContext {
                client: Arc::clone(&client),
                limits: settings.limits.clone(),
                organisation: settings.organisation.clone(),
                interval: schedule.interval,
            };
            collectors.push(Arc::new(Collector::new(
                *schedule,
                ctx,
                source.clone(),
                Arc::clone(&registry),
            )));
        }

        info!(
            collectors = collectors.len(),
            disabled = settings.schedules.len() - collectors.len(),
            "Scheduler ready"
        );

        Ok(Self { collectors })
    }

    pub fn collectors(&self) -> &[Arc<Collector>] {
        &self.collectors
    }

    pub fn collector(&self, kind: CollectorKind) -> Option<&Arc<Collector>> {
        self.collectors.iter().find(|c| c.kind() == kind)
    }

    /// Start every collector on its own task.
    pub fn spawn(&self, shutdown: watch::Receiver<bool>) -> Vec<JoinHandle<()>> {
        self.collectors
            .iter()
            .map(|collector| tokio::spawn(Arc::clone(collector).run(shutdown.clone())))
            .collect()
    }
}
