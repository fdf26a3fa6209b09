//! Base collector: runs one plug-in on its own timer.
//!
//! A cycle fans the plug-in out over every resource of its scope, waits for
//! all of them, then hands the batches to the registry in one apply step.
//! A tick that arrives while a cycle is still running is skipped.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};
use std::time::{Duration, Instant};

use chrono::Utc;
use tokio::sync::{Semaphore, mpsc, watch};
use tokio::task::JoinSet;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{Instrument, debug, error, info, info_span, warn};

use crate::batch::MetricBatch;
use crate::config::CollectorSchedule;
use crate::plugins::{CollectContext, CollectorKind};
use crate::registry::{CycleResult, SharedRegistry};
use crate::resource::{Resource, ResourceSource};

/// Lifecycle of a collector's cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum CollectorState {
    Idle = 0,
    Collecting = 1,
    Applying = 2,
}

impl CollectorState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => CollectorState::Collecting,
            2 => CollectorState::Applying,
            _ => CollectorState::Idle,
        }
    }
}

/// Outcome of one cycle.
#[derive(Debug, Clone, PartialEq)]
pub struct CycleReport {
    pub resources: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub duration: Duration,
}

pub struct Collector {
    kind: CollectorKind,
    schedule: CollectorSchedule,
    ctx: Arc<CollectContext>,
    source: ResourceSource,
    registry: SharedRegistry,
    state: AtomicU8,
}

/// Holds the collector out of `Idle`; dropping it, even while unwinding,
/// returns the collector to `Idle`.
pub struct CycleGuard(Arc<Collector>);

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.0
            .state
            .store(CollectorState::Idle as u8, Ordering::Release);
    }
}

impl Collector {
    pub fn new(
        schedule: CollectorSchedule,
        ctx: CollectContext,
        source: ResourceSource,
        registry: SharedRegistry,
    ) -> Self {
        Self {
            kind: schedule.kind,
            schedule,
            ctx: Arc::new(ctx),
            source,
            registry,
            state: AtomicU8::new(CollectorState::Idle as u8),
        }
    }

    pub fn kind(&self) -> CollectorKind {
        self.kind
    }

    pub fn name(&self) -> &'static str {
        self.kind.name()
    }

    pub fn schedule(&self) -> &CollectorSchedule {
        &self.schedule
    }

    pub fn state(&self) -> CollectorState {
        CollectorState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// Move from `Idle` to `Collecting`, or `None` if a cycle is running.
    pub fn try_begin(self: &Arc<Self>) -> Option<CycleGuard> {
        self.state
            .compare_exchange(
                CollectorState::Idle as u8,
                CollectorState::Collecting as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .ok()
            .map(|_| CycleGuard(Arc::clone(self)))
    }

    /// Run one cycle now. Returns `None`, and counts a skipped tick, if the
    /// previous cycle has not finished.
    pub async fn run_cycle(self: &Arc<Self>) -> Option<CycleReport> {
        match self.try_begin() {
            Some(guard) => Some(self.execute(guard).await),
            None => {
                self.skip();
                None
            }
        }
    }

    /// Drive cycles from the collector's timer until shutdown.
    pub async fn run(self: Arc<Self>, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = interval(self.schedule.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        info!(
            collector = self.name(),
            interval_secs = self.schedule.interval.as_secs(),
            fan_out = self.schedule.fan_out,
            "Starting collector"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.try_begin() {
                        Some(guard) => {
                            let this = Arc::clone(&self);
                            tokio::spawn(async move {
                                this.execute(guard).await;
                            });
                        }
                        None => self.skip(),
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
            }
        }

        info!(collector = self.name(), "Collector stopped");
    }

    fn skip(&self) {
        self.registry.record_skip(self.name());
        warn!(
            collector = self.name(),
            "Previous cycle still running, skipping tick"
        );
    }

    async fn execute(self: &Arc<Self>, _guard: CycleGuard) -> CycleReport {
        let started = Instant::now();
        let resources = self.source.resources(self.kind.scope());
        let keys: BTreeSet<String> = resources.iter().map(Resource::key).collect();

        debug!(
            collector = self.name(),
            resources = resources.len(),
            "Starting cycle"
        );

        let (tx, mut rx) = mpsc::unbounded_channel::<(String, MetricBatch)>();
        let fan_out = Arc::new(Semaphore::new(self.schedule.fan_out));
        let mut tasks = JoinSet::new();

        for resource in resources {
            // The semaphore is never closed.
            let Ok(permit) = Arc::clone(&fan_out).acquire_owned().await else {
                break;
            };
            let tx = tx.clone();
            let ctx = Arc::clone(&self.ctx);
            let kind = self.kind;
            let key = resource.key();
            let span = info_span!("collect", collector = kind.name(), resource = %key);

            tasks.spawn(
                async move {
                    let _permit = permit;
                    match kind.collect(&ctx, &resource).await {
                        Ok(batch) => {
                            debug!(samples = batch.len(), "Collected");
                            let _ = tx.send((key, batch));
                        }
                        Err(e) => warn!(error = %e, "Collection failed"),
                    }
                }
                .instrument(span),
            );
        }
        drop(tx);

        // Barrier: nothing is applied until every resource has finished.
        while let Some(joined) = tasks.join_next().await {
            if let Err(e) = joined {
                error!(collector = self.name(), error = %e, "Collection task panicked");
            }
        }

        self.state
            .store(CollectorState::Applying as u8, Ordering::Release);

        let mut batches = Vec::new();
        while let Ok(queued) = rx.try_recv() {
            batches.push(queued);
        }

        let succeeded: BTreeSet<&str> = batches.iter().map(|(key, _)| key.as_str()).collect();
        let failed: BTreeSet<String> = keys
            .iter()
            .filter(|key| !succeeded.contains(key.as_str()))
            .cloned()
            .collect();

        let report = CycleReport {
            resources: keys.len(),
            succeeded: keys.len() - failed.len(),
            failed: failed.len(),
            duration: started.elapsed(),
        };

        let applied = self.registry.apply_cycle(
            self.name(),
            CycleResult {
                batches,
                failed,
                duration: report.duration,
                finished_at: Utc::now(),
            },
        );

        if report.failed > 0 {
            warn!(
                collector = self.name(),
                succeeded = report.succeeded,
                failed = report.failed,
                retained = applied.retained,
                duration_ms = report.duration.as_millis() as u64,
                "Cycle finished with errors"
            );
        } else {
            info!(
                collector = self.name(),
                resources = report.resources,
                samples = applied.applied,
                duration_ms = report.duration.as_millis() as u64,
                "Cycle finished"
            );
        }

        report
    }
}
