//! Metric registry: the single store every collector writes into and
//! `/metrics` renders from.
//!
//! Each collector replaces its families wholesale once per cycle, under one
//! write lock, so a render never observes half of a cycle.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt::Write;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use tracing::{debug, error};

use crate::batch::{FamilyDesc, MetricBatch};
use crate::error::{ApplyError, RegistryError};

/// Prefix of the exporter's own metrics.
const SELF_PREFIX: &str = "azure_devops";

#[derive(Debug, Clone)]
struct Series {
    value: f64,
    /// Key of the resource that produced this series.
    owner: String,
}

#[derive(Debug)]
struct Family {
    desc: FamilyDesc,
    collector: &'static str,
    /// Label values in `desc.labels` order.
    series: BTreeMap<Vec<String>, Series>,
}

/// Cycle statistics of one collector.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CollectorStats {
    pub cycles: u64,
    pub errors_total: u64,
    pub skipped_ticks: u64,
    pub last_duration: Duration,
    pub last_succeeded: usize,
    pub last_failed: usize,
    /// End of the last cycle in which no resource failed.
    pub last_success: Option<DateTime<Utc>>,
}

/// Discovery statistics.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DiscoveryStats {
    pub refreshes: u64,
    pub errors_total: u64,
    pub projects: usize,
    pub agent_pools: usize,
    pub last_success: Option<DateTime<Utc>>,
}

#[derive(Debug, Default)]
struct Inner {
    families: BTreeMap<&'static str, Family>,
    collectors: BTreeMap<&'static str, CollectorStats>,
    discovery: DiscoveryStats,
}

/// Everything one collector cycle produced, handed to [`Registry::apply_cycle`].
#[derive(Debug, Default)]
pub struct CycleResult {
    /// Batches in queue order, each tagged with its resource's owner key.
    pub batches: Vec<(String, MetricBatch)>,
    /// Owner keys of resources whose collection failed.
    pub failed: BTreeSet<String>,
    pub duration: Duration,
    pub finished_at: DateTime<Utc>,
}

/// Outcome of applying one cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyReport {
    pub applied: usize,
    pub dropped: usize,
    pub retained: usize,
}

/// Thread-safe metric registry.
#[derive(Debug, Default)]
pub struct Registry {
    inner: RwLock<Inner>,
}

/// Create a shareable registry handle.
pub type SharedRegistry = Arc<Registry>;

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the families a collector owns. Registering the same
    /// families again for the same collector is a no-op.
    pub fn register(
        &self,
        collector: &'static str,
        families: &[FamilyDesc],
    ) -> Result<(), RegistryError> {
        let mut inner = self.inner.write();

        for desc in families {
            if let Some(existing) = inner.families.get(desc.name) {
                if existing.collector != collector {
                    return Err(RegistryError::AlreadyOwned {
                        family: desc.name,
                        owner: existing.collector,
                    });
                }
                if existing.desc.labels != desc.labels {
                    return Err(RegistryError::LabelConflict { family: desc.name });
                }
            }
        }

        for desc in families {
            inner.families.entry(desc.name).or_insert_with(|| Family {
                desc: *desc,
                collector,
                series: BTreeMap::new(),
            });
        }
        inner.collectors.entry(collector).or_default();

        debug!(collector, families = families.len(), "Registered metric families");
        Ok(())
    }

    /// Replace a collector's series with the result of one cycle.
    ///
    /// Under a single write lock: drop every series of the collector except
    /// those owned by a resource that failed this cycle, then apply each
    /// batch contiguously, then update the cycle statistics. Samples that
    /// do not match their family are logged and dropped.
    pub fn apply_cycle(&self, collector: &'static str, cycle: CycleResult) -> ApplyReport {
        let mut report = ApplyReport::default();
        let mut inner = self.inner.write();

        for family in inner.families.values_mut() {
            if family.collector == collector {
                family
                    .series
                    .retain(|_, series| cycle.failed.contains(&series.owner));
                report.retained += family.series.len();
            }
        }

        let succeeded = cycle.batches.len();
        for (owner, batch) in cycle.batches {
            for sample in batch.into_samples() {
                let family = match inner.families.get_mut(sample.family) {
                    Some(family) if family.collector == collector => family,
                    _ => {
                        report_apply_error(ApplyError::UnknownFamily {
                            collector,
                            family: sample.family.to_string(),
                        });
                        report.dropped += 1;
                        continue;
                    }
                };

                let names: Vec<&'static str> = sample.labels.iter().map(|(k, _)| *k).collect();
                if names != family.desc.labels {
                    report_apply_error(ApplyError::LabelMismatch {
                        family: sample.family.to_string(),
                        expected: family.desc.labels.to_vec(),
                        got: names,
                    });
                    report.dropped += 1;
                    continue;
                }

                let values = sample.labels.into_iter().map(|(_, v)| v).collect();
                family.series.insert(
                    values,
                    Series {
                        value: sample.value.as_f64(),
                        owner: owner.clone(),
                    },
                );
                report.applied += 1;
            }
        }

        let stats = inner.collectors.entry(collector).or_default();
        stats.cycles += 1;
        stats.errors_total += cycle.failed.len() as u64;
        stats.last_duration = cycle.duration;
        stats.last_succeeded = succeeded;
        stats.last_failed = cycle.failed.len();
        if cycle.failed.is_empty() {
            stats.last_success = Some(cycle.finished_at);
        }

        report
    }

    /// Count a tick skipped because the previous cycle was still running.
    pub fn record_skip(&self, collector: &'static str) {
        self.inner
            .write()
            .collectors
            .entry(collector)
            .or_default()
            .skipped_ticks += 1;
    }

    /// Record a successful discovery refresh.
    pub fn record_discovery(&self, projects: usize, agent_pools: usize, at: DateTime<Utc>) {
        let mut inner = self.inner.write();
        let stats = &mut inner.discovery;
        stats.refreshes += 1;
        stats.projects = projects;
        stats.agent_pools = agent_pools;
        stats.last_success = Some(at);
    }

    /// Record a failed discovery refresh.
    pub fn record_discovery_error(&self) {
        let mut inner = self.inner.write();
        inner.discovery.refreshes += 1;
        inner.discovery.errors_total += 1;
    }

    pub fn collector_stats(&self, collector: &str) -> Option<CollectorStats> {
        self.inner.read().collectors.get(collector).cloned()
    }

    pub fn discovery_stats(&self) -> DiscoveryStats {
        self.inner.read().discovery.clone()
    }

    /// Current series of a family as (labels, value), sorted by label values.
    pub fn series(&self, family: &str) -> Vec<(Vec<(String, String)>, f64)> {
        let inner = self.inner.read();
        let Some(family) = inner.families.get(family) else {
            return Vec::new();
        };

        family
            .series
            .iter()
            .map(|(values, series)| {
                let labels = family
                    .desc
                    .labels
                    .iter()
                    .zip(values)
                    .map(|(k, v)| (k.to_string(), v.clone()))
                    .collect();
                (labels, series.value)
            })
            .collect()
    }

    /// Get the current number of stored series.
    pub fn series_count(&self) -> usize {
        self.inner
            .read()
            .families
            .values()
            .map(|f| f.series.len())
            .sum()
    }

    /// Render metrics in Prometheus exposition format.
    ///
    /// Families without series are omitted.
    pub fn render(&self) -> String {
        let inner = self.inner.read();
        let mut output = String::with_capacity(estimate_size(&inner));

        for family in inner.families.values() {
            if family.series.is_empty() {
                continue;
            }

            writeln!(output, "# HELP {} {}", family.desc.name, family.desc.help).ok();
            writeln!(output, "# TYPE {} gauge", family.desc.name).ok();

            for (values, series) in &family.series {
                writeln!(
                    output,
                    "{}{} {}",
                    family.desc.name,
                    format_labels(family.desc.labels, values),
                    format_value(series.value)
                )
                .ok();
            }
        }

        render_self_metrics(&mut output, &inner);
        output
    }
}

fn estimate_size(inner: &Inner) -> usize {
    inner
        .families
        .values()
        .map(|f| f.series.len() * 120 + 100)
        .sum::<usize>()
        + 4096
}

fn report_apply_error(err: ApplyError) {
    error!(error = %err, "Dropping sample");
}

fn render_self_metrics(output: &mut String, inner: &Inner) {
    let collectors = &inner.collectors;

    let header = |output: &mut String, name: &str, help: &str, kind: &str| {
        writeln!(output, "# HELP {SELF_PREFIX}_{name} {help}").ok();
        writeln!(output, "# TYPE {SELF_PREFIX}_{name} {kind}").ok();
    };

    if !collectors.is_empty() {
        header(
            output,
            "collector_duration_seconds",
            "Duration of the last collection cycle",
            "gauge",
        );
        for (name, stats) in collectors {
            writeln!(
                output,
                "{SELF_PREFIX}_collector_duration_seconds{{collector=\"{name}\"}} {}",
                format_value(stats.last_duration.as_secs_f64())
            )
            .ok();
        }

        header(
            output,
            "collector_cycles_total",
            "Completed collection cycles",
            "counter",
        );
        for (name, stats) in collectors {
            writeln!(
                output,
                "{SELF_PREFIX}_collector_cycles_total{{collector=\"{name}\"}} {}",
                stats.cycles
            )
            .ok();
        }

        header(
            output,
            "collector_errors_total",
            "Resources whose collection failed",
            "counter",
        );
        for (name, stats) in collectors {
            writeln!(
                output,
                "{SELF_PREFIX}_collector_errors_total{{collector=\"{name}\"}} {}",
                stats.errors_total
            )
            .ok();
        }

        header(
            output,
            "collector_resources",
            "Resources collected in the last cycle, by result",
            "gauge",
        );
        for (name, stats) in collectors {
            writeln!(
                output,
                "{SELF_PREFIX}_collector_resources{{collector=\"{name}\",result=\"success\"}} {}",
                stats.last_succeeded
            )
            .ok();
            writeln!(
                output,
                "{SELF_PREFIX}_collector_resources{{collector=\"{name}\",result=\"error\"}} {}",
                stats.last_failed
            )
            .ok();
        }

        header(
            output,
            "collector_skipped_ticks_total",
            "Ticks skipped because the previous cycle was still running",
            "counter",
        );
        for (name, stats) in collectors {
            writeln!(
                output,
                "{SELF_PREFIX}_collector_skipped_ticks_total{{collector=\"{name}\"}} {}",
                stats.skipped_ticks
            )
            .ok();
        }

        if collectors.values().any(|s| s.last_success.is_some()) {
            header(
                output,
                "collector_last_success_timestamp_seconds",
                "End of the last cycle without failed resources",
                "gauge",
            );
            for (name, stats) in collectors {
                if let Some(at) = stats.last_success {
                    writeln!(
                        output,
                        "{SELF_PREFIX}_collector_last_success_timestamp_seconds{{collector=\"{name}\"}} {}",
                        at.timestamp()
                    )
                    .ok();
                }
            }
        }
    }

    let discovery = &inner.discovery;
    header(
        output,
        "discovery_refreshes_total",
        "Resource discovery refreshes",
        "counter",
    );
    writeln!(
        output,
        "{SELF_PREFIX}_discovery_refreshes_total {}",
        discovery.refreshes
    )
    .ok();

    header(
        output,
        "discovery_errors_total",
        "Failed resource discovery refreshes",
        "counter",
    );
    writeln!(
        output,
        "{SELF_PREFIX}_discovery_errors_total {}",
        discovery.errors_total
    )
    .ok();

    header(
        output,
        "discovery_resources",
        "Resources in the current snapshot, by type",
        "gauge",
    );
    writeln!(
        output,
        "{SELF_PREFIX}_discovery_resources{{type=\"project\"}} {}",
        discovery.projects
    )
    .ok();
    writeln!(
        output,
        "{SELF_PREFIX}_discovery_resources{{type=\"agentpool\"}} {}",
        discovery.agent_pools
    )
    .ok();

    if let Some(at) = discovery.last_success {
        header(
            output,
            "discovery_last_success_timestamp_seconds",
            "Time of the last successful discovery",
            "gauge",
        );
        writeln!(
            output,
            "{SELF_PREFIX}_discovery_last_success_timestamp_seconds {}",
            at.timestamp()
        )
        .ok();
    }
}

/// Escape special characters in label values.
fn escape_label_value(value: &str) -> String {
    let mut result = String::with_capacity(value.len());
    for c in value.chars() {
        match c {
            '\\' => result.push_str("\\\\"),
            '"' => result.push_str("\\\""),
            '\n' => result.push_str("\\n"),
            _ => result.push(c),
        }
    }
    result
}

/// Format a floating point value for Prometheus.
fn format_value(value: f64) -> String {
    if value.is_nan() {
        "NaN".to_string()
    } else if value.is_infinite() {
        if value.is_sign_positive() {
            "+Inf".to_string()
        } else {
            "-Inf".to_string()
        }
    } else if value.fract() == 0.0 {
        format!("{:.0}", value)
    } else {
        format!("{}", value)
    }
}

/// Format labels for Prometheus exposition format.
fn format_labels(names: &[&str], values: &[String]) -> String {
    if names.is_empty() {
        return String::new();
    }

    let parts: Vec<String> = names
        .iter()
        .zip(values)
        .map(|(k, v)| format!("{}=\"{}\"", k, escape_label_value(v)))
        .collect();

    format!("{{{}}}", parts.join(","))
}
