//! Organisation-wide API client statistics.

use crate::batch::{FamilyDesc, MetricBatch};
use crate::plugins::CollectContext;

pub const STATS: FamilyDesc = FamilyDesc {
    name: "azure_devops_stats",
    help: "Azure DevOps API client statistics",
    labels: &["name", "type"],
};

pub const FAMILIES: &[FamilyDesc] = &[STATS];

pub fn collect(ctx: &CollectContext) -> MetricBatch {
    let stats = ctx.client.stats();
    let mut batch = MetricBatch::new();

    let values = [
        ("requests", stats.requests as f64),
        ("failures", stats.failures as f64),
        ("retries", stats.retries as f64),
        ("inflight", stats.in_flight as f64),
        ("concurrency", stats.concurrency_limit as f64),
    ];
    for (kind, value) in values {
        batch.add_gauge(
            &STATS,
            [("name", ctx.organisation.clone()), ("type", kind.to_string())],
            value,
        );
    }

    batch
}
