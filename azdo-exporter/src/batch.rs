//! Metric families and the per-resource batches plug-ins produce.

use std::time::Duration;

use chrono::{DateTime, Utc};

/// Static description of a metric family.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FamilyDesc {
    pub name: &'static str,
    pub help: &'static str,
    /// Label names, in exposition order.
    pub labels: &'static [&'static str],
}

/// Value of a sample. Every kind is exposed as a gauge.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SampleValue {
    Gauge(f64),
    /// Exposed in seconds.
    Duration(Duration),
    /// Exposed as Unix seconds.
    Timestamp(DateTime<Utc>),
}

impl SampleValue {
    pub fn as_f64(&self) -> f64 {
        match self {
            SampleValue::Gauge(v) => *v,
            SampleValue::Duration(d) => d.as_secs_f64(),
            SampleValue::Timestamp(t) => t.timestamp_millis() as f64 / 1000.0,
        }
    }
}

/// One label set and value of one family.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub family: &'static str,
    pub labels: Vec<(&'static str, String)>,
    pub value: SampleValue,
}

/// Samples produced by one plug-in invocation for one resource.
///
/// Applied to the registry as a unit, after the cycle's barrier.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricBatch {
    samples: Vec<Sample>,
}

impl MetricBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn into_samples(self) -> Vec<Sample> {
        self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn push<L>(&mut self, family: &FamilyDesc, labels: L, value: SampleValue)
    where
        L: IntoIterator<Item = (&'static str, String)>,
    {
        self.samples.push(Sample {
            family: family.name,
            labels: labels.into_iter().collect(),
            value,
        });
    }

    /// Info sample: the labels carry the data, the value is 1.
    pub fn add_info<L>(&mut self, family: &FamilyDesc, labels: L)
    where
        L: IntoIterator<Item = (&'static str, String)>,
    {
        self.push(family, labels, SampleValue::Gauge(1.0));
    }

    pub fn add_gauge<L>(&mut self, family: &FamilyDesc, labels: L, value: f64)
    where
        L: IntoIterator<Item = (&'static str, String)>,
    {
        self.push(family, labels, SampleValue::Gauge(value));
    }

    pub fn add_bool<L>(&mut self, family: &FamilyDesc, labels: L, value: bool)
    where
        L: IntoIterator<Item = (&'static str, String)>,
    {
        self.add_gauge(family, labels, if value { 1.0 } else { 0.0 });
    }

    pub fn add_duration<L>(&mut self, family: &FamilyDesc, labels: L, value: Duration)
    where
        L: IntoIterator<Item = (&'static str, String)>,
    {
        self.push(family, labels, SampleValue::Duration(value));
    }

    pub fn add_time<L>(&mut self, family: &FamilyDesc, labels: L, value: DateTime<Utc>)
    where
        L: IntoIterator<Item = (&'static str, String)>,
    {
        self.push(family, labels, SampleValue::Timestamp(value));
    }
}

/// Elapsed time between two API timestamps, zero if they are out of order.
pub fn elapsed(from: DateTime<Utc>, to: DateTime<Utc>) -> Duration {
    (to - from).to_std().unwrap_or_default()
}
