//! Prometheus exporter for Azure DevOps.
//!
//! Polls the Azure DevOps REST API on independent schedules and exposes
//! project, pipeline, release and agent pool metrics via an HTTP `/metrics`
//! endpoint.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────┐  snapshot  ┌─────────────┐  batches  ┌─────────────┐
//! │  Discovery  │───────────>│ Collectors  │──────────>│  Registry   │──> /metrics
//! │ (projects,  │            │ (one timer  │  (one     │ (families,  │
//! │  pools)     │            │  per kind)  │  apply)   │  series)    │
//! └─────────────┘            └─────────────┘           └─────────────┘
//!        │                          │
//!        └────────── ApiClient ─────┘
//!          (tickets, retries, pages)
//! ```
//!
//! # Usage
//!
//! ```bash
//! azdo-exporter --config azdo-exporter.json5
//! ```
//!
//! # Configuration
//!
//! See [`config::ExporterConfig`] for configuration options.

pub mod batch;
pub mod collector;
pub mod config;
pub mod discovery;
pub mod error;
pub mod exporter;
pub mod http;
pub mod plugins;
pub mod registry;
pub mod resource;
pub mod scheduler;

pub use batch::{FamilyDesc, MetricBatch};
pub use collector::{Collector, CollectorState, CycleReport};
pub use config::{ConfigError, ExporterConfig, Settings};
pub use discovery::Discovery;
pub use exporter::Exporter;
pub use http::HttpServer;
pub use plugins::{CollectContext, CollectorKind};
pub use registry::{Registry, SharedRegistry};
pub use resource::{Resource, ResourceSnapshot, ResourceSource};
pub use scheduler::Scheduler;
