//! Configuration for the Azure DevOps exporter.

use std::collections::{HashMap, HashSet};
use std::net::SocketAddr;
use std::path::Path;
use std::time::Duration;

use azdo_client::{ClientConfig, Credential, RetryPolicy};
use azdo_common::LoggingConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::plugins::CollectorKind;
use crate::resource::QueryTarget;

/// Configuration errors. All of them abort startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to load config: {0}")]
    Load(#[from] azdo_common::Error),
    #[error("Validation error: {0}")]
    Validation(String),
    #[error(
        "No access token configured (set azure_devops.access_token, \
         azure_devops.access_token_file or AZURE_DEVOPS_ACCESS_TOKEN)"
    )]
    MissingCredential,
    #[error("Failed to read access token: {0}")]
    CredentialFile(#[source] azdo_common::Error),
}

/// Complete exporter configuration, as read from the JSON5 file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExporterConfig {
    /// Organisation, credential and resource selection.
    #[serde(default)]
    pub azure_devops: AzureDevopsConfig,

    /// API request behaviour.
    #[serde(default)]
    pub request: RequestConfig,

    /// Per-dimension caps and history windows.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Collector intervals and fan-out.
    #[serde(default)]
    pub scrape: ScrapeConfig,

    /// Resource discovery.
    #[serde(default)]
    pub discovery: DiscoveryConfig,

    /// HTTP endpoint.
    #[serde(default)]
    pub server: ServerConfig,

    /// Logging configuration.
    #[serde(default)]
    pub logging: LoggingConfig,
}

/// How the access token is sent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuthScheme {
    /// Personal access token over HTTP Basic.
    #[default]
    Pat,
    /// OAuth / Entra ID bearer token.
    Bearer,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AzureDevopsConfig {
    /// Organisation name, e.g. "contoso".
    #[serde(default)]
    pub organisation: String,

    /// Core API base URL (default: "https://dev.azure.com/<organisation>").
    #[serde(default)]
    pub url: Option<String>,

    /// Release API base URL (default: "https://vsrm.dev.azure.com/<organisation>",
    /// or `url` when only that is set).
    #[serde(default)]
    pub release_url: Option<String>,

    #[serde(default, skip_serializing)]
    pub access_token: Option<String>,

    /// File holding the access token; surrounding whitespace is ignored.
    #[serde(default)]
    pub access_token_file: Option<String>,

    #[serde(default)]
    pub auth: AuthScheme,

    /// REST API version (default: "5.1").
    #[serde(default = "default_api_version")]
    pub api_version: String,

    /// Only watch these agent pools (empty = all).
    #[serde(default)]
    pub agent_pool_ids: Vec<i64>,

    /// Saved queries as "<query id>@<project id>".
    #[serde(default)]
    pub queries: Vec<String>,

    /// Only watch these projects, by id or name (empty = all).
    #[serde(default)]
    pub filter_projects: Vec<String>,

    /// Never watch these projects, by id or name.
    #[serde(default)]
    pub blacklist_projects: Vec<String>,
}

fn default_api_version() -> String {
    "5.1".to_string()
}

impl Default for AzureDevopsConfig {
    fn default() -> Self {
        Self {
            organisation: String::new(),
            url: None,
            release_url: None,
            access_token: None,
            access_token_file: None,
            auth: AuthScheme::default(),
            api_version: default_api_version(),
            agent_pool_ids: Vec::new(),
            queries: Vec::new(),
            filter_projects: Vec::new(),
            blacklist_projects: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// Maximum outstanding API requests across all collectors (default: 10).
    #[serde(default = "default_concurrency_limit")]
    pub concurrency_limit: usize,

    /// Maximum attempts per API call, the first one included (default: 3).
    #[serde(default = "default_retries")]
    pub retries: u32,

    /// Timeout of one request attempt (default: 30).
    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,

    #[serde(default = "default_retry_base_delay")]
    pub retry_base_delay_ms: u64,

    #[serde(default = "default_retry_max_delay")]
    pub retry_max_delay_ms: u64,
}

fn default_concurrency_limit() -> usize {
    10
}

fn default_retries() -> u32 {
    3
}

fn default_timeout() -> u64 {
    30
}

fn default_retry_base_delay() -> u64 {
    500
}

fn default_retry_max_delay() -> u64 {
    30_000
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            concurrency_limit: default_concurrency_limit(),
            retries: default_retries(),
            timeout_secs: default_timeout(),
            retry_base_delay_ms: default_retry_base_delay(),
            retry_max_delay_ms: default_retry_max_delay(),
        }
    }
}

/// Per-dimension caps. Each keeps the most recent records.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LimitsConfig {
    #[serde(default = "default_hundred")]
    pub projects: usize,
    #[serde(default = "default_hundred")]
    pub builds_per_project: usize,
    #[serde(default = "default_builds_per_definition")]
    pub builds_per_definition: usize,
    #[serde(default = "default_hundred")]
    pub build_definitions_per_project: usize,
    #[serde(default = "default_hundred")]
    pub release_definitions_per_project: usize,
    #[serde(default = "default_hundred")]
    pub releases_per_definition: usize,
    #[serde(default = "default_hundred")]
    pub releases_per_project: usize,
    #[serde(default = "default_hundred")]
    pub deployments_per_definition: usize,
    #[serde(default = "default_work_items_per_query")]
    pub work_items_per_query: usize,
    /// How far back builds are listed (default: 48).
    #[serde(default = "default_history_hours")]
    pub build_history_hours: u64,
    /// How far back releases are listed (default: 48).
    #[serde(default = "default_history_hours")]
    pub release_history_hours: u64,
    /// Hard stop for any paged listing (default: 10000).
    #[serde(default = "default_max_records")]
    pub max_records: usize,
}

fn default_hundred() -> usize {
    100
}

fn default_builds_per_definition() -> usize {
    10
}

fn default_work_items_per_query() -> usize {
    200
}

fn default_history_hours() -> u64 {
    48
}

fn default_max_records() -> usize {
    10_000
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            projects: default_hundred(),
            builds_per_project: default_hundred(),
            builds_per_definition: default_builds_per_definition(),
            build_definitions_per_project: default_hundred(),
            release_definitions_per_project: default_hundred(),
            releases_per_definition: default_hundred(),
            releases_per_project: default_hundred(),
            deployments_per_definition: default_hundred(),
            work_items_per_query: default_work_items_per_query(),
            build_history_hours: default_history_hours(),
            release_history_hours: default_history_hours(),
            max_records: default_max_records(),
        }
    }
}

impl LimitsConfig {
    pub fn build_history(&self) -> chrono::Duration {
        chrono::Duration::hours(self.build_history_hours as i64)
    }

    pub fn release_history(&self) -> chrono::Duration {
        chrono::Duration::hours(self.release_history_hours as i64)
    }
}

/// Collector intervals. An unset per-collector interval falls back to
/// `time_secs`; an interval of 0 disables the collector.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScrapeConfig {
    /// Default interval (default: 1800).
    #[serde(default = "default_scrape_time")]
    pub time_secs: u64,
    /// Interval of the live collectors: general, project, agentpool,
    /// latestbuild (default: 30).
    #[serde(default = "default_scrape_time_live")]
    pub time_live_secs: u64,
    #[serde(default)]
    pub time_repository_secs: Option<u64>,
    #[serde(default)]
    pub time_pull_request_secs: Option<u64>,
    #[serde(default)]
    pub time_build_secs: Option<u64>,
    #[serde(default)]
    pub time_release_secs: Option<u64>,
    #[serde(default)]
    pub time_deployment_secs: Option<u64>,
    #[serde(default)]
    pub time_stats_secs: Option<u64>,
    #[serde(default)]
    pub time_resource_usage_secs: Option<u64>,
    #[serde(default)]
    pub time_query_secs: Option<u64>,

    /// Resources collected in parallel per collector (default: 10).
    #[serde(default = "default_fan_out")]
    pub fan_out_concurrency: usize,

    /// Per-collector fan-out overrides, by collector name.
    #[serde(default)]
    pub concurrency: HashMap<String, usize>,

    /// Collectors that never run, by name.
    #[serde(default)]
    pub disabled: Vec<String>,
}

fn parse_kind(name: &str) -> Result<CollectorKind, ConfigError> {
    name.parse::<CollectorKind>().map_err(|_| {
        ConfigError::Validation(format!(
            "Unknown collector '{}' (known: {})",
            name,
            CollectorKind::ALL
                .iter()
                .map(|k| k.name())
                .collect::<Vec<_>>()
                .join(", ")
        ))
    })
}

fn default_scrape_time() -> u64 {
    30 * 60
}

fn default_scrape_time_live() -> u64 {
    30
}

fn default_fan_out() -> usize {
    10
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            time_secs: default_scrape_time(),
            time_live_secs: default_scrape_time_live(),
            time_repository_secs: None,
            time_pull_request_secs: None,
            time_build_secs: None,
            time_release_secs: None,
            time_deployment_secs: None,
            time_stats_secs: None,
            time_resource_usage_secs: None,
            time_query_secs: None,
            fan_out_concurrency: default_fan_out(),
            concurrency: HashMap::new(),
            disabled: Vec::new(),
        }
    }
}

impl ScrapeConfig {
    /// Disabled collectors. Names match case-insensitively.
    pub fn disabled_kinds(&self) -> Result<HashSet<CollectorKind>, ConfigError> {
        self.disabled.iter().map(|name| parse_kind(name)).collect()
    }

    /// Per-collector fan-out overrides, keyed by collector.
    pub fn concurrency_overrides(&self) -> Result<HashMap<CollectorKind, usize>, ConfigError> {
        self.concurrency
            .iter()
            .map(|(name, &limit)| Ok((parse_kind(name)?, limit)))
            .collect()
    }

    /// Interval of a collector, in seconds, with fallbacks applied.
    pub fn interval_secs(&self, kind: CollectorKind) -> u64 {
        let specific = match kind {
            CollectorKind::General
            | CollectorKind::Project
            | CollectorKind::AgentPool
            | CollectorKind::LatestBuild => return self.time_live_secs,
            CollectorKind::Repository => self.time_repository_secs,
            CollectorKind::PullRequest => self.time_pull_request_secs,
            CollectorKind::Build => self.time_build_secs,
            CollectorKind::Release => self.time_release_secs,
            CollectorKind::Deployment => self.time_deployment_secs,
            CollectorKind::Stats => self.time_stats_secs,
            CollectorKind::ResourceUsage => self.time_resource_usage_secs,
            CollectorKind::Query => self.time_query_secs,
        };
        specific.unwrap_or(self.time_secs)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DiscoveryConfig {
    /// How often projects and agent pools are re-listed (default: 1800).
    #[serde(default = "default_scrape_time")]
    pub refresh_secs: u64,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            refresh_secs: default_scrape_time(),
        }
    }
}

/// HTTP endpoint configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    #[serde(default = "default_listen")]
    pub listen: String,

    /// Path for metrics endpoint (default: "/metrics").
    #[serde(default = "default_path")]
    pub metrics_path: String,

    #[serde(default = "default_read_timeout")]
    pub read_timeout_secs: u64,

    #[serde(default = "default_write_timeout")]
    pub write_timeout_secs: u64,
}

fn default_listen() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_path() -> String {
    "/metrics".to_string()
}

fn default_read_timeout() -> u64 {
    5
}

fn default_write_timeout() -> u64 {
    10
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen: default_listen(),
            metrics_path: default_path(),
            read_timeout_secs: default_read_timeout(),
            write_timeout_secs: default_write_timeout(),
        }
    }
}

/// Schedule of one collector, resolved once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CollectorSchedule {
    pub kind: CollectorKind,
    pub interval: Duration,
    /// Resources collected in parallel.
    pub fan_out: usize,
    pub enabled: bool,
}

/// Discovery parameters, resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct DiscoverySettings {
    pub interval: Duration,
    pub project_limit: usize,
    pub filter_projects: Vec<String>,
    pub blacklist_projects: Vec<String>,
    pub agent_pool_ids: Vec<i64>,
}

/// HTTP server parameters, resolved.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerSettings {
    pub listen: SocketAddr,
    pub metrics_path: String,
    /// Read and write timeout combined.
    pub request_timeout: Duration,
}

/// Immutable runtime settings derived from [`ExporterConfig`].
#[derive(Debug, Clone)]
pub struct Settings {
    pub organisation: String,
    pub client: ClientConfig,
    pub schedules: Vec<CollectorSchedule>,
    pub queries: Vec<QueryTarget>,
    pub discovery: DiscoverySettings,
    pub server: ServerSettings,
    pub limits: LimitsConfig,
}

impl Settings {
    pub fn schedule(&self, kind: CollectorKind) -> Option<&CollectorSchedule> {
        self.schedules.iter().find(|s| s.kind == kind)
    }
}

impl ExporterConfig {
    /// Load configuration from a JSON5 file.
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let config: ExporterConfig = azdo_common::load_config(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Parse configuration from a JSON5 string.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let config: ExporterConfig = azdo_common::parse_config(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate the configuration.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for query in &self.azure_devops.queries {
            query.parse::<QueryTarget>().map_err(ConfigError::Validation)?;
        }

        if self.azure_devops.api_version.trim().is_empty() {
            return Err(ConfigError::Validation(
                "azure_devops.api_version must not be empty".to_string(),
            ));
        }

        self.scrape.disabled_kinds()?;
        self.scrape.concurrency_overrides()?;

        let positive = [
            ("request.concurrency_limit", self.request.concurrency_limit as u64),
            ("request.retries", self.request.retries as u64),
            ("request.timeout_secs", self.request.timeout_secs),
            ("limits.max_records", self.limits.max_records as u64),
            ("scrape.fan_out_concurrency", self.scrape.fan_out_concurrency as u64),
            ("discovery.refresh_secs", self.discovery.refresh_secs),
            ("server.read_timeout_secs", self.server.read_timeout_secs),
            ("server.write_timeout_secs", self.server.write_timeout_secs),
        ];
        for (name, value) in positive {
            if value == 0 {
                return Err(ConfigError::Validation(format!("{name} must be > 0")));
            }
        }

        if let Some((name, _)) = self.scrape.concurrency.iter().find(|(_, v)| **v == 0) {
            return Err(ConfigError::Validation(format!(
                "scrape.concurrency.{name} must be > 0"
            )));
        }

        // Validate listen address format
        if self.server.listen.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::Validation(format!(
                "Invalid listen address: {}",
                self.server.listen
            )));
        }

        // Validate path starts with /
        if !self.server.metrics_path.starts_with('/') {
            return Err(ConfigError::Validation(
                "Metrics path must start with /".to_string(),
            ));
        }

        if matches!(self.server.metrics_path.as_str(), "/healthz" | "/readyz") {
            return Err(ConfigError::Validation(format!(
                "Metrics path {} collides with a health endpoint",
                self.server.metrics_path
            )));
        }

        Ok(())
    }

    /// Resolve the credential and all fallbacks into runtime settings.
    pub fn resolve(&self) -> Result<Settings, ConfigError> {
        self.validate()?;

        let devops = &self.azure_devops;
        let organisation = devops.organisation.trim().to_string();
        if organisation.is_empty() && devops.url.is_none() {
            return Err(ConfigError::Validation(
                "azure_devops.organisation (or azure_devops.url) is required".to_string(),
            ));
        }

        let organization_url = devops
            .url
            .clone()
            .unwrap_or_else(|| format!("https://dev.azure.com/{organisation}"));
        let release_url = match (&devops.release_url, &devops.url) {
            (Some(url), _) => url.clone(),
            (None, Some(url)) => url.clone(),
            (None, None) => format!("https://vsrm.dev.azure.com/{organisation}"),
        };

        let mut client = ClientConfig::new(organization_url, release_url, self.credential()?);
        client.api_version = devops.api_version.clone();
        client.concurrency_limit = self.request.concurrency_limit;
        client.timeout = Duration::from_secs(self.request.timeout_secs);
        client.max_records = self.limits.max_records;
        client.retry = RetryPolicy {
            max_attempts: self.request.retries,
            base_delay: Duration::from_millis(self.request.retry_base_delay_ms),
            max_delay: Duration::from_millis(self.request.retry_max_delay_ms),
        };

        let queries = devops
            .queries
            .iter()
            .map(|q| q.parse::<QueryTarget>().map_err(ConfigError::Validation))
            .collect::<Result<Vec<_>, _>>()?;

        let disabled = self.scrape.disabled_kinds()?;
        let overrides = self.scrape.concurrency_overrides()?;
        let schedules = CollectorKind::ALL
            .iter()
            .map(|&kind| {
                let interval = self.scrape.interval_secs(kind);
                let no_queries = kind == CollectorKind::Query && queries.is_empty();
                CollectorSchedule {
                    kind,
                    interval: Duration::from_secs(interval),
                    fan_out: overrides
                        .get(&kind)
                        .copied()
                        .unwrap_or(self.scrape.fan_out_concurrency),
                    enabled: interval > 0 && !disabled.contains(&kind) && !no_queries,
                }
            })
            .collect();

        let listen = self.server.listen.parse().map_err(|_| {
            ConfigError::Validation(format!("Invalid listen address: {}", self.server.listen))
        })?;

        Ok(Settings {
            organisation: if organisation.is_empty() {
                client.organization_url.clone()
            } else {
                organisation
            },
            client,
            schedules,
            queries,
            discovery: DiscoverySettings {
                interval: Duration::from_secs(self.discovery.refresh_secs),
                project_limit: self.limits.projects,
                filter_projects: devops.filter_projects.clone(),
                blacklist_projects: devops.blacklist_projects.clone(),
                agent_pool_ids: devops.agent_pool_ids.clone(),
            },
            server: ServerSettings {
                listen,
                metrics_path: self.server.metrics_path.clone(),
                request_timeout: Duration::from_secs(
                    self.server
                        .read_timeout_secs
                        .saturating_add(self.server.write_timeout_secs),
                ),
            },
            limits: self.limits.clone(),
        })
    }

    fn credential(&self) -> Result<Credential, ConfigError> {
        let devops = &self.azure_devops;
        let token = match (&devops.access_token_file, &devops.access_token) {
            (Some(path), _) if !path.trim().is_empty() => {
                azdo_common::read_secret_file(path).map_err(ConfigError::CredentialFile)?
            }
            (_, Some(token)) if !token.trim().is_empty() => token.trim().to_string(),
            _ => return Err(ConfigError::MissingCredential),
        };

        Ok(match devops.auth {
            AuthScheme::Pat => Credential::personal_access_token(token),
            AuthScheme::Bearer => Credential::Bearer(token),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn with_token(json: &str) -> String {
        json.replacen('{', "{ azure_devops: { organisation: \"contoso\", access_token: \"t\" },", 1)
    }

    #[test]
    fn test_parse_minimal_config() {
        let config = ExporterConfig::parse("{}").unwrap();

        assert_eq!(config.server.listen, "0.0.0.0:8080");
        assert_eq!(config.server.metrics_path, "/metrics");
        assert_eq!(config.request.concurrency_limit, 10);
        assert_eq!(config.request.retries, 3);
        assert_eq!(config.azure_devops.api_version, "5.1");
        assert_eq!(config.scrape.time_secs, 1800);
        assert_eq!(config.scrape.time_live_secs, 30);
        assert_eq!(config.limits.builds_per_definition, 10);
        assert_eq!(config.limits.build_history_hours, 48);
    }

    #[test]
    fn test_parse_full_config() {
        let json = r#"{
            azure_devops: {
                organisation: "contoso",
                access_token: "secret",
                auth: "bearer",
                api_version: "7.1",
                agent_pool_ids: [1, 2],
                queries: ["q1@p1"],
                filter_projects: ["alpha"],
                blacklist_projects: ["legacy"]
            },
            request: { concurrency_limit: 4, retries: 5, timeout_secs: 10 },
            limits: { projects: 20, builds_per_definition: 3 },
            scrape: {
                time_secs: 600,
                time_live_secs: 15,
                time_build_secs: 120,
                fan_out_concurrency: 2,
                concurrency: { build: 8 },
                disabled: ["stats"]
            },
            discovery: { refresh_secs: 300 },
            server: { listen: "127.0.0.1:9100", metrics_path: "/azdo/metrics" },
            logging: { level: "debug", format: "json" }
        }"#;

        let config = ExporterConfig::parse(json).unwrap();
        assert_eq!(config.azure_devops.auth, AuthScheme::Bearer);
        assert_eq!(config.azure_devops.agent_pool_ids, vec![1, 2]);
        assert_eq!(config.limits.projects, 20);
        assert_eq!(config.logging.format, azdo_common::LogFormat::Json);

        let settings = config.resolve().unwrap();
        assert_eq!(settings.client.organization_url, "https://dev.azure.com/contoso");
        assert_eq!(settings.client.release_url, "https://vsrm.dev.azure.com/contoso");
        assert_eq!(settings.client.credential, Credential::Bearer("secret".into()));
        assert_eq!(settings.client.retry.max_attempts, 5);
        assert_eq!(settings.client.concurrency_limit, 4);
        assert_eq!(settings.queries.len(), 1);
        assert_eq!(settings.discovery.interval, Duration::from_secs(300));
        assert_eq!(settings.server.request_timeout, Duration::from_secs(15));

        let build = settings.schedule(CollectorKind::Build).unwrap();
        assert_eq!(build.interval, Duration::from_secs(120));
        assert_eq!(build.fan_out, 8);

        let release = settings.schedule(CollectorKind::Release).unwrap();
        assert_eq!(release.interval, Duration::from_secs(600));
        assert_eq!(release.fan_out, 2);

        let live = settings.schedule(CollectorKind::LatestBuild).unwrap();
        assert_eq!(live.interval, Duration::from_secs(15));

        assert!(!settings.schedule(CollectorKind::Stats).unwrap().enabled);
        assert!(settings.schedule(CollectorKind::Query).unwrap().enabled);
    }

    #[test]
    fn test_collector_names_match_case_insensitively() {
        let config = ExporterConfig::parse(&with_token(
            r#"{ scrape: { disabled: ["PullRequest", " STATS "], concurrency: { "Build": 1 } } }"#,
        ))
        .unwrap();
        let settings = config.resolve().unwrap();

        assert!(!settings.schedule(CollectorKind::PullRequest).unwrap().enabled);
        assert!(!settings.schedule(CollectorKind::Stats).unwrap().enabled);
        assert!(settings.schedule(CollectorKind::Release).unwrap().enabled);

        let build = settings.schedule(CollectorKind::Build).unwrap();
        assert!(build.enabled);
        assert_eq!(build.fan_out, 1);
    }

    #[test]
    fn test_request_timeout_saturates() {
        let mut config = ExporterConfig::parse(&with_token("{}")).unwrap();
        config.server.read_timeout_secs = u64::MAX;
        config.server.write_timeout_secs = 10;
        let settings = config.resolve().unwrap();
        assert_eq!(settings.server.request_timeout, Duration::from_secs(u64::MAX));
    }

    #[test]
    fn test_zero_interval_and_missing_queries_disable_collectors() {
        let config =
            ExporterConfig::parse(&with_token(r#"{ scrape: { time_repository_secs: 0 } }"#))
                .unwrap();
        let settings = config.resolve().unwrap();

        assert!(!settings.schedule(CollectorKind::Repository).unwrap().enabled);
        assert!(!settings.schedule(CollectorKind::Query).unwrap().enabled);
        assert!(settings.schedule(CollectorKind::Build).unwrap().enabled);
    }

    #[test]
    fn test_validate_malformed_query() {
        for query in ["no-separator", "a@b@c", "@p"] {
            let json = format!(r#"{{ azure_devops: {{ queries: ["{query}"] }} }}"#);
            let err = ExporterConfig::parse(&json).unwrap_err();
            assert!(err.to_string().contains("<query id>@<project id>"), "{query}");
        }
    }

    #[test]
    fn test_validate_unknown_collector() {
        let err = ExporterConfig::parse(r#"{ scrape: { disabled: ["bogus"] } }"#).unwrap_err();
        assert!(err.to_string().contains("Unknown collector 'bogus'"));
    }

    #[test]
    fn test_validate_zero_concurrency() {
        let err =
            ExporterConfig::parse(r#"{ request: { concurrency_limit: 0 } }"#).unwrap_err();
        assert!(err.to_string().contains("request.concurrency_limit"));

        let err =
            ExporterConfig::parse(r#"{ scrape: { concurrency: { build: 0 } } }"#).unwrap_err();
        assert!(err.to_string().contains("scrape.concurrency.build"));
    }

    #[test]
    fn test_validate_invalid_listen() {
        let result = ExporterConfig::parse(r#"{ server: { listen: "not-an-address" } }"#);
        assert!(
            result
                .unwrap_err()
                .to_string()
                .contains("Invalid listen address")
        );
    }

    #[test]
    fn test_validate_invalid_path() {
        let result = ExporterConfig::parse(r#"{ server: { metrics_path: "metrics" } }"#);
        assert!(result.unwrap_err().to_string().contains("must start with /"));

        let result = ExporterConfig::parse(r#"{ server: { metrics_path: "/healthz" } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_resolve_requires_credential() {
        let config = ExporterConfig::parse(r#"{ azure_devops: { organisation: "contoso" } }"#)
            .unwrap();
        assert!(matches!(
            config.resolve(),
            Err(ConfigError::MissingCredential)
        ));
    }

    #[test]
    fn test_resolve_requires_organisation() {
        let config = ExporterConfig::parse(r#"{ azure_devops: { access_token: "t" } }"#).unwrap();
        assert!(matches!(config.resolve(), Err(ConfigError::Validation(_))));
    }

    #[test]
    fn test_token_file_is_trimmed() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "  file-token \n").unwrap();

        let mut config = ExporterConfig::default();
        config.azure_devops.organisation = "contoso".into();
        config.azure_devops.access_token = Some("ignored".into());
        config.azure_devops.access_token_file = Some(file.path().display().to_string());

        let settings = config.resolve().unwrap();
        assert_eq!(
            settings.client.credential,
            Credential::personal_access_token("file-token")
        );
    }

    #[test]
    fn test_unreadable_token_file() {
        let mut config = ExporterConfig::default();
        config.azure_devops.organisation = "contoso".into();
        config.azure_devops.access_token_file = Some("/nonexistent/token".into());

        assert!(matches!(
            config.resolve(),
            Err(ConfigError::CredentialFile(_))
        ));
    }

    #[test]
    fn test_custom_url_serves_both_hosts() {
        let mut config = ExporterConfig::default();
        config.azure_devops.url = Some("http://127.0.0.1:1234".into());
        config.azure_devops.access_token = Some("t".into());

        let settings = config.resolve().unwrap();
        assert_eq!(settings.client.organization_url, "http://127.0.0.1:1234");
        assert_eq!(settings.client.release_url, "http://127.0.0.1:1234");
        assert_eq!(settings.organisation, "http://127.0.0.1:1234");
    }
}
