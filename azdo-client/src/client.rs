//! Authenticated, paginated, retrying, concurrency-bounded API access.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use futures::{Stream, TryStreamExt};
use reqwest::StatusCode;
use reqwest::header::{HeaderMap, RETRY_AFTER};
use serde::de::DeserializeOwned;
use tokio::sync::Semaphore;
use tracing::{debug, trace, warn};

use crate::auth::Credential;
use crate::error::{ApiError, Result};
use crate::page::{CONTINUATION_HEADER, CONTINUATION_PARAM, ListEnvelope, Page};
use crate::retry::{RetryPolicy, RetryState};

/// Query parameters of one request.
pub type Params = Vec<(&'static str, String)>;

/// Which Azure DevOps service a path belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Host {
    /// `dev.azure.com/{organisation}`: projects, builds, git, agents, work items.
    Core,
    /// `vsrm.dev.azure.com/{organisation}`: release management.
    Release,
}

/// Client configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Organisation URL of the core service, e.g. `https://dev.azure.com/contoso`.
    pub organization_url: String,
    /// Organisation URL of the release service, e.g. `https://vsrm.dev.azure.com/contoso`.
    pub release_url: String,
    /// Credential sent with every request.
    pub credential: Credential,
    /// Value of the `api-version` query parameter.
    pub api_version: String,
    /// Process-wide limit of outstanding requests.
    pub concurrency_limit: usize,
    /// Retry budget and backoff.
    pub retry: RetryPolicy,
    /// Timeout of a single request attempt.
    pub timeout: Duration,
    /// Hard limit of records returned by [`ApiClient::list_all`].
    pub max_records: usize,
    /// `User-Agent` header.
    pub user_agent: String,
}

impl ClientConfig {
    /// Configuration with defaults for everything but location and credential.
    pub fn new(
        organization_url: impl Into<String>,
        release_url: impl Into<String>,
        credential: Credential,
    ) -> Self {
        Self {
            organization_url: organization_url.into(),
            release_url: release_url.into(),
            credential,
            api_version: "7.1".to_string(),
            concurrency_limit: 10,
            retry: RetryPolicy::default(),
            timeout: Duration::from_secs(30),
            max_records: 10_000,
            user_agent: format!("azdo-exporter/{}", env!("CARGO_PKG_VERSION")),
        }
    }
}

/// Snapshot of client counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ClientStats {
    /// Request attempts sent.
    pub requests: u64,
    /// Calls that failed for good.
    pub failures: u64,
    /// Attempts that were retried.
    pub retries: u64,
    /// Attempts currently holding a ticket.
    pub in_flight: u64,
    /// Size of the ticket pool.
    pub concurrency_limit: u64,
}

/// A successful response, read while holding the ticket.
struct RawResponse {
    continuation: Option<String>,
    body: String,
}

/// Azure DevOps REST API client.
///
/// Cheap to share behind an [`Arc`]; all collectors use the same instance so
/// the ticket pool bounds the total number of outstanding calls.
pub struct ApiClient {
    http: reqwest::Client,
    config: ClientConfig,
    tickets: Arc<Semaphore>,
    requests: AtomicU64,
    failures: AtomicU64,
    retries: AtomicU64,
}

/// Shareable client handle.
pub type SharedClient = Arc<ApiClient>;

impl ApiClient {
    /// Build a client. Fails only if the TLS backend cannot be initialised.
    pub fn new(config: ClientConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .use_rustls_tls()
            .timeout(config.timeout)
            .user_agent(config.user_agent.clone())
            .build()?;

        let concurrency = config.concurrency_limit.max(1);

        Ok(Self {
            http,
            tickets: Arc::new(Semaphore::new(concurrency)),
            config,
            requests: AtomicU64::new(0),
            failures: AtomicU64::new(0),
            retries: AtomicU64::new(0),
        })
    }

    /// The configuration this client was built with.
    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Current counters.
    pub fn stats(&self) -> ClientStats {
        let limit = self.config.concurrency_limit.max(1);
        let available = self.tickets.available_permits();
        ClientStats {
            requests: self.requests.load(Ordering::Relaxed),
            failures: self.failures.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            in_flight: limit.saturating_sub(available) as u64,
            concurrency_limit: limit as u64,
        }
    }

    fn url(&self, host: Host, path: &str) -> String {
        let base = match host {
            Host::Core => &self.config.organization_url,
            Host::Release => &self.config.release_url,
        };
        format!(
            "{}/{}",
            base.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    /// Fetch one page of a list endpoint.
    pub async fn get<T: DeserializeOwned>(
        &self,
        host: Host,
        path: &str,
        params: &[(&'static str, String)],
    ) -> Result<Page<T>> {
        let raw = self.execute(host, path, params).await?;
        let envelope: ListEnvelope<T> =
            serde_json::from_str(&raw.body).map_err(|source| self.decode_failure(path, source))?;

        Ok(Page {
            items: envelope.value,
            continuation: raw.continuation,
        })
    }

    /// Fetch a single object.
    pub async fn get_object<T: DeserializeOwned>(
        &self,
        host: Host,
        path: &str,
        params: &[(&'static str, String)],
    ) -> Result<T> {
        let raw = self.execute(host, path, params).await?;
        serde_json::from_str(&raw.body).map_err(|source| self.decode_failure(path, source))
    }

    /// Lazily stream every record of a paged list.
    ///
    /// Pages are fetched on demand as the stream is polled, so limiting the
    /// stream (e.g. with `StreamExt::take`) also limits the requests sent. The
    /// stream ends at the last page, after `max_records` records, on the first
    /// error, or if the server hands out a continuation token twice.
    pub fn list_all<T>(
        &self,
        host: Host,
        path: impl Into<String>,
        params: Params,
    ) -> impl Stream<Item = Result<T>> + Send + '_
    where
        T: DeserializeOwned + Send + 'static,
    {
        let path = path.into();
        let max_records = self.config.max_records;

        async_stream::try_stream! {
            let mut token: Option<String> = None;
            let mut seen_tokens = HashSet::new();
            let mut yielded = 0usize;

            'pages: loop {
                let mut page_params = params.clone();
                if let Some(token) = &token {
                    page_params.push((CONTINUATION_PARAM, token.clone()));
                }

                let page: Page<T> = self.get(host, &path, &page_params).await?;
                trace!(path = %path, records = page.items.len(), "Fetched page");

                for item in page.items {
                    if yielded >= max_records {
                        debug!(path = %path, max_records, "Record limit reached, stopping pagination");
                        break 'pages;
                    }
                    yielded += 1;
                    yield item;
                }

                match page.continuation {
                    None => break,
                    Some(next) if seen_tokens.insert(next.clone()) => token = Some(next),
                    Some(next) => {
                        warn!(path = %path, token = %next, "Continuation token repeated, stopping pagination");
                        break;
                    }
                }
            }
        }
    }

    /// Collect every record of a paged list into a vector.
    pub async fn collect_all<T>(&self, host: Host, path: &str, params: Params) -> Result<Vec<T>>
    where
        T: DeserializeOwned + Send + 'static,
    {
        self.list_all(host, path, params).try_collect().await
    }

    /// Send a GET with the retry policy applied.
    async fn execute(
        &self,
        host: Host,
        path: &str,
        params: &[(&'static str, String)],
    ) -> Result<RawResponse> {
        let url = self.url(host, path);
        let mut retry = RetryState::new(self.config.retry);

        loop {
            let attempt = retry.begin_attempt();
            let outcome = self.attempt(&url, path, params, attempt).await;

            match outcome {
                Ok(raw) => return Ok(raw),
                Err(Failure::Retryable {
                    status,
                    message,
                    retry_after,
                }) => {
                    if !retry.can_retry() {
                        self.failures.fetch_add(1, Ordering::Relaxed);
                        return Err(ApiError::Transient {
                            resource: path.to_string(),
                            status,
                            attempts: retry.attempt(),
                            message,
                        });
                    }

                    let delay = retry.next_delay(retry_after);
                    self.retries.fetch_add(1, Ordering::Relaxed);
                    warn!(
                        resource = %path,
                        status = ?status,
                        attempt,
                        max_attempts = self.config.retry.max_attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %message,
                        "Transient API failure, retrying"
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(Failure::Fatal(err)) => {
                    self.failures.fetch_add(1, Ordering::Relaxed);
                    return Err(err);
                }
            }
        }
    }

    /// One attempt. The ticket is held until the body has been read and is
    /// released before any backoff sleep.
    async fn attempt(
        &self,
        url: &str,
        path: &str,
        params: &[(&'static str, String)],
        attempt: u32,
    ) -> std::result::Result<RawResponse, Failure> {
        let _ticket = self
            .tickets
            .acquire()
            .await
            .map_err(|_| Failure::retryable(None, "ticket pool closed".to_string(), None))?;

        self.requests.fetch_add(1, Ordering::Relaxed);

        let request = self
            .http
            .get(url)
            .query(&[("api-version", self.config.api_version.as_str())])
            .query(params)
            .header(reqwest::header::ACCEPT, "application/json");
        let request = self.config.credential.apply(request);

        trace!(resource = %path, attempt, "Sending request");

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Err(Failure::retryable(None, e.to_string(), None)),
        };

        let status = response.status();
        let continuation = header_str(response.headers(), CONTINUATION_HEADER);
        let retry_after = retry_after(response.headers());

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Err(Failure::retryable(Some(status.as_u16()), e.to_string(), None)),
        };

        classify(status, path, body, retry_after).map(|body| RawResponse { continuation, body })
    }

    fn decode_failure(&self, path: &str, source: serde_json::Error) -> ApiError {
        self.failures.fetch_add(1, Ordering::Relaxed);
        ApiError::Decode {
            resource: path.to_string(),
            source,
        }
    }
}

/// Outcome of a failed attempt.
enum Failure {
    Retryable {
        status: Option<u16>,
        message: String,
        retry_after: Option<Duration>,
    },
    Fatal(ApiError),
}

impl Failure {
    fn retryable(status: Option<u16>, message: String, retry_after: Option<Duration>) -> Self {
        Failure::Retryable {
            status,
            message,
            retry_after,
        }
    }
}

/// Map a response status to success, a retryable failure or a final error.
fn classify(
    status: StatusCode,
    path: &str,
    body: String,
    retry_after: Option<Duration>,
) -> std::result::Result<String, Failure> {
    if status.is_success() {
        return Ok(body);
    }

    if status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error() {
        let message = format!("status {}: {}", status.as_u16(), crate::error::excerpt(&body));
        return Err(Failure::retryable(
            Some(status.as_u16()),
            message,
            retry_after,
        ));
    }

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(Failure::Fatal(ApiError::Auth {
            resource: path.to_string(),
            status: status.as_u16(),
        }));
    }

    Err(Failure::Fatal(ApiError::permanent(
        path,
        status.as_u16(),
        &body,
    )))
}

fn header_str(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|v| !v.is_empty())
        .map(str::to_string)
}

/// `Retry-After` in delta-seconds form.
fn retry_after(headers: &HeaderMap) -> Option<Duration> {
    headers
        .get(RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client() -> ApiClient {
        ApiClient::new(ClientConfig::new(
            "https://dev.azure.com/contoso/",
            "https://vsrm.dev.azure.com/contoso",
            Credential::personal_access_token("token"),
        ))
        .unwrap()
    }

    #[test]
    fn test_url_joins_host_and_path() {
        let client = client();
        assert_eq!(
            client.url(Host::Core, "/_apis/projects"),
            "https://dev.azure.com/contoso/_apis/projects"
        );
        assert_eq!(
            client.url(Host::Release, "p1/_apis/release/releases"),
            "https://vsrm.dev.azure.com/contoso/p1/_apis/release/releases"
        );
    }

    #[test]
    fn test_classify_statuses() {
        assert!(classify(StatusCode::OK, "x", "{}".into(), None).is_ok());
        assert!(matches!(
            classify(StatusCode::TOO_MANY_REQUESTS, "x", String::new(), None),
            Err(Failure::Retryable { status: Some(429), .. })
        ));
        assert!(matches!(
            classify(StatusCode::BAD_GATEWAY, "x", String::new(), None),
            Err(Failure::Retryable { status: Some(502), .. })
        ));
        assert!(matches!(
            classify(StatusCode::UNAUTHORIZED, "x", String::new(), None),
            Err(Failure::Fatal(ApiError::Auth { status: 401, .. }))
        ));
        assert!(matches!(
            classify(StatusCode::NOT_FOUND, "x", String::new(), None),
            Err(Failure::Fatal(ApiError::Permanent { status: 404, .. }))
        ));
    }

    #[test]
    fn test_retry_after_parsing() {
        let mut headers = HeaderMap::new();
        headers.insert(RETRY_AFTER, "7".parse().unwrap());
        assert_eq!(retry_after(&headers), Some(Duration::from_secs(7)));

        headers.insert(RETRY_AFTER, "Wed, 21 Oct 2015 07:28:00 GMT".parse().unwrap());
        assert_eq!(retry_after(&headers), None);
    }

    #[test]
    fn test_stats_start_at_zero() {
        let stats = client().stats();
        assert_eq!(stats.requests, 0);
        assert_eq!(stats.in_flight, 0);
        assert_eq!(stats.concurrency_limit, 10);
    }
}
