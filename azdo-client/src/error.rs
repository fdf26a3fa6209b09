//! Errors returned by the Azure DevOps API client.

use thiserror::Error;

/// Result type alias using [`ApiError`].
pub type Result<T> = std::result::Result<T, ApiError>;

/// Longest response body excerpt kept in an error message.
const MAX_BODY_EXCERPT: usize = 512;

/// Errors that can occur when calling the Azure DevOps REST API.
///
/// Every variant produced by a request carries the requested resource path so
/// callers can log and skip exactly that resource.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Credential rejected (401/403). Not retried; the process keeps running.
    #[error("{resource}: access denied (status {status})")]
    Auth { resource: String, status: u16 },

    /// Retryable failure (network error, timeout, 5xx, throttling) that
    /// outlived the retry budget.
    #[error("{resource}: giving up after {attempts} attempt(s): {message}")]
    Transient {
        resource: String,
        status: Option<u16>,
        attempts: u32,
        message: String,
    },

    /// Non-retryable client error (4xx other than throttling and auth).
    #[error("{resource}: request rejected with status {status}: {body}")]
    Permanent {
        resource: String,
        status: u16,
        body: String,
    },

    /// The response body did not match the expected model.
    #[error("{resource}: failed to decode response: {source}")]
    Decode {
        resource: String,
        #[source]
        source: serde_json::Error,
    },

    /// The HTTP client could not be constructed.
    #[error("HTTP client error: {0}")]
    Client(#[from] reqwest::Error),
}

impl ApiError {
    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        matches!(self, ApiError::Transient { .. })
    }

    /// HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Auth { status, .. } | ApiError::Permanent { status, .. } => Some(*status),
            ApiError::Transient { status, .. } => *status,
            ApiError::Decode { .. } | ApiError::Client(_) => None,
        }
    }

    /// Resource path the failed request targeted.
    pub fn resource(&self) -> Option<&str> {
        match self {
            ApiError::Auth { resource, .. }
            | ApiError::Transient { resource, .. }
            | ApiError::Permanent { resource, .. }
            | ApiError::Decode { resource, .. } => Some(resource),
            ApiError::Client(_) => None,
        }
    }

    /// Number of attempts made before failing.
    pub fn attempts(&self) -> Option<u32> {
        match self {
            ApiError::Transient { attempts, .. } => Some(*attempts),
            _ => None,
        }
    }

    pub(crate) fn permanent(resource: &str, status: u16, body: &str) -> Self {
        ApiError::Permanent {
            resource: resource.to_string(),
            status,
            body: excerpt(body),
        }
    }
}

/// Shorten a response body for inclusion in an error message.
pub(crate) fn excerpt(body: &str) -> String {
    let body = body.trim();
    if body.len() <= MAX_BODY_EXCERPT {
        return body.to_string();
    }
    let mut end = MAX_BODY_EXCERPT;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...", &body[..end])
}
