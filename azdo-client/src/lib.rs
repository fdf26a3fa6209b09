//! Azure DevOps REST API client
//!
//! Authenticated, paginated, retrying and concurrency-bounded access to the
//! Azure DevOps Services REST API:
//!
//! - [`client`] - `ApiClient`: ticket pool, retry loop, page stream
//! - [`api`] - Typed endpoint functions (projects, agents, builds, releases, git, work items)
//! - [`models`] - Response models
//! - [`page`] - Continuation-token pages and client-side record caps
//! - [`retry`] - Retry budget and backoff
//! - [`auth`] - Credentials
//! - [`error`] - Error types

pub mod api;
pub mod auth;
pub mod client;
pub mod error;
pub mod models;
pub mod page;
pub mod retry;

// Re-export commonly used types at the crate root
pub use auth::Credential;
pub use client::{ApiClient, ClientConfig, ClientStats, Host, Params, SharedClient};
pub use error::{ApiError, Result};
pub use page::{Page, retain_most_recent};
pub use retry::RetryPolicy;
