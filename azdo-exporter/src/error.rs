//! Error types of the exporter.
//!
//! Configuration errors live in [`crate::config::ConfigError`]; everything
//! here happens at runtime and is logged rather than propagated to scrape
//! clients.

use azdo_client::ApiError;
use thiserror::Error;

use crate::resource::Scope;

/// Failure of one plug-in invocation for one resource.
#[derive(Debug, Error)]
pub enum CollectError {
    #[error(transparent)]
    Api(#[from] ApiError),

    /// The scheduler handed a resource of the wrong kind to a plug-in.
    #[error("collector '{collector}' expects a {expected:?} resource, got '{resource}'")]
    ScopeMismatch {
        collector: &'static str,
        expected: Scope,
        resource: String,
    },
}

/// Resource discovery failed; the previous snapshot stays in use.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("failed to list projects: {0}")]
    Projects(#[source] ApiError),

    #[error("failed to list agent pools: {0}")]
    AgentPools(#[source] ApiError),
}

/// A sample rejected by the registry.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ApplyError {
    #[error("collector '{collector}' does not own metric family '{family}'")]
    UnknownFamily {
        collector: &'static str,
        family: String,
    },

    #[error("labels {got:?} do not match family '{family}' labels {expected:?}")]
    LabelMismatch {
        family: String,
        expected: Vec<&'static str>,
        got: Vec<&'static str>,
    },
}

/// Conflicting metric family registration.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum RegistryError {
    #[error("metric family '{family}' is already registered by collector '{owner}'")]
    AlreadyOwned {
        family: &'static str,
        owner: &'static str,
    },

    #[error("metric family '{family}' registered twice with different labels")]
    LabelConflict { family: &'static str },
}
