//! Error types for fleet command execution.
//!
//! Errors fall into two scopes:
//!
//! 1. **Batch errors** ([`BatchError`]): configuration problems detected before any
//!    work starts (no servers, no key, no username, unknown target servers, key
//!    storage or key decoding failures). They abort the whole batch and are reported
//!    as an empty result set with an error message.
//!
//! 2. **Host errors** ([`HostError`]): failures attributable to a single server
//!    (connection, authentication, command execution). They are captured into that
//!    server's `HostResult` and never affect sibling servers.
//!
//! A command that runs and exits with a nonzero status is not an error at all: it is
//! reported with `success = false` and an empty `error` field.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors that abort a batch before any connection is attempted.
#[derive(Debug, Error)]
pub enum BatchError {
    /// Missing or invalid configuration (servers, key, username, target subset)
    #[error("{0}")]
    Configuration(String),

    /// The temporary key file could not be created or written
    #[error("Failed to materialize SSH private key: {0}")]
    KeyMaterial(#[from] std::io::Error),

    /// None of the supported key encodings could decode the key material
    #[error("Unable to load private key: {0}")]
    KeyLoad(String),
}

/// Coarse classification of a host-level failure, exposed to result consumers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum HostErrorKind {
    /// Transport or handshake failure, including timeouts and host key rejection
    Connection,
    /// The server rejected the credentials
    Authentication,
    /// Session established but the command produced no usable exit status
    CommandExecution,
}

impl std::fmt::Display for HostErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            HostErrorKind::Connection => write!(f, "connection"),
            HostErrorKind::Authentication => write!(f, "authentication"),
            HostErrorKind::CommandExecution => write!(f, "command_execution"),
        }
    }
}

/// Failures scoped to a single server.
#[derive(Debug, Clone, Error)]
pub enum HostError {
    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("Connection timed out after {0:?}")]
    ConnectTimeout(Duration),

    #[error("Host key verification failed: {0}")]
    HostKeyRejected(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Command execution failed: {0}")]
    Channel(String),

    #[error("Command execution failed: {0}")]
    NoExitStatus(String),

    #[error("Command timed out after {0:?}")]
    CommandTimeout(Duration),

    /// The worker task for this server panicked or was aborted
    #[error("Execution task failed: {0}")]
    TaskPanicked(String),
}

impl HostError {
    /// Classify this error for result consumers.
    #[must_use]
    pub fn kind(&self) -> HostErrorKind {
        match self {
            HostError::Connect(_) | HostError::ConnectTimeout(_) | HostError::HostKeyRejected(_) => {
                HostErrorKind::Connection
            }
            HostError::Authentication(_) => HostErrorKind::Authentication,
            HostError::Channel(_)
            | HostError::NoExitStatus(_)
            | HostError::CommandTimeout(_)
            | HostError::TaskPanicked(_) => HostErrorKind::CommandExecution,
        }
    }
}
