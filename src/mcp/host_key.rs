//! Host key verification policy.
//!
//! Decides what happens when a server presents a host key during the handshake.
//! The decision is made once per connection, inside the russh handler's
//! `check_server_key` callback, and carries no state beyond that connection.
//!
//! | Policy       | Known key | Unknown key        | Changed key        |
//! |--------------|-----------|--------------------|--------------------|
//! | `Strict`     | accept    | reject             | reject             |
//! | `AutoTrust`  | accept    | accept             | accept             |
//! | `Warn`       | accept    | accept + warning   | accept + warning   |
//!
//! `AutoTrust` never writes to known_hosts, so trust does not persist across batches.
//! `Warn` only marks the session; logging the warning is left to the caller.

use std::path::Path;
use std::sync::OnceLock;

use russh::keys;
use tracing::{debug, warn};

/// Host key verification behavior for unknown or changed host keys.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HostKeyPolicy {
    /// Reject hosts whose key is not already in known_hosts
    Strict,
    /// Accept any host key without recording it
    #[default]
    AutoTrust,
    /// Accept any host key, flagging unknown or changed keys
    Warn,
}

impl HostKeyPolicy {
    /// Parse a policy from its configuration string.
    ///
    /// Accepts `strict`, `auto_add`/`auto_trust` (dash or underscore) and
    /// `warn`/`warning`/`ignore`. Anything else falls back to [`HostKeyPolicy::Warn`].
    pub fn from_setting(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "strict" => HostKeyPolicy::Strict,
            "auto_add" | "auto_trust" => HostKeyPolicy::AutoTrust,
            "warn" | "warning" | "ignore" => HostKeyPolicy::Warn,
            other => {
                warn!(
                    "Unknown host key policy '{}', falling back to warning policy",
                    other
                );
                HostKeyPolicy::Warn
            }
        }
    }

    /// Configuration string for this policy.
    pub fn as_str(&self) -> &'static str {
        match self {
            HostKeyPolicy::Strict => "strict",
            HostKeyPolicy::AutoTrust => "auto_add",
            HostKeyPolicy::Warn => "warn",
        }
    }

    /// Whether a known_hosts lookup can change the outcome under this policy.
    pub fn needs_lookup(&self) -> bool {
        !matches!(self, HostKeyPolicy::AutoTrust)
    }

    /// Decide whether to continue the handshake given the known_hosts verdict.
    pub fn evaluate(&self, host: &str, verdict: HostKeyVerdict) -> HostKeyDecision {
        match (self, verdict) {
            (_, HostKeyVerdict::Known) | (HostKeyPolicy::AutoTrust, _) => HostKeyDecision::Accept,
            (HostKeyPolicy::Strict, HostKeyVerdict::Unknown) => {
                HostKeyDecision::Reject(format!("no known_hosts entry for {}", host))
            }
            (HostKeyPolicy::Strict, HostKeyVerdict::Changed) => HostKeyDecision::Reject(format!(
                "host key for {} does not match known_hosts",
                host
            )),
            (HostKeyPolicy::Warn, HostKeyVerdict::Unknown) => HostKeyDecision::AcceptWithWarning(
                format!("Unknown host key for {}, accepted without verification", host),
            ),
            (HostKeyPolicy::Warn, HostKeyVerdict::Changed) => {
                HostKeyDecision::AcceptWithWarning(format!(
                    "Host key for {} does not match known_hosts, accepted anyway",
                    host
                ))
            }
        }
    }
}

impl std::fmt::Display for HostKeyPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Result of looking up a presented host key in known_hosts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostKeyVerdict {
    Known,
    Unknown,
    Changed,
}

/// Outcome of applying a [`HostKeyPolicy`] to a verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostKeyDecision {
    Accept,
    AcceptWithWarning(String),
    Reject(String),
}

/// What the handshake callback observed, read back after the connection attempt.
///
/// The handler is moved into russh, so the outcome is shared through this
/// write-once record instead.
#[derive(Debug, Default)]
pub struct HostKeyReport {
    warning: OnceLock<String>,
    rejection: OnceLock<String>,
}

impl HostKeyReport {
    pub(crate) fn record(&self, decision: &HostKeyDecision) {
        match decision {
            HostKeyDecision::Accept => {}
            HostKeyDecision::AcceptWithWarning(msg) => {
                let _ = self.warning.set(msg.clone());
            }
            HostKeyDecision::Reject(msg) => {
                let _ = self.rejection.set(msg.clone());
            }
        }
    }

    pub fn warning(&self) -> Option<&str> {
        self.warning.get().map(String::as_str)
    }

    pub fn rejection(&self) -> Option<&str> {
        self.rejection.get().map(String::as_str)
    }
}

/// Look up a presented host key in known_hosts.
///
/// Uses `known_hosts_file` when given, otherwise the user's default
/// `~/.ssh/known_hosts`. Lookup errors (missing or unreadable file) count as unknown.
pub(crate) fn lookup_known_host(
    host: &str,
    port: u16,
    key: &keys::PublicKey,
    known_hosts_file: Option<&Path>,
) -> HostKeyVerdict {
    let result = match known_hosts_file {
        Some(path) => keys::check_known_hosts_path(host, port, key, path),
        None => keys::check_known_hosts(host, port, key),
    };

    match result {
        Ok(true) => HostKeyVerdict::Known,
        Ok(false) => HostKeyVerdict::Unknown,
        Err(keys::Error::KeyChanged { line }) => {
            debug!("Host key for {}:{} changed (known_hosts line {})", host, port, line);
            HostKeyVerdict::Changed
        }
        Err(e) => {
            debug!("known_hosts lookup for {}:{} failed: {}", host, port, e);
            HostKeyVerdict::Unknown
        }
    }
}
