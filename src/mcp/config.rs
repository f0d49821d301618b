//! Configuration resolution for the SSH fleet server.
//!
//! Configuration is read once at startup into an explicit [`SshConfig`] that is
//! passed to the tool layer. Values come from the process environment, which
//! [`load_env_files`] first fills from `.env.ssh` and then `.env` without
//! overriding variables that are already set.
//!
//! # Environment Variables
//!
//! | Variable | Default | Description |
//! |----------|---------|-------------|
//! | `SSH_PRIVATE_KEY` | - | Private key text (PEM or OpenSSH) |
//! | `SSH_SERVERS` | - | Comma-separated server list |
//! | `SSH_USERNAME` | - | Login user for every server |
//! | `SSH_PORT` | 22 | SSH port |
//! | `SSH_COMMAND_TIMEOUT` | 30s | Command execution timeout in seconds |
//! | `SSH_CONNECTION_TIMEOUT` | 10s | Connect and authentication timeout in seconds |
//! | `SSH_KNOWN_HOSTS_POLICY` | auto_add | `strict`, `auto_add` or `warn` |
//! | `SSH_KNOWN_HOSTS_FILE` | ~/.ssh/known_hosts | known_hosts file used for lookups |
//! | `SSH_KEY_DIR` | system temp dir | Directory for the per-batch key file |
//! | `MCP_PORT` | 8000 | HTTP port of the MCP server |
//!
//! Any value may be given as `base64:<data>`; it is decoded before use, and the
//! raw value is kept when decoding fails.

use std::env;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use super::error::BatchError;
use super::host_key::HostKeyPolicy;
use super::types::{ConfigView, ExecutionRequest};

/// Default SSH port
pub(crate) const DEFAULT_PORT: u16 = 22;

/// Default command execution timeout in seconds
pub(crate) const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;

/// Default connection timeout in seconds
pub(crate) const DEFAULT_CONNECTION_TIMEOUT_SECS: u64 = 10;

/// Default MCP HTTP port
pub(crate) const DEFAULT_MCP_PORT: u16 = 8000;

pub(crate) const PRIVATE_KEY_ENV_VAR: &str = "SSH_PRIVATE_KEY";
pub(crate) const SERVERS_ENV_VAR: &str = "SSH_SERVERS";
pub(crate) const USERNAME_ENV_VAR: &str = "SSH_USERNAME";
pub(crate) const PORT_ENV_VAR: &str = "SSH_PORT";
pub(crate) const COMMAND_TIMEOUT_ENV_VAR: &str = "SSH_COMMAND_TIMEOUT";
pub(crate) const CONNECTION_TIMEOUT_ENV_VAR: &str = "SSH_CONNECTION_TIMEOUT";
pub(crate) const KNOWN_HOSTS_POLICY_ENV_VAR: &str = "SSH_KNOWN_HOSTS_POLICY";
pub(crate) const KNOWN_HOSTS_FILE_ENV_VAR: &str = "SSH_KNOWN_HOSTS_FILE";
pub(crate) const KEY_DIR_ENV_VAR: &str = "SSH_KEY_DIR";
pub(crate) const MCP_PORT_ENV_VAR: &str = "MCP_PORT";

/// Prefix marking a base64-encoded configuration value
const BASE64_PREFIX: &str = "base64:";

/// Env files loaded at startup, first one wins for each variable
const ENV_FILES: [&str; 2] = [".env.ssh", ".env"];

/// Load `.env.ssh` and then `.env` into the process environment.
///
/// Variables already present in the environment are never overridden.
///
/// Call after the tracing subscriber is installed so parse failures are reported.
pub fn load_env_files() {
    for file in ENV_FILES {
        report_env_file(file, dotenv::from_filename(file).map(|_| ()));
    }
}

/// Log the outcome of loading one env file. A missing file is not an error.
fn report_env_file(file: &str, result: Result<(), dotenv::Error>) {
    match result {
        Ok(()) => debug!("Loaded environment from {}", file),
        Err(e) if e.not_found() => {}
        Err(e) => warn!("Failed to load {}: {}", file, e),
    }
}

/// Decode a `base64:` prefixed value, returning the raw value if decoding fails.
pub(crate) fn decode_env_value(raw: String) -> String {
    let Some(encoded) = raw.strip_prefix(BASE64_PREFIX) else {
        return raw;
    };

    match STANDARD
        .decode(encoded.trim())
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
    {
        Some(decoded) => decoded,
        None => {
            debug!("Value has base64 prefix but does not decode, using it verbatim");
            raw
        }
    }
}

/// Split a comma-separated server list, trimming entries and dropping empty ones.
pub(crate) fn parse_servers(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(String::from)
        .collect()
}

/// Private key text, wiped from memory on drop and never printed.
#[derive(Clone)]
pub struct KeyText(Zeroizing<String>);

impl KeyText {
    pub fn new(text: String) -> Self {
        Self(Zeroizing::new(text))
    }

    pub fn expose(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Debug for KeyText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("KeyText([REDACTED])")
    }
}

/// Credentials shared by every session of a batch.
#[derive(Debug, Clone)]
pub struct Credentials {
    pub key: KeyText,
    pub username: String,
    pub port: u16,
}

/// Server configuration, resolved once at startup.
#[derive(Debug, Clone)]
pub struct SshConfig {
    pub private_key: Option<KeyText>,
    pub servers: Vec<String>,
    pub username: Option<String>,
    pub port: u16,
    pub command_timeout: Duration,
    pub connection_timeout: Duration,
    pub known_hosts_policy: HostKeyPolicy,
    pub known_hosts_file: Option<PathBuf>,
    /// Directory for the temporary key file; `None` uses the system temp dir
    pub key_dir: Option<PathBuf>,
}

impl Default for SshConfig {
    fn default() -> Self {
        Self {
            private_key: None,
            servers: Vec::new(),
            username: None,
            port: DEFAULT_PORT,
            command_timeout: Duration::from_secs(DEFAULT_COMMAND_TIMEOUT_SECS),
            connection_timeout: Duration::from_secs(DEFAULT_CONNECTION_TIMEOUT_SECS),
            known_hosts_policy: HostKeyPolicy::default(),
            known_hosts_file: None,
            key_dir: None,
        }
    }
}

impl SshConfig {
    /// Resolve configuration from the process environment.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Resolve configuration from an arbitrary variable lookup.
    ///
    /// Blank values are treated as unset. Invalid numbers and zero timeouts fall
    /// back to their defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| {
            lookup(name)
                .map(decode_env_value)
                .filter(|v| !v.trim().is_empty())
        };

        let servers = get(SERVERS_ENV_VAR)
            .map(|v| parse_servers(&v))
            .unwrap_or_default();

        Self {
            private_key: get(PRIVATE_KEY_ENV_VAR).map(KeyText::new),
            servers,
            username: get(USERNAME_ENV_VAR).map(|v| v.trim().to_string()),
            port: parse_or(get(PORT_ENV_VAR), DEFAULT_PORT),
            command_timeout: resolve_timeout(
                get(COMMAND_TIMEOUT_ENV_VAR),
                DEFAULT_COMMAND_TIMEOUT_SECS,
            ),
            connection_timeout: resolve_timeout(
                get(CONNECTION_TIMEOUT_ENV_VAR),
                DEFAULT_CONNECTION_TIMEOUT_SECS,
            ),
            known_hosts_policy: get(KNOWN_HOSTS_POLICY_ENV_VAR)
                .map(|v| HostKeyPolicy::from_setting(&v))
                .unwrap_or_default(),
            known_hosts_file: get(KNOWN_HOSTS_FILE_ENV_VAR).map(PathBuf::from),
            key_dir: get(KEY_DIR_ENV_VAR).map(PathBuf::from),
        }
    }

    /// Credentials for a batch, or the configuration error that prevents one.
    ///
    /// The key is checked before the username.
    pub fn credentials(&self) -> Result<Credentials, BatchError> {
        let key = self.private_key.clone().ok_or_else(|| {
            BatchError::Configuration("SSH private key not configured".to_string())
        })?;
        let username = self.username.clone().ok_or_else(|| {
            BatchError::Configuration("SSH username not configured".to_string())
        })?;

        Ok(Credentials {
            key,
            username,
            port: self.port,
        })
    }

    /// Build a request for `command` using the configured timeouts.
    ///
    /// `servers` of `None` targets every configured server.
    pub fn request(
        &self,
        command: impl Into<String>,
        servers: Option<Vec<String>>,
    ) -> ExecutionRequest {
        ExecutionRequest {
            command: command.into(),
            servers,
            connection_timeout: self.connection_timeout,
            command_timeout: self.command_timeout,
        }
    }

    /// Configuration as reported to tool callers, without the key.
    pub fn view(&self) -> ConfigView {
        ConfigView {
            servers: self.servers.clone(),
            username: self.username.clone(),
            port: self.port,
            command_timeout_secs: self.command_timeout.as_secs(),
            connection_timeout_secs: self.connection_timeout.as_secs(),
            known_hosts_policy: self.known_hosts_policy.as_str().to_string(),
            has_private_key: self.private_key.is_some(),
        }
    }
}

/// Resolve the MCP HTTP port with priority: env var -> default
pub fn resolve_mcp_port() -> u16 {
    parse_or(env::var(MCP_PORT_ENV_VAR).ok(), DEFAULT_MCP_PORT)
}

fn parse_or<T: std::str::FromStr>(value: Option<String>, default: T) -> T {
    value
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn resolve_timeout(value: Option<String>, default_secs: u64) -> Duration {
    let secs = parse_or(value, default_secs);
    Duration::from_secs(if secs == 0 { default_secs } else { secs })
}
