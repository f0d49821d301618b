//! Serializable result types for the fleet execution tools.
//!
//! These records are the contract with result consumers: field names and value
//! domains (`success` boolean, `exit_code` integer with `-1` meaning "no exit code",
//! `duration_ms` non-negative integer) must stay stable. All types implement
//! `Serialize`, `Deserialize`, and `JsonSchema` for MCP protocol compatibility.

use std::time::Duration;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use super::error::{BatchError, HostError, HostErrorKind};

/// Exit code reported when no exit status was obtained.
pub const NO_EXIT_CODE: i32 = -1;

/// Output of a command that ran to completion on one server.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Host key policy warning raised while connecting, if any
    pub host_key_warning: Option<String>,
}

impl CommandOutput {
    pub fn exited(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Self {
        Self {
            stdout: stdout.into(),
            stderr: stderr.into(),
            exit_code,
            host_key_warning: None,
        }
    }
}

/// One command to run on a set of servers.
#[derive(Debug, Clone)]
pub struct ExecutionRequest {
    /// Shell command, passed to the remote side verbatim
    pub command: String,
    /// Target servers; `None` means every configured server
    pub servers: Option<Vec<String>>,
    pub connection_timeout: Duration,
    pub command_timeout: Duration,
}

/// Result of running a command on a single server.
///
/// Exactly one is produced per requested server. `error` is set only for session
/// failures; a command that exits nonzero has `success = false` and no `error`.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct HostResult {
    pub server: String,
    pub success: bool,
    pub stdout: String,
    pub stderr: String,
    /// Remote exit code, or -1 when none was obtained
    pub exit_code: i32,
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub duration_ms: u64,
    #[serde(default)]
    pub error: Option<String>,
    /// Classification of `error`, present only alongside it
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<HostErrorKind>,
    /// Set when the host key was accepted under the warning policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_key_warning: Option<String>,
}

impl HostResult {
    pub(crate) fn from_output(server: String, output: CommandOutput, duration: Duration) -> Self {
        Self {
            server,
            success: output.exit_code == 0,
            stdout: output.stdout,
            stderr: output.stderr,
            exit_code: output.exit_code,
            duration_ms: duration_ms(duration),
            error: None,
            error_kind: None,
            host_key_warning: output.host_key_warning,
        }
    }

    pub(crate) fn from_error(server: String, error: &HostError, duration: Duration) -> Self {
        Self {
            server,
            success: false,
            stdout: String::new(),
            stderr: String::new(),
            exit_code: NO_EXIT_CODE,
            duration_ms: duration_ms(duration),
            error: Some(error.to_string()),
            error_kind: Some(error.kind()),
            host_key_warning: None,
        }
    }
}

fn duration_ms(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Aggregated counts for a batch. `succeeded + failed == total` always holds.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ExecutionSummary {
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub total: usize,
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub succeeded: usize,
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub failed: usize,
}

impl ExecutionSummary {
    pub fn from_results(results: &[HostResult]) -> Self {
        let succeeded = results.iter().filter(|r| r.success).count();
        Self {
            total: results.len(),
            succeeded,
            failed: results.len() - succeeded,
        }
    }
}

/// Response of a fleet command execution.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ExecuteResponse {
    /// Per-server results, sorted by server
    pub results: Vec<HostResult>,
    pub summary: ExecutionSummary,
    /// Batch-level configuration error; when set, `results` is empty
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ExecuteResponse {
    pub fn completed(results: Vec<HostResult>) -> Self {
        let summary = ExecutionSummary::from_results(&results);
        Self {
            results,
            summary,
            error: None,
        }
    }

    pub fn rejected(error: &BatchError) -> Self {
        Self {
            results: Vec::new(),
            summary: ExecutionSummary::default(),
            error: Some(error.to_string()),
        }
    }
}

/// Reachability of a single server.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConnectivityResult {
    pub server: String,
    pub reachable: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_key_warning: Option<String>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ConnectivitySummary {
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub total: usize,
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub reachable: usize,
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub unreachable: usize,
}

impl ConnectivitySummary {
    pub fn from_results(results: &[ConnectivityResult]) -> Self {
        let reachable = results.iter().filter(|r| r.reachable).count();
        Self {
            total: results.len(),
            reachable,
            unreachable: results.len() - reachable,
        }
    }
}

/// Response of a connectivity test.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConnectivityResponse {
    pub results: Vec<ConnectivityResult>,
    pub summary: ConnectivitySummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ConnectivityResponse {
    pub fn completed(results: Vec<ConnectivityResult>) -> Self {
        let summary = ConnectivitySummary::from_results(&results);
        Self {
            results,
            summary,
            error: None,
        }
    }

    pub fn rejected(error: &BatchError) -> Self {
        Self {
            results: Vec::new(),
            summary: ConnectivitySummary::default(),
            error: Some(error.to_string()),
        }
    }
}

/// Basic system information parsed from one server.
///
/// `error` and `exit_code` are those of the underlying [`HostResult`], so a
/// command that exited nonzero shows up as `error: null` with its exit code.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ServerInfo {
    pub server: String,
    pub hostname: Option<String>,
    pub os: Option<String>,
    pub uptime: Option<String>,
    pub error: Option<String>,
    /// Remote exit code, or -1 when none was obtained
    pub exit_code: i32,
    /// Set when the host key was accepted under the warning policy
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub host_key_warning: Option<String>,
}

/// Response of a server info collection.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ServerInfoResponse {
    pub results: Vec<ServerInfo>,
    pub summary: ExecutionSummary,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Configuration as shown to tool callers. Never contains the private key.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct ConfigView {
    pub servers: Vec<String>,
    pub username: Option<String>,
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub port: u16,
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub command_timeout_secs: u64,
    #[schemars(schema_with = "crate::mcp::schema::uint")]
    pub connection_timeout_secs: u64,
    pub known_hosts_policy: String,
    pub has_private_key: bool,
}
