//! MCP fleet commands implementation.
//!
//! This module provides the MCP tools for running commands across the
//! configured servers:
//!
//! - `ssh_execute_command`: Run a shell command on all or some configured servers
//! - `ssh_test_connectivity`: Check that every server accepts the configured key
//! - `ssh_get_server_info`: Collect hostname, OS and uptime from every server
//! - `ssh_get_config`: Show the active configuration without the private key
//!
//! Every tool answers with a structured result, including configuration problems,
//! which are reported in the response's `error` field.

use std::sync::Arc;

use poem_mcpserver::{Tools, tool::StructuredContent};
use tracing::{info, warn};

use super::client::RusshTransport;
use super::config::SshConfig;
use super::executor::ParallelExecutor;
use super::probe::ConnectivityProbe;
use super::server_info::ServerInfoCollector;
use super::types::{ConfigView, ConnectivityResponse, ExecuteResponse, ServerInfoResponse};

/// MCP fleet commands tool implementation.
///
/// Holds the configuration resolved at startup; each call runs an independent
/// batch with no state carried over.
pub struct McpFleetCommands {
    config: Arc<SshConfig>,
    transport: Arc<RusshTransport>,
}

impl McpFleetCommands {
    pub fn new(config: Arc<SshConfig>) -> Self {
        Self {
            config,
            transport: Arc::new(RusshTransport),
        }
    }

    fn executor(&self) -> ParallelExecutor<RusshTransport> {
        ParallelExecutor::new(Arc::clone(&self.transport), Arc::clone(&self.config))
    }
}

/// Log host key warnings raised under the `warn` policy.
fn log_host_key_warnings<'a>(warnings: impl Iterator<Item = (&'a str, Option<&'a str>)>) {
    for (server, warning) in warnings {
        if let Some(warning) = warning {
            warn!("Host key warning for {}: {}", server, warning);
        }
    }
}

#[Tools]
impl McpFleetCommands {
    /// Execute a shell command on the configured SSH servers in parallel.
    ///
    /// Runs on every configured server unless `servers` names a subset. Returns one
    /// result per server, sorted by server, with stdout, stderr, exit code and
    /// duration, plus a summary. A nonzero exit code is reported with
    /// `success=false` and no `error`; connection and authentication failures set
    /// `error`.
    async fn ssh_execute_command(
        &self,
        /// Shell command to run on each server (passed to the remote shell verbatim)
        command: String,
        /// Optional subset of configured servers to target (default: all configured servers)
        servers: Option<Vec<String>>,
    ) -> StructuredContent<ExecuteResponse> {
        let executor = self.executor();
        let request = executor.request(command, servers);
        info!(
            "ssh_execute_command on {} server(s)",
            request
                .servers
                .as_ref()
                .map_or(self.config.servers.len(), Vec::len)
        );

        let response = executor.execute(&request).await;
        log_host_key_warnings(
            response
                .results
                .iter()
                .map(|r| (r.server.as_str(), r.host_key_warning.as_deref())),
        );
        StructuredContent(response)
    }

    /// Test SSH connectivity and authentication to every configured server.
    ///
    /// Connects and authenticates without running a command, then reports which
    /// servers are reachable.
    async fn ssh_test_connectivity(&self) -> StructuredContent<ConnectivityResponse> {
        let probe = ConnectivityProbe::new(Arc::clone(&self.transport), Arc::clone(&self.config));
        let response = probe.test_connectivity().await;
        log_host_key_warnings(
            response
                .results
                .iter()
                .map(|r| (r.server.as_str(), r.host_key_warning.as_deref())),
        );
        StructuredContent(response)
    }

    /// Get hostname, operating system and uptime from every configured server.
    async fn ssh_get_server_info(&self) -> StructuredContent<ServerInfoResponse> {
        let collector = ServerInfoCollector::new(self.executor());
        let response = collector.collect().await;
        log_host_key_warnings(
            response
                .results
                .iter()
                .map(|r| (r.server.as_str(), r.host_key_warning.as_deref())),
        );
        StructuredContent(response)
    }

    /// Show the active SSH configuration.
    ///
    /// Lists servers, username, port, timeouts and host key policy. The private key
    /// is never returned; `has_private_key` tells whether one is configured.
    async fn ssh_get_config(&self) -> StructuredContent<ConfigView> {
        StructuredContent(self.config.view())
    }
}
