//! Single-host SSH sessions.
//!
//! # Architecture
//!
//! - `SshClientHandler`: russh client handler that applies the configured
//!   [`HostKeyPolicy`] during the handshake and records the outcome in a shared
//!   [`HostKeyReport`].
//! - `SessionTransport`: the seam between batch orchestration and the network.
//!   [`crate::mcp::client::RusshTransport`] is the production implementation.
//! - `run_on_host` / `probe_host`: run one unit of work against one server and
//!   convert every outcome, including errors, into a result record.
//!
//! Nothing leaves this module as an error: a failing server becomes a failed
//! result and never affects its siblings.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use russh::client;
use russh::keys::{self, PrivateKey};
use tracing::debug;

use super::error::HostError;
use super::host_key::{
    HostKeyDecision, HostKeyPolicy, HostKeyReport, HostKeyVerdict, lookup_known_host,
};
use super::types::{CommandOutput, ConnectivityResult, HostResult};

/// Client handler for russh that verifies host keys against the batch policy.
pub struct SshClientHandler {
    host: String,
    port: u16,
    policy: HostKeyPolicy,
    known_hosts_file: Option<PathBuf>,
    report: Arc<HostKeyReport>,
}

impl SshClientHandler {
    pub fn new(host: &str, port: u16, ctx: &BatchContext, report: Arc<HostKeyReport>) -> Self {
        Self {
            host: host.to_string(),
            port,
            policy: ctx.policy,
            known_hosts_file: ctx.known_hosts_file.clone(),
            report,
        }
    }
}

impl client::Handler for SshClientHandler {
    type Error = russh::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        let verdict = if self.policy.needs_lookup() {
            lookup_known_host(
                &self.host,
                self.port,
                server_public_key,
                self.known_hosts_file.as_deref(),
            )
        } else {
            HostKeyVerdict::Known
        };

        let decision = self.policy.evaluate(&self.host, verdict);
        debug!(
            "Host key for {}:{} ({:?}) under {} policy: {:?}",
            self.host, self.port, verdict, self.policy, decision
        );
        self.report.record(&decision);

        Ok(!matches!(decision, HostKeyDecision::Reject(_)))
    }
}

/// Everything a session needs that is shared by every server in a batch.
#[derive(Debug, Clone)]
pub struct BatchContext {
    /// Decoded private key, loaded once per batch
    pub key: Arc<PrivateKey>,
    pub username: String,
    /// Port used for servers that do not carry their own
    pub port: u16,
    /// Bounds TCP connect, handshake and authentication
    pub connection_timeout: Duration,
    /// Bounds command execution after authentication
    pub command_timeout: Duration,
    pub policy: HostKeyPolicy,
    pub known_hosts_file: Option<PathBuf>,
}

/// Network side of a single-host session.
#[async_trait]
pub trait SessionTransport: Send + Sync + 'static {
    /// Connect, authenticate, run `command` and disconnect.
    ///
    /// A command that exits nonzero is `Ok`; only session failures are `Err`.
    async fn execute(
        &self,
        host: &str,
        command: &str,
        ctx: &BatchContext,
    ) -> Result<CommandOutput, HostError>;

    /// Connect and authenticate only, then disconnect.
    ///
    /// `Ok` carries the host key warning raised during the handshake, if any.
    async fn probe(&self, host: &str, ctx: &BatchContext) -> Result<Option<String>, HostError>;
}

/// Run `command` on one server and produce its result record.
pub async fn run_on_host<T>(
    transport: &T,
    host: &str,
    command: &str,
    ctx: &BatchContext,
) -> HostResult
where
    T: SessionTransport + ?Sized,
{
    let started = Instant::now();
    let outcome = transport.execute(host, command, ctx).await;
    let elapsed = started.elapsed();

    match outcome {
        Ok(output) => {
            debug!(
                "{} exited with {} in {:?}",
                host, output.exit_code, elapsed
            );
            HostResult::from_output(host.to_string(), output, elapsed)
        }
        Err(e) => {
            debug!("{} failed after {:?}: {}", host, elapsed, e);
            HostResult::from_error(host.to_string(), &e, elapsed)
        }
    }
}

/// Check that one server accepts a connection and the batch credentials.
pub async fn probe_host<T>(transport: &T, host: &str, ctx: &BatchContext) -> ConnectivityResult
where
    T: SessionTransport + ?Sized,
{
    match transport.probe(host, ctx).await {
        Ok(host_key_warning) => ConnectivityResult {
            server: host.to_string(),
            reachable: true,
            error: None,
            host_key_warning,
        },
        Err(e) => {
            debug!("{} unreachable: {}", host, e);
            ConnectivityResult {
                server: host.to_string(),
                reachable: false,
                error: Some(e.to_string()),
                host_key_warning: None,
            }
        }
    }
}

/// Split a server entry into host and port.
///
/// Accepts `host`, `host:port`, `[v6addr]` and `[v6addr]:port`. A bare IPv6
/// address (more than one colon, no brackets) uses `default_port`.
pub(crate) fn split_target(target: &str, default_port: u16) -> Result<(String, u16), HostError> {
    let parse_port = |port: &str| {
        port.parse::<u16>()
            .map_err(|e| HostError::Connect(format!("Invalid port number in '{}': {}", target, e)))
    };

    if let Some(rest) = target.strip_prefix('[') {
        return match rest.split_once(']') {
            Some((addr, "")) => Ok((addr.to_string(), default_port)),
            Some((addr, tail)) => match tail.strip_prefix(':') {
                Some(port) => Ok((addr.to_string(), parse_port(port)?)),
                None => Err(HostError::Connect(format!(
                    "Invalid server address '{}'",
                    target
                ))),
            },
            None => Err(HostError::Connect(format!(
                "Invalid server address '{}'",
                target
            ))),
        };
    }

    match target.split_once(':') {
        Some((host, port)) if !port.contains(':') => Ok((host.to_string(), parse_port(port)?)),
        _ => Ok((target.to_string(), default_port)),
    }
}
