//! SSH client connection and command execution.
//!
//! ## Session Lifecycle
//!
//! 1. **Address Parsing**: Split the server entry into host and port, falling
//!    back to the configured port.
//!
//! 2. **Client Configuration**: Build the russh client configuration with
//!    inactivity timeout and keepalive settings.
//!
//! 3. **Connection Establishment**: TCP connect and SSH handshake, bounded by the
//!    connection timeout. The host key policy runs inside the handshake.
//!
//! 4. **Authentication**: Public key authentication with the batch key, also
//!    bounded by the connection timeout.
//!
//! 5. **Command Execution**: Open a session channel, run the command and drain
//!    stdout and stderr until the channel closes, bounded by the command timeout.
//!
//! 6. **Disconnect**: Always sent once a session was established.
//!
//! No step is retried.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use russh::{ChannelMsg, Disconnect, client};
use tracing::debug;

use crate::mcp::auth::{AuthStrategy, KeyAuth};
use crate::mcp::error::HostError;
use crate::mcp::host_key::HostKeyReport;
use crate::mcp::session::{BatchContext, SessionTransport, SshClientHandler, split_target};
use crate::mcp::types::{CommandOutput, NO_EXIT_CODE};

/// Keepalive interval for established sessions
const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// Unanswered keepalives before the session is dropped
const KEEPALIVE_MAX: usize = 3;

/// Build russh client configuration with the specified settings.
///
/// Creates an `Arc<client::Config>` with:
/// - Inactivity timeout set to the provided `inactivity_timeout`
/// - Keepalive interval of 30 seconds with max 3 keepalives
///
/// # Arguments
///
/// * `inactivity_timeout` - Time without traffic after which russh drops the session
pub(crate) fn build_client_config(inactivity_timeout: Duration) -> Arc<client::Config> {
    Arc::new(client::Config {
        inactivity_timeout: Some(inactivity_timeout),
        keepalive_interval: Some(KEEPALIVE_INTERVAL),
        keepalive_max: KEEPALIVE_MAX,
        ..Default::default()
    })
}

/// Production transport backed by russh.
///
/// Every call opens a fresh connection; nothing is pooled between batches.
#[derive(Debug, Default, Clone, Copy)]
pub struct RusshTransport;

/// An authenticated session and what the handshake reported about the host key.
struct EstablishedSession {
    handle: client::Handle<SshClientHandler>,
    report: Arc<HostKeyReport>,
}

impl EstablishedSession {
    fn host_key_warning(&self) -> Option<String> {
        self.report.warning().map(String::from)
    }

    async fn disconnect(self, host: &str) {
        if let Err(e) = self
            .handle
            .disconnect(Disconnect::ByApplication, "", "en")
            .await
        {
            debug!("Disconnect from {} failed: {}", host, e);
        }
    }
}

/// Establish an SSH connection and authenticate.
///
/// Connect and authentication each run under `ctx.connection_timeout`.
async fn connect_to_ssh(host: &str, ctx: &BatchContext) -> Result<EstablishedSession, HostError> {
    let (address, port) = split_target(host, ctx.port)?;
    let config = build_client_config(ctx.connection_timeout + ctx.command_timeout);
    let report = Arc::new(HostKeyReport::default());
    let handler = SshClientHandler::new(&address, port, ctx, report.clone());

    debug!("Connecting to {}:{}", address, port);
    let connect_future = client::connect(config, (address.as_str(), port), handler);

    let mut handle = match tokio::time::timeout(ctx.connection_timeout, connect_future).await {
        Err(_) => return Err(HostError::ConnectTimeout(ctx.connection_timeout)),
        Ok(Err(e)) => {
            return Err(match report.rejection() {
                Some(reason) => HostError::HostKeyRejected(reason.to_string()),
                None => HostError::Connect(e.to_string()),
            });
        }
        Ok(Ok(handle)) => handle,
    };

    let auth = KeyAuth::new(ctx.key.clone());
    let authenticated = tokio::time::timeout(
        ctx.connection_timeout,
        auth.authenticate(&mut handle, &ctx.username),
    )
    .await;

    let session = EstablishedSession { handle, report };
    match authenticated {
        Ok(Ok(true)) => {
            debug!("Authenticated to {} as {} ({})", host, ctx.username, auth.name());
            Ok(session)
        }
        Ok(Ok(false)) => {
            session.disconnect(host).await;
            Err(HostError::Authentication(format!(
                "server rejected {} authentication for user {}",
                auth.name(),
                ctx.username
            )))
        }
        Ok(Err(e)) => {
            session.disconnect(host).await;
            Err(HostError::Authentication(e))
        }
        Err(_) => {
            session.disconnect(host).await;
            Err(HostError::ConnectTimeout(ctx.connection_timeout))
        }
    }
}

/// Execute a command on an authenticated session.
///
/// Opens a session channel, executes the command and reads until the server closes
/// the channel, so output that arrives after the exit status is not lost. Opening
/// the channel, starting the command and draining it all share `timeout`.
///
/// # Returns
///
/// * `Ok(CommandOutput)` - Exit code with stdout and stderr
/// * `Err(HostError)` - Channel failure, timeout, or no exit status received
pub(crate) async fn execute_ssh_command(
    handle: &client::Handle<SshClientHandler>,
    command: &str,
    timeout: Duration,
) -> Result<CommandOutput, HostError> {
    let run = async {
        let mut channel = handle
            .channel_open_session()
            .await
            .map_err(|e| HostError::Channel(format!("Failed to open channel: {}", e)))?;

        channel
            .exec(true, command)
            .await
            .map_err(|e| HostError::Channel(format!("Failed to execute command: {}", e)))?;

        let mut drained = DrainedChannel::default();
        loop {
            match channel.wait().await {
                Some(ChannelMsg::Data { data }) => {
                    drained.stdout.extend_from_slice(&data);
                }
                Some(ChannelMsg::ExtendedData { data, ext }) => {
                    // ext == 1 is stderr in SSH protocol
                    if ext == 1 {
                        drained.stderr.extend_from_slice(&data);
                    }
                }
                Some(ChannelMsg::ExitStatus { exit_status }) => {
                    drained.exit_code = Some(exit_status);
                }
                Some(ChannelMsg::ExitSignal {
                    signal_name,
                    error_message,
                    ..
                }) => {
                    drained.exit_signal = Some(if error_message.is_empty() {
                        format!("{:?}", signal_name)
                    } else {
                        format!("{:?} ({})", signal_name, error_message)
                    });
                }
                Some(ChannelMsg::Close) | None => break,
                Some(_) => {}
            }
        }
        Ok::<_, HostError>(drained)
    };

    let drained = match tokio::time::timeout(timeout, run).await {
        Err(_) => return Err(HostError::CommandTimeout(timeout)),
        Ok(result) => result?,
    };

    let exit_code = match (drained.exit_code, drained.exit_signal) {
        (Some(code), _) => i32::try_from(code).unwrap_or(NO_EXIT_CODE),
        (None, Some(signal)) => {
            return Err(HostError::NoExitStatus(format!(
                "process terminated by signal {}",
                signal
            )));
        }
        (None, None) => {
            return Err(HostError::NoExitStatus(
                "channel closed without an exit status".to_string(),
            ));
        }
    };

    Ok(CommandOutput::exited(
        exit_code,
        String::from_utf8_lossy(&drained.stdout),
        String::from_utf8_lossy(&drained.stderr),
    ))
}

/// Everything read from a session channel before it closed.
#[derive(Default)]
struct DrainedChannel {
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_code: Option<u32>,
    exit_signal: Option<String>,
}

#[async_trait]
impl SessionTransport for RusshTransport {
    async fn execute(
        &self,
        host: &str,
        command: &str,
        ctx: &BatchContext,
    ) -> Result<CommandOutput, HostError> {
        let session = connect_to_ssh(host, ctx).await?;
        let outcome = execute_ssh_command(&session.handle, command, ctx.command_timeout).await;
        let host_key_warning = session.host_key_warning();
        session.disconnect(host).await;

        let mut output = outcome?;
        output.host_key_warning = host_key_warning;
        Ok(output)
    }

    async fn probe(&self, host: &str, ctx: &BatchContext) -> Result<Option<String>, HostError> {
        let session = connect_to_ssh(host, ctx).await?;
        let host_key_warning = session.host_key_warning();
        session.disconnect(host).await;
        Ok(host_key_warning)
    }
}
