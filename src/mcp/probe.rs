//! Connectivity checks across the configured fleet.
//!
//! A probe connects and authenticates to every configured server without running
//! a command. It shares batch preparation and admission control with
//! [`crate::mcp::executor::ParallelExecutor`].

use std::sync::Arc;

use tracing::{Instrument, info, info_span};

use super::config::SshConfig;
use super::error::BatchError;
use super::executor::{fan_out, prepare_batch, resolve_targets};
use super::session::{SessionTransport, probe_host};
use super::types::{ConnectivityResponse, ConnectivityResult};

/// Tests reachability and authentication for every configured server.
pub struct ConnectivityProbe<T: SessionTransport> {
    transport: Arc<T>,
    config: Arc<SshConfig>,
}

impl<T: SessionTransport> ConnectivityProbe<T> {
    pub fn new(transport: Arc<T>, config: Arc<SshConfig>) -> Self {
        Self { transport, config }
    }

    pub async fn test_connectivity(&self) -> ConnectivityResponse {
        match self.try_probe().await {
            Ok(results) => ConnectivityResponse::completed(results),
            Err(e) => {
                info!("Connectivity test rejected: {}", e);
                ConnectivityResponse::rejected(&e)
            }
        }
    }

    async fn try_probe(&self) -> Result<Vec<ConnectivityResult>, BatchError> {
        let hosts = resolve_targets(&self.config.servers, None)?;
        let batch = prepare_batch(
            &self.config,
            self.config.connection_timeout,
            self.config.command_timeout,
        )?;

        let span = info_span!("probe", batch_id = %batch.id, servers = hosts.len());
        let mut results = async {
            info!("Testing connectivity to {} server(s)", hosts.len());
            fan_out(
                &self.transport,
                &batch.ctx,
                hosts,
                |transport, host, ctx| async move {
                    probe_host(transport.as_ref(), &host, &ctx).await
                },
                |host, err| ConnectivityResult {
                    server: host,
                    reachable: false,
                    error: Some(err.to_string()),
                    host_key_warning: None,
                },
            )
            .await
        }
        .instrument(span)
        .await;

        results.sort_by(|a, b| a.server.cmp(&b.server));
        drop(batch);
        Ok(results)
    }
}
