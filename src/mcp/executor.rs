//! Parallel command execution across a server fleet.
//!
//! A batch runs one command on a set of servers:
//!
//! 1. Validate the target set and credentials. Any problem rejects the whole
//!    batch before a key file exists or a connection is attempted.
//! 2. Materialize the private key once into a [`KeyMaterialGuard`] and decode it.
//! 3. Spawn one task per server, admitted through a semaphore with
//!    `min(servers, MAX_PARALLEL_SESSIONS)` permits.
//! 4. Wait for every task, sort results by server and summarize.
//!
//! The key file is scrubbed and removed when the batch ends, however it ends.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::Semaphore;
use tracing::{Instrument, info, info_span};
use uuid::Uuid;

use super::config::SshConfig;
use super::error::{BatchError, HostError};
use super::key_guard::KeyMaterialGuard;
use super::session::{BatchContext, SessionTransport, run_on_host};
use super::types::{ExecuteResponse, ExecutionRequest, ExecutionSummary, HostResult};

/// Upper bound on sessions in flight within one batch
pub const MAX_PARALLEL_SESSIONS: usize = 10;

/// Resources held for the lifetime of one batch.
pub(crate) struct PreparedBatch {
    pub(crate) id: Uuid,
    pub(crate) ctx: Arc<BatchContext>,
    // Dropped last, after every session has finished
    _key_file: KeyMaterialGuard,
}

/// Resolve which servers a batch targets.
///
/// `None` targets every configured server. An explicit list must be non-empty
/// and contain only configured servers; duplicates are kept.
pub(crate) fn resolve_targets(
    configured: &[String],
    requested: Option<&[String]>,
) -> Result<Vec<String>, BatchError> {
    match requested {
        None if configured.is_empty() => Err(BatchError::Configuration(
            "No servers configured".to_string(),
        )),
        None => Ok(configured.to_vec()),
        Some([]) => Err(BatchError::Configuration(
            "No servers specified".to_string(),
        )),
        Some(hosts) => {
            let invalid: Vec<&str> = hosts
                .iter()
                .filter(|h| !configured.contains(h))
                .map(String::as_str)
                .collect();
            if invalid.is_empty() {
                Ok(hosts.to_vec())
            } else {
                Err(BatchError::Configuration(format!(
                    "Invalid servers (not configured): {}",
                    invalid.join(", ")
                )))
            }
        }
    }
}

/// Check credentials, write the key file and decode the key.
pub(crate) fn prepare_batch(
    config: &SshConfig,
    connection_timeout: Duration,
    command_timeout: Duration,
) -> Result<PreparedBatch, BatchError> {
    let credentials = config.credentials()?;

    let key_file = match &config.key_dir {
        Some(dir) => KeyMaterialGuard::acquire_in(dir, credentials.key.expose())?,
        None => KeyMaterialGuard::acquire(credentials.key.expose())?,
    };
    let key = key_file.load_key()?;

    Ok(PreparedBatch {
        id: Uuid::new_v4(),
        ctx: Arc::new(BatchContext {
            key,
            username: credentials.username,
            port: credentials.port,
            connection_timeout,
            command_timeout,
            policy: config.known_hosts_policy,
            known_hosts_file: config.known_hosts_file.clone(),
        }),
        _key_file: key_file,
    })
}

/// Run `work` once per host on the runtime, at most [`MAX_PARALLEL_SESSIONS`] at a time.
///
/// Results come back in `hosts` order. A task that panics is reported through
/// `on_failure` for its host and does not affect the others.
pub(crate) async fn fan_out<T, R, W, Fut, E>(
    transport: &Arc<T>,
    ctx: &Arc<BatchContext>,
    hosts: Vec<String>,
    work: W,
    on_failure: E,
) -> Vec<R>
where
    T: SessionTransport,
    R: Send + 'static,
    W: Fn(Arc<T>, String, Arc<BatchContext>) -> Fut,
    Fut: Future<Output = R> + Send + 'static,
    E: Fn(String, HostError) -> R,
{
    let permits = hosts.len().clamp(1, MAX_PARALLEL_SESSIONS);
    let semaphore = Arc::new(Semaphore::new(permits));

    let tasks: Vec<_> = hosts
        .iter()
        .map(|host| {
            let semaphore = Arc::clone(&semaphore);
            let unit = work(Arc::clone(transport), host.clone(), Arc::clone(ctx));
            tokio::spawn(
                async move {
                    // The semaphore is never closed, so acquisition only waits
                    let _permit = semaphore.acquire_owned().await.ok();
                    unit.await
                }
                .in_current_span(),
            )
        })
        .collect();

    let joined = join_all(tasks).await;

    hosts
        .into_iter()
        .zip(joined)
        .map(|(host, outcome)| match outcome {
            Ok(result) => result,
            Err(e) => on_failure(host, HostError::TaskPanicked(e.to_string())),
        })
        .collect()
}

/// Runs one command across many servers in parallel.
pub struct ParallelExecutor<T: SessionTransport> {
    transport: Arc<T>,
    config: Arc<SshConfig>,
}

impl<T: SessionTransport> ParallelExecutor<T> {
    pub fn new(transport: Arc<T>, config: Arc<SshConfig>) -> Self {
        Self { transport, config }
    }

    /// Build a request with this executor's configured timeouts.
    pub fn request(
        &self,
        command: impl Into<String>,
        servers: Option<Vec<String>>,
    ) -> ExecutionRequest {
        self.config.request(command, servers)
    }

    /// Execute a request and report one result per target server.
    ///
    /// Configuration problems produce an empty result set with `error` set.
    pub async fn execute(&self, request: &ExecutionRequest) -> ExecuteResponse {
        match self.try_execute(request).await {
            Ok(results) => ExecuteResponse::completed(results),
            Err(e) => {
                info!("Batch rejected: {}", e);
                ExecuteResponse::rejected(&e)
            }
        }
    }

    async fn try_execute(&self, request: &ExecutionRequest) -> Result<Vec<HostResult>, BatchError> {
        let hosts = resolve_targets(&self.config.servers, request.servers.as_deref())?;
        let batch = prepare_batch(
            &self.config,
            request.connection_timeout,
            request.command_timeout,
        )?;

        let span = info_span!("batch", batch_id = %batch.id, servers = hosts.len());
        let command: Arc<str> = Arc::from(request.command.as_str());

        let mut results = async {
            info!("Executing command on {} server(s)", hosts.len());
            fan_out(
                &self.transport,
                &batch.ctx,
                hosts,
                |transport, host, ctx| {
                    let command = Arc::clone(&command);
                    async move { run_on_host(transport.as_ref(), &host, &command, &ctx).await }
                },
                |host, err| HostResult::from_error(host, &err, Duration::ZERO),
            )
            .await
        }
        .instrument(span.clone())
        .await;

        results.sort_by(|a, b| a.server.cmp(&b.server));

        let summary = ExecutionSummary::from_results(&results);
        span.in_scope(|| {
            info!(
                "Batch finished: {} succeeded, {} failed",
                summary.succeeded, summary.failed
            );
        });

        drop(batch);
        Ok(results)
    }
}
