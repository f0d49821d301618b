//! Basic system information from every configured server.
//!
//! Runs one fixed shell command through [`ParallelExecutor`] and parses the
//! `KEY=value` lines it prints.

use super::executor::ParallelExecutor;
use super::session::SessionTransport;
use super::types::{HostResult, ServerInfo, ServerInfoResponse};

/// Prints `HOSTNAME=`, `OS=` and `UPTIME=` lines on common Unix systems.
pub const SERVER_INFO_COMMAND: &str = concat!(
    "echo \"HOSTNAME=$(hostname)\" && ",
    "echo \"OS=$(cat /etc/os-release 2>/dev/null | grep PRETTY_NAME | cut -d'\"' -f2 || uname -s)\" && ",
    "echo \"UPTIME=$(uptime -p 2>/dev/null || uptime | awk -F'up ' '{print $2}' | awk -F',' '{print $1}')\"",
);

/// Turn one execution result into a server info record.
///
/// Never fails: unknown lines are ignored and missing lines leave their field
/// unset. A failed result yields no fields; its `error`, exit code and host key
/// warning are carried over unchanged.
pub fn parse_server_info(result: &HostResult) -> ServerInfo {
    let mut info = ServerInfo {
        server: result.server.clone(),
        error: result.error.clone(),
        exit_code: result.exit_code,
        host_key_warning: result.host_key_warning.clone(),
        ..Default::default()
    };

    if !result.success {
        return info;
    }

    for line in result.stdout.lines() {
        let Some((key, value)) = line.split_once('=') else {
            continue;
        };
        let value = Some(value.trim().to_string());
        match key.trim() {
            "HOSTNAME" => info.hostname = value,
            "OS" => info.os = value,
            "UPTIME" => info.uptime = value,
            _ => {}
        }
    }

    info
}

/// Collects hostname, OS and uptime from the configured servers.
pub struct ServerInfoCollector<T: SessionTransport> {
    executor: ParallelExecutor<T>,
}

impl<T: SessionTransport> ServerInfoCollector<T> {
    pub fn new(executor: ParallelExecutor<T>) -> Self {
        Self { executor }
    }

    pub async fn collect(&self) -> ServerInfoResponse {
        let request = self.executor.request(SERVER_INFO_COMMAND, None);
        let response = self.executor.execute(&request).await;

        ServerInfoResponse {
            results: response.results.iter().map(parse_server_info).collect(),
            summary: response.summary,
            error: response.error,
        }
    }
}
