#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;

use poem_mcpserver::McpServer;
use ssh_fleet_mcp::mcp::McpFleetCommands;
use ssh_fleet_mcp::mcp::config::{SshConfig, load_env_files};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // stdout carries the MCP protocol, so logs go to stderr
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().expect("valid directive")),
        )
        .init();

    load_env_files();
    let config = Arc::new(SshConfig::from_env());
    poem_mcpserver::stdio::stdio(McpServer::new().tools(McpFleetCommands::new(config))).await?;
    Ok(())
}
