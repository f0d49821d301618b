#![deny(warnings)]
#![deny(clippy::unwrap_used)]

use std::sync::Arc;

use poem::{EndpointExt, Route, Server, listener::TcpListener, middleware::Tracing};
use poem_mcpserver::{McpServer, streamable_http};
use ssh_fleet_mcp::mcp::McpFleetCommands;
use ssh_fleet_mcp::mcp::config::{SshConfig, load_env_files, resolve_mcp_port};
use tracing::info;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging with proper tracing default
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("info".parse().expect("valid directive")),
        )
        .init();

    load_env_files();
    let config = Arc::new(SshConfig::from_env());
    info!(
        "Loaded configuration: {} server(s), user {:?}, port {}, host key policy {}",
        config.servers.len(),
        config.username,
        config.port,
        config.known_hosts_policy
    );

    let mcp_addr = format!("0.0.0.0:{}", resolve_mcp_port());
    info!("Starting MCP server on {}", mcp_addr);

    // Each MCP session gets its own tool instance over the shared configuration
    let app = Route::new()
        .at(
            "/",
            streamable_http::endpoint(move |_| {
                McpServer::new().tools(McpFleetCommands::new(Arc::clone(&config)))
            }),
        )
        .with(Tracing);

    info!("Use ssh_execute_command to run a command across the configured servers");

    Server::new(TcpListener::bind(mcp_addr))
        .name("SSH Fleet MCP Server")
        .run(app)
        .await?;

    Ok(())
}
