//! MCP SSH fleet module providing parallel command execution tools.
//!
//! This module is organized into the following submodules:
//!
//! - `types`: Serializable result types for MCP tools
//! - `config`: Configuration resolution from environment variables
//! - `error`: Batch-level and host-level error types
//! - `key_guard`: Owner-only temporary key file, scrubbed on drop
//! - `host_key`: Host key verification policy
//! - `auth`: Public key authentication
//! - `session`: Single-host sessions and the transport seam
//! - `client`: russh-backed transport
//! - `executor`: Bounded parallel fan-out across servers
//! - `probe`: Connectivity checks
//! - `server_info`: Hostname, OS and uptime collection
//! - `commands`: MCP tool implementations

pub mod auth;
pub mod client;
pub mod commands;
pub mod config;
pub mod error;
pub mod executor;
pub mod host_key;
pub mod key_guard;
pub mod probe;
pub(crate) mod schema;
pub mod server_info;
pub mod session;
pub mod types;

#[cfg(test)]
pub(crate) mod testing;

pub use commands::McpFleetCommands;
