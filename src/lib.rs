//! MCP Gateway
//!
//! A long-running process that aggregates many upstream MCP servers
//! behind a single MCP endpoint:
//! - Federates tools, prompts, resources and resource templates from a
//!   configured fleet of upstreams into one aggregate server
//! - Pools one ref-counted session per upstream (containers over stdio,
//!   remotes over streamable HTTP)
//! - Reconciles the aggregate live on upstream listChanged notifications
//! - Supervises OAuth token refresh for remote upstreams
//! - Guards the HTTP edge with origin validation and constant-time
//!   bearer authentication

// Core modules
pub mod capabilities;
pub mod catalog;
pub mod config;
pub mod error;

// Federation
pub mod client;
pub mod dynamic;
pub mod gateway;

// Infrastructure
pub mod health;
pub mod oauth;
pub mod secrets;
pub mod telemetry;

// Interface layers
pub mod cli;
pub mod transport;

#[cfg(test)]
pub(crate) mod test_support;

// Re-exports for convenience
pub use error::{GatewayError, Result};
pub use gateway::Gateway;

/// Initialize logging for the application
pub fn init_logging() {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "mcp_gateway=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
