//! Command-line interface for the gateway
//!
//! Thin layer: parse flags, assemble the gateway, run the selected
//! transport until ctrl-c.

use crate::catalog::Catalog;
use crate::client::{ClientPool, RmcpSessionFactory};
use crate::config::Configuration;
use crate::gateway::Gateway;
use crate::oauth::credentials::MemoryCredentialStore;
use crate::secrets::{EnvSecretsProvider, SecretsProvider};
use crate::transport::{self, EdgeSecurity, TransportMode};
use crate::Result;
use clap::{Arg, ArgAction, ArgMatches, Command};
use std::sync::Arc;
use tokio::sync::mpsc;

/// Parse a comma-separated list from CLI arguments
fn parse_comma_list(matches: &ArgMatches, key: &str) -> Vec<String> {
    matches
        .get_one::<String>(key)
        .map(|s| {
            s.split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

fn build_cli() -> Command {
    Command::new("mcp-gateway")
        .about("MCP Gateway - aggregates many MCP servers behind a single endpoint")
        .version(env!("CARGO_PKG_VERSION"))
        .arg(
            Arg::new("transport")
                .long("transport")
                .value_name("MODE")
                .help("Transport to serve: stdio, sse or streaming")
                .default_value("stdio"),
        )
        .arg(
            Arg::new("port")
                .long("port")
                .value_name("PORT")
                .help("TCP port for the HTTP transports")
                .value_parser(clap::value_parser!(u16))
                .default_value("8080"),
        )
        .arg(
            Arg::new("catalog")
                .long("catalog")
                .value_name("FILE")
                .help("Path to the server catalog (JSON array)"),
        )
        .arg(
            Arg::new("servers")
                .long("servers")
                .value_name("NAMES")
                .help("Comma-separated catalog servers to activate at boot"),
        )
        .arg(
            Arg::new("tools")
                .long("tools")
                .value_name("FILTERS")
                .help("Global enabled-tools filter (e.g. 'github:*,fetch')"),
        )
        .arg(
            Arg::new("dynamic-tools")
                .long("dynamic-tools")
                .help("Expose the mcp-find/mcp-add/... meta-tools")
                .action(ArgAction::SetTrue),
        )
}

/// Main CLI entry point
pub async fn run() -> Result<()> {
    let matches = build_cli().get_matches();

    let mode: TransportMode = matches
        .get_one::<String>("transport")
        .map(String::as_str)
        .unwrap_or("stdio")
        .parse()?;
    let port = *matches.get_one::<u16>("port").unwrap_or(&8080);
    let server_names = parse_comma_list(&matches, "servers");
    let global_tools = parse_comma_list(&matches, "tools");
    let dynamic_tools = matches.get_flag("dynamic-tools");

    let secrets: Arc<dyn SecretsProvider> = Arc::new(EnvSecretsProvider::new());
    let security = Arc::new(EdgeSecurity::load(&secrets).await?);

    let catalog = match matches.get_one::<String>("catalog") {
        Some(path) => Catalog::load_from_file(path)?,
        None => Catalog::new(),
    };

    let configuration =
        Configuration::build(catalog, server_names, global_tools, &secrets).await?;

    let credentials = Arc::new(MemoryCredentialStore::new());
    let (notices_tx, notices_rx) = mpsc::unbounded_channel();
    let factory = Arc::new(RmcpSessionFactory::new(notices_tx, credentials.clone()));
    let pool = ClientPool::new(factory);

    let gateway = Gateway::new(
        configuration,
        pool,
        secrets,
        credentials,
        None,
        dynamic_tools,
    );

    if security.generated && mode != TransportMode::Stdio {
        tracing::info!("generated bearer token: {}", security.bearer_token);
    }

    let event_loop = gateway.spawn_event_loop(notices_rx);

    gateway.reload().await?;
    gateway.start_oauth_providers().await;

    // ctrl-c cancels everything cooperatively.
    {
        let gateway = gateway.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("shutting down");
                gateway.shutdown();
            }
        });
    }

    let served = transport::serve(gateway.clone(), mode, port, security).await;

    gateway.shutdown();
    let _ = event_loop.await;

    served
}
