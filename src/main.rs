//! MCP Gateway binary
//!
//! Run with: cargo run --bin mcp-gateway -- --transport streaming --port 8080

#[tokio::main]
async fn main() {
    // Logging goes to stderr so the stdio transport keeps stdout clean.
    mcp_gateway::init_logging();

    if let Err(e) = mcp_gateway::cli::run().await {
        eprintln!("Error: {}", e);
        std::process::exit(1);
    }
}
