//! Transport edge
//!
//! Serves the aggregate MCP server over stdio, SSE (`/sse`) or
//! streamable HTTP (`/mcp`). HTTP transports add `/health`, `/metrics`,
//! a root redirect to the MCP endpoint, and the two security
//! middlewares (origin check outside, bearer auth inside).

pub mod auth;
pub mod origin;

pub use auth::EdgeSecurity;

use crate::gateway::{Gateway, McpGatewayServer};
use crate::telemetry;
use crate::{GatewayError, Result};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Redirect, Response};
use axum::routing::get;
use axum::Router;
use rmcp::service::serve_server;
use rmcp::transport::sse_server::{SseServer, SseServerConfig};
use rmcp::transport::stdio;
use rmcp::transport::streamable_http_server::{
    session::local::LocalSessionManager, StreamableHttpServerConfig, StreamableHttpService,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

const SSE_KEEP_ALIVE: Duration = Duration::from_secs(15);

/// Transport selected at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportMode {
    Stdio,
    Sse,
    Streaming,
}

impl std::str::FromStr for TransportMode {
    type Err = GatewayError;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "stdio" => Ok(TransportMode::Stdio),
            "sse" => Ok(TransportMode::Sse),
            "streaming" => Ok(TransportMode::Streaming),
            other => Err(GatewayError::config(format!(
                "unknown transport '{}' (expected stdio, sse or streaming)",
                other
            ))),
        }
    }
}

async fn health_handler(State(gateway): State<Arc<Gateway>>) -> Response {
    if gateway.health().ready() {
        (StatusCode::OK, "OK").into_response()
    } else {
        (StatusCode::SERVICE_UNAVAILABLE, "unavailable").into_response()
    }
}

async fn metrics_handler() -> Response {
    match telemetry::get_metrics() {
        Ok(body) => (StatusCode::OK, body).into_response(),
        Err(e) => {
            tracing::error!("failed to gather metrics: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "metrics unavailable").into_response()
        }
    }
}

/// `/health`, `/metrics` and the root redirect onto the MCP endpoint.
fn base_router(gateway: Arc<Gateway>, mcp_path: &'static str) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/", get(move || async move { Redirect::temporary(mcp_path) }))
        .with_state(gateway)
}

fn apply_security(router: Router, security: Arc<EdgeSecurity>) -> Router {
    // Layer order: the last layer added runs first, so bearer auth goes
    // on before the origin check to keep the origin check outermost.
    router
        .layer(axum::middleware::from_fn_with_state(
            security.clone(),
            auth::bearer_auth,
        ))
        .layer(axum::middleware::from_fn_with_state(
            security,
            origin::origin_check,
        ))
        .layer(tower_http::trace::TraceLayer::new_for_http())
}

/// Serve the gateway over the selected transport until shutdown.
pub async fn serve(
    gateway: Arc<Gateway>,
    mode: TransportMode,
    port: u16,
    security: Arc<EdgeSecurity>,
) -> Result<()> {
    match mode {
        TransportMode::Stdio => serve_stdio(gateway).await,
        TransportMode::Sse => serve_sse(gateway, port, security).await,
        TransportMode::Streaming => serve_streaming(gateway, port, security).await,
    }
}

async fn serve_stdio(gateway: Arc<Gateway>) -> Result<()> {
    tracing::info!("serving MCP over stdio");

    let shutdown = gateway.shutdown_token();
    let handler = McpGatewayServer::new(gateway);
    let running = serve_server(handler, stdio())
        .await
        .map_err(|e| GatewayError::mcp(format!("stdio serve failed: {}", e)))?;

    tokio::select! {
        result = running.waiting() => {
            result.map_err(|e| GatewayError::mcp(format!("stdio session error: {}", e)))?;
        }
        _ = shutdown.cancelled() => {}
    }

    Ok(())
}

async fn serve_sse(gateway: Arc<Gateway>, port: u16, security: Arc<EdgeSecurity>) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let shutdown = gateway.shutdown_token();

    let config = SseServerConfig {
        bind: addr,
        sse_path: "/sse".to_string(),
        post_path: "/message".to_string(),
        ct: shutdown.child_token(),
        sse_keep_alive: Some(SSE_KEEP_ALIVE),
    };
    let (sse_server, sse_router) = SseServer::new(config);

    let service_ct = sse_server.with_service({
        let gateway = gateway.clone();
        move || McpGatewayServer::new(gateway.clone())
    });

    let app = apply_security(
        sse_router.merge(base_router(gateway, "/sse")),
        security,
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::config(format!("failed to bind {}: {}", addr, e)))?;

    tracing::info!("MCP gateway (SSE) listening on http://{}/sse", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| GatewayError::internal(format!("server error: {}", e)))?;

    service_ct.cancel();
    Ok(())
}

async fn serve_streaming(
    gateway: Arc<Gateway>,
    port: u16,
    security: Arc<EdgeSecurity>,
) -> Result<()> {
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let shutdown = gateway.shutdown_token();

    let service = StreamableHttpService::new(
        {
            let gateway = gateway.clone();
            move || Ok(McpGatewayServer::new(gateway.clone()))
        },
        LocalSessionManager::default().into(),
        StreamableHttpServerConfig {
            sse_keep_alive: Some(SSE_KEEP_ALIVE),
            stateful_mode: true,
        },
    );

    let app = apply_security(
        Router::new()
            .nest_service("/mcp", service)
            .merge(base_router(gateway, "/mcp")),
        security,
    );

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| GatewayError::config(format!("failed to bind {}: {}", addr, e)))?;

    tracing::info!("MCP gateway (streamable HTTP) listening on http://{}/mcp", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
        .map_err(|e| GatewayError::internal(format!("server error: {}", e)))?;

    Ok(())
}
