//! Upstream MCP clients
//!
//! `UpstreamRpc` is the narrow surface the gateway needs from an upstream
//! session; `RmcpSession` backs it with the rmcp SDK over the child
//! process or streamable HTTP transports. The pool (`pool`) owns sessions
//! and hands out ref-counted borrows.

pub mod pool;

pub use pool::{ClientHandle, ClientPool};

use crate::catalog::{ServerConfig, ServerKind};
use crate::config::StartContext;
use crate::oauth::credentials::CredentialStore;
use crate::{GatewayError, Result};
use rmcp::handler::client::ClientHandler;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, ClientCapabilities, ClientInfo, GetPromptRequestParam,
    GetPromptResult, Implementation, JsonObject, Prompt, ReadResourceRequestParam,
    ReadResourceResult, Resource, ResourceTemplate, Tool,
};
use rmcp::service::{self, NotificationContext, RoleClient, RunningService};
use rmcp::transport::streamable_http_client::{
    StreamableHttpClientTransport, StreamableHttpClientTransportConfig,
};
use rmcp::transport::{ConfigureCommandExt, TokioChildProcess};
use std::borrow::Cow;
use std::sync::Arc;
use tokio::process::Command;
use tokio::sync::mpsc;

/// An upstream announced that one of its capability lists changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangeNotice {
    pub server: String,
}

/// What the gateway needs from a live upstream session.
#[async_trait::async_trait]
pub trait UpstreamRpc: Send + Sync {
    async fn list_tools(&self) -> Result<Vec<Tool>>;
    async fn list_prompts(&self) -> Result<Vec<Prompt>>;
    async fn list_resources(&self) -> Result<Vec<Resource>>;
    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>>;
    async fn call_tool(&self, name: &str, args: JsonObject) -> Result<CallToolResult>;
    async fn get_prompt(&self, name: &str, args: Option<JsonObject>) -> Result<GetPromptResult>;
    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult>;
}

/// Client-side handler for upstream sessions. Forwards listChanged
/// notifications into the gateway's reconcile loop.
#[derive(Clone)]
pub struct GatewayClientHandler {
    server_name: String,
    notices: mpsc::UnboundedSender<ChangeNotice>,
}

impl GatewayClientHandler {
    pub fn new(server_name: String, notices: mpsc::UnboundedSender<ChangeNotice>) -> Self {
        Self {
            server_name,
            notices,
        }
    }

    fn notify(&self, what: &str) {
        tracing::debug!("upstream '{}' announced {} change", self.server_name, what);
        let _ = self.notices.send(ChangeNotice {
            server: self.server_name.clone(),
        });
    }
}

impl ClientHandler for GatewayClientHandler {
    fn on_tool_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        self.notify("tool list");
        std::future::ready(())
    }

    fn on_prompt_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        self.notify("prompt list");
        std::future::ready(())
    }

    fn on_resource_list_changed(
        &self,
        _context: NotificationContext<RoleClient>,
    ) -> impl std::future::Future<Output = ()> + Send + '_ {
        self.notify("resource list");
        std::future::ready(())
    }

    fn get_info(&self) -> ClientInfo {
        ClientInfo {
            protocol_version: Default::default(),
            capabilities: ClientCapabilities::default(),
            client_info: Implementation {
                name: "mcp-gateway".to_string(),
                version: env!("CARGO_PKG_VERSION").to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

/// A live rmcp session to one upstream.
pub struct RmcpSession {
    server_name: String,
    service: RunningService<RoleClient, GatewayClientHandler>,
}

impl RmcpSession {
    fn mcp_err(&self, e: impl std::fmt::Display) -> GatewayError {
        GatewayError::mcp(format!("{}: {}", self.server_name, e))
    }
}

#[async_trait::async_trait]
impl UpstreamRpc for RmcpSession {
    async fn list_tools(&self) -> Result<Vec<Tool>> {
        let result = self
            .service
            .list_tools(Default::default())
            .await
            .map_err(|e| self.mcp_err(e))?;
        Ok(result.tools)
    }

    async fn list_prompts(&self) -> Result<Vec<Prompt>> {
        let result = self
            .service
            .list_prompts(Default::default())
            .await
            .map_err(|e| self.mcp_err(e))?;
        Ok(result.prompts)
    }

    async fn list_resources(&self) -> Result<Vec<Resource>> {
        let result = self
            .service
            .list_resources(Default::default())
            .await
            .map_err(|e| self.mcp_err(e))?;
        Ok(result.resources)
    }

    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>> {
        let result = self
            .service
            .list_resource_templates(Default::default())
            .await
            .map_err(|e| self.mcp_err(e))?;
        Ok(result.resource_templates)
    }

    async fn call_tool(&self, name: &str, args: JsonObject) -> Result<CallToolResult> {
        let request = CallToolRequestParam {
            name: Cow::from(name.to_string()),
            arguments: Some(args),
        };

        self.service
            .call_tool(request)
            .await
            .map_err(|e| self.mcp_err(e))
    }

    async fn get_prompt(&self, name: &str, args: Option<JsonObject>) -> Result<GetPromptResult> {
        let request = GetPromptRequestParam {
            name: name.to_string().into(),
            arguments: args,
        };

        self.service
            .get_prompt(request)
            .await
            .map_err(|e| self.mcp_err(e))
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        let request = ReadResourceRequestParam {
            uri: uri.to_string().into(),
        };

        self.service
            .read_resource(request)
            .await
            .map_err(|e| self.mcp_err(e))
    }
}

/// Starts upstream sessions. The pool is the only caller.
#[async_trait::async_trait]
pub trait SessionFactory: Send + Sync {
    async fn start(
        &self,
        server: &ServerConfig,
        ctx: &StartContext,
    ) -> Result<Arc<dyn UpstreamRpc>>;
}

/// Production factory: containers over stdio, remotes over streamable HTTP.
pub struct RmcpSessionFactory {
    notices: mpsc::UnboundedSender<ChangeNotice>,
    credentials: Arc<dyn CredentialStore>,
}

impl RmcpSessionFactory {
    pub fn new(
        notices: mpsc::UnboundedSender<ChangeNotice>,
        credentials: Arc<dyn CredentialStore>,
    ) -> Self {
        Self {
            notices,
            credentials,
        }
    }

    async fn start_container(
        &self,
        server: &ServerConfig,
        ctx: &StartContext,
    ) -> Result<Arc<dyn UpstreamRpc>> {
        let image = server.image.as_deref().ok_or_else(|| {
            GatewayError::config(format!("server '{}' has no image", server.name))
        })?;

        let mut cmd = Command::new("docker");
        cmd.arg("run").arg("--rm").arg("-i");

        for (key, value) in &server.env {
            cmd.arg("-e").arg(format!("{}={}", key, value));
        }
        for (key, value) in &ctx.config {
            cmd.arg("-e").arg(format!("{}={}", key, value));
        }
        // Secrets ride the process environment so values stay out of argv.
        for (key, value) in &ctx.secrets {
            cmd.env(key, value);
            cmd.arg("-e").arg(key);
        }

        cmd.arg(image);
        cmd.args(server.command.iter());

        tracing::info!("starting container upstream '{}' ({})", server.name, image);

        let transport = TokioChildProcess::new(cmd.configure(|c| {
            c.stderr(std::process::Stdio::inherit());
        }))
        .map_err(|e| GatewayError::upstream(&server.name, e.to_string()))?;

        let handler = GatewayClientHandler::new(server.name.clone(), self.notices.clone());
        let service = service::serve_client(handler, transport)
            .await
            .map_err(|e| GatewayError::upstream(&server.name, e.to_string()))?;

        Ok(Arc::new(RmcpSession {
            server_name: server.name.clone(),
            service,
        }))
    }

    async fn start_remote(
        &self,
        server: &ServerConfig,
        bearer: Option<String>,
    ) -> Result<Arc<dyn UpstreamRpc>> {
        let url = server.url.as_deref().ok_or_else(|| {
            GatewayError::config(format!("server '{}' has no url", server.name))
        })?;

        let mut headers = reqwest::header::HeaderMap::new();
        for (key, value) in &server.headers {
            let name = reqwest::header::HeaderName::from_bytes(key.as_bytes())
                .map_err(|e| GatewayError::config(format!("invalid header name '{}': {}", key, e)))?;
            let value = reqwest::header::HeaderValue::from_str(value)
                .map_err(|e| GatewayError::config(format!("invalid header value for '{}': {}", key, e)))?;
            headers.insert(name, value);
        }
        if let Some(token) = bearer {
            let value = reqwest::header::HeaderValue::from_str(&format!("Bearer {}", token))
                .map_err(|e| GatewayError::auth(format!("invalid bearer token: {}", e)))?;
            headers.insert(reqwest::header::AUTHORIZATION, value);
        }

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(GatewayError::Network)?;

        tracing::info!("connecting remote upstream '{}' at {}", server.name, url);

        let transport = StreamableHttpClientTransport::with_client(
            client,
            StreamableHttpClientTransportConfig::with_uri(url.to_string()),
        );

        let handler = GatewayClientHandler::new(server.name.clone(), self.notices.clone());
        let service = service::serve_client(handler, transport)
            .await
            .map_err(|e| GatewayError::upstream(&server.name, e.to_string()))?;

        Ok(Arc::new(RmcpSession {
            server_name: server.name.clone(),
            service,
        }))
    }
}

#[async_trait::async_trait]
impl SessionFactory for RmcpSessionFactory {
    async fn start(
        &self,
        server: &ServerConfig,
        ctx: &StartContext,
    ) -> Result<Arc<dyn UpstreamRpc>> {
        match server.kind {
            ServerKind::StdioContainer => self.start_container(server, ctx).await,
            ServerKind::RemoteHttp => self.start_remote(server, None).await,
            ServerKind::RemoteOauth => {
                let token = self.credentials.access_token(&server.name).await?;
                self.start_remote(server, token).await
            }
        }
    }
}
