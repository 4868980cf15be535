//! Aggregate MCP server
//!
//! The rmcp `ServerHandler` the gateway exposes to clients. Everything it
//! serves comes out of the capability registry; tool calls dispatch to
//! the handler bound at registration time, so a call that raced a
//! reconcile still runs against the handler it was dispatched to.

use super::Gateway;
use crate::capabilities::CallContext;
use crate::dynamic::DYNAMIC_SERVER_NAME;
use crate::telemetry::{self, ToolCallAttributes};
use crate::GatewayError;
use rmcp::handler::server::ServerHandler;
use rmcp::model::{
    CallToolRequestParam, CallToolResult, Content, ErrorCode, GetPromptRequestParam,
    GetPromptResult, Implementation, InitializeRequestParam, InitializeResult,
    ListPromptsResult, ListResourceTemplatesResult, ListResourcesResult, ListToolsResult,
    PaginatedRequestParam, ProtocolVersion, ReadResourceRequestParam, ReadResourceResult,
    ServerCapabilities, ServerInfo,
};
use rmcp::service::{RequestContext, RoleServer};
use rmcp::ErrorData as McpError;
use std::sync::Arc;
use std::time::Instant;
use tracing::Instrument;

#[derive(Clone)]
pub struct McpGatewayServer {
    gateway: Arc<Gateway>,
}

impl McpGatewayServer {
    pub fn new(gateway: Arc<Gateway>) -> Self {
        Self { gateway }
    }

    fn capabilities() -> ServerCapabilities {
        ServerCapabilities::builder()
            .enable_tools()
            .enable_tool_list_changed()
            .enable_prompts()
            .enable_prompts_list_changed()
            .enable_resources()
            .enable_resources_list_changed()
            .build()
    }

    /// Telemetry server-type attribute for a registration's upstream.
    fn server_type(&self, server_name: &str) -> &'static str {
        if server_name == DYNAMIC_SERVER_NAME {
            return "dynamic";
        }
        self.gateway
            .with_configuration(|c| c.servers.get(server_name).map(|s| s.kind.as_str()))
            .unwrap_or("unknown")
    }
}

impl ServerHandler for McpGatewayServer {
    async fn initialize(
        &self,
        _request: InitializeRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<InitializeResult, McpError> {
        // Remember the peer so reconciles can push listChanged to it.
        self.gateway.broker().register(context.peer.clone()).await;

        Ok(InitializeResult {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: Self::capabilities(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "MCP gateway: one endpoint federating the configured MCP servers. \
                 Use the mcp-find and mcp-add tools to discover and enable more."
                    .to_string(),
            ),
        })
    }

    async fn list_tools(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListToolsResult, McpError> {
        let tools = self.gateway.with_state(|s| s.registry.tool_descriptors());
        Ok(ListToolsResult {
            tools,
            ..Default::default()
        })
    }

    async fn call_tool(
        &self,
        request: CallToolRequestParam,
        context: RequestContext<RoleServer>,
    ) -> Result<CallToolResult, McpError> {
        let tool_name = request.name.to_string();
        let args = request.arguments.unwrap_or_default();

        let registration = match self
            .gateway
            .with_state(|s| s.registry.tool(&tool_name).map(Clone::clone))
        {
            Ok(registration) => registration,
            Err(e) => {
                // User-level failure, not a protocol error.
                return Ok(CallToolResult::error(vec![Content::text(e.to_string())]));
            }
        };

        let client_name = context
            .peer
            .peer_info()
            .map(|info| info.client_info.name.clone())
            .unwrap_or_default();

        let attrs = ToolCallAttributes {
            server_name: &registration.server_name,
            server_type: self.server_type(&registration.server_name),
            tool_name: &tool_name,
            client_name: &client_name,
        };
        let span = telemetry::tool_call_span(&attrs);
        let start = Instant::now();

        let ctx = CallContext {
            peer: Some(context.peer.clone()),
            client_name: Some(client_name.clone()),
        };

        let result = registration
            .handler
            .call(&ctx, args)
            .instrument(span.clone())
            .await;

        telemetry::record_tool_call(&attrs, start.elapsed().as_secs_f64() * 1000.0);

        match result {
            Ok(result) => {
                span.record("otel.status_code", "OK");
                Ok(result)
            }
            Err(e) => {
                span.record("otel.status_code", "ERROR");
                tracing::warn!("tool '{}' failed: {}", tool_name, e);
                Ok(CallToolResult::error(vec![Content::text(e.to_string())]))
            }
        }
    }

    async fn list_prompts(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListPromptsResult, McpError> {
        let prompts = self.gateway.with_state(|s| s.registry.prompt_descriptors());
        Ok(ListPromptsResult {
            prompts,
            ..Default::default()
        })
    }

    async fn get_prompt(
        &self,
        request: GetPromptRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<GetPromptResult, McpError> {
        let name = request.name.to_string();

        let registration = self
            .gateway
            .with_state(|s| s.registry.prompt(&name).map(Clone::clone))
            .map_err(|e| McpError::invalid_params(e.to_string(), None))?;

        let arguments = request.arguments.map(|args| {
            args.into_iter()
                .map(|(k, v)| (k.to_string(), v))
                .collect::<rmcp::model::JsonObject>()
        });

        registration
            .handler
            .get(arguments)
            .await
            .map_err(|e| McpError::internal_error(e.to_string(), None))
    }

    async fn list_resources(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourcesResult, McpError> {
        let resources = self
            .gateway
            .with_state(|s| s.registry.resource_descriptors());
        Ok(ListResourcesResult {
            resources,
            ..Default::default()
        })
    }

    async fn list_resource_templates(
        &self,
        _request: Option<PaginatedRequestParam>,
        _context: RequestContext<RoleServer>,
    ) -> Result<ListResourceTemplatesResult, McpError> {
        let resource_templates = self
            .gateway
            .with_state(|s| s.registry.resource_template_descriptors());
        Ok(ListResourceTemplatesResult {
            resource_templates,
            ..Default::default()
        })
    }

    async fn read_resource(
        &self,
        request: ReadResourceRequestParam,
        _context: RequestContext<RoleServer>,
    ) -> Result<ReadResourceResult, McpError> {
        let uri = request.uri.to_string();

        // Exact resource first, then a template whose prefix matches.
        let handler = self.gateway.with_state(|s| {
            match s.registry.resource(&uri) {
                Ok(registration) => Some(registration.handler.clone()),
                Err(_) => s
                    .registry
                    .matching_resource_template(&uri)
                    .map(|registration| registration.handler.clone()),
            }
        });

        let Some(handler) = handler else {
            return Err(McpError::new(
                ErrorCode(-32002),
                format!("Resource not found: {}", uri),
                None,
            ));
        };

        handler.read(&uri).await.map_err(|e| match e {
            GatewayError::NotFound { .. } => {
                McpError::new(ErrorCode(-32002), e.to_string(), None)
            }
            other => McpError::internal_error(other.to_string(), None),
        })
    }

    fn get_info(&self) -> ServerInfo {
        ServerInfo {
            protocol_version: ProtocolVersion::V_2025_06_18,
            capabilities: Self::capabilities(),
            server_info: Implementation::from_build_env(),
            instructions: Some(
                "MCP gateway: one endpoint federating the configured MCP servers.".to_string(),
            ),
        }
    }
}
