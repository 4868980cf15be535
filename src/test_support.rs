//! Shared fixtures for unit tests.

use crate::capabilities::{
    CallContext, PromptHandler, ResourceHandler, ToolHandler, ToolRegistration,
};
use crate::catalog::{Catalog, ServerConfig};
use crate::client::{ClientPool, SessionFactory, UpstreamRpc};
use crate::config::{Configuration, StartContext};
use crate::dynamic::code_mode::CodeRuntime;
use crate::gateway::Gateway;
use crate::oauth::credentials::MemoryCredentialStore;
use crate::secrets::{EnvSecretsProvider, SecretsProvider};
use crate::{GatewayError, Result};
use rmcp::model::{
    CallToolResult, Content, GetPromptResult, JsonObject, Prompt, ReadResourceResult, Resource,
    ResourceTemplate, Tool,
};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

pub(crate) fn tool(name: &str) -> Tool {
    serde_json::from_value(json!({
        "name": name,
        "description": format!("{} tool", name),
        "inputSchema": {"type": "object"}
    }))
    .unwrap()
}

pub(crate) fn prompt(name: &str) -> Prompt {
    serde_json::from_value(json!({"name": name})).unwrap()
}

pub(crate) fn resource(uri: &str) -> Resource {
    serde_json::from_value(json!({"uri": uri, "name": uri})).unwrap()
}

pub(crate) fn resource_template(uri_template: &str) -> ResourceTemplate {
    serde_json::from_value(json!({"uriTemplate": uri_template, "name": uri_template})).unwrap()
}

pub(crate) struct NoopToolHandler;

#[async_trait::async_trait]
impl ToolHandler for NoopToolHandler {
    async fn call(&self, _ctx: &CallContext, _args: JsonObject) -> Result<CallToolResult> {
        Ok(CallToolResult::success(vec![Content::text("ok")]))
    }
}

pub(crate) struct NoopPromptHandler;

#[async_trait::async_trait]
impl PromptHandler for NoopPromptHandler {
    async fn get(&self, _args: Option<JsonObject>) -> Result<GetPromptResult> {
        serde_json::from_value(json!({"messages": []})).map_err(Into::into)
    }
}

pub(crate) struct NoopResourceHandler;

#[async_trait::async_trait]
impl ResourceHandler for NoopResourceHandler {
    async fn read(&self, uri: &str) -> Result<ReadResourceResult> {
        serde_json::from_value(json!({
            "contents": [{"uri": uri, "text": "contents"}]
        }))
        .map_err(Into::into)
    }
}

pub(crate) fn tool_registration(server: &str, name: &str) -> ToolRegistration {
    ToolRegistration {
        server_name: server.to_string(),
        tool: tool(name),
        handler: Arc::new(NoopToolHandler),
    }
}

/// What a stub upstream serves.
#[derive(Default, Clone)]
pub(crate) struct StubCapabilities {
    pub tools: Vec<String>,
    pub prompts: Vec<String>,
    pub resources: Vec<String>,
    pub resource_templates: Vec<String>,
    /// Fail `list_tools` instead of answering.
    pub fail_tool_list: bool,
}

impl StubCapabilities {
    pub fn tools(names: &[&str]) -> Self {
        Self {
            tools: names.iter().map(|s| s.to_string()).collect(),
            ..Default::default()
        }
    }
}

pub(crate) struct StubRpc {
    server: String,
    capabilities: StubCapabilities,
}

#[async_trait::async_trait]
impl UpstreamRpc for StubRpc {
    async fn list_tools(&self) -> Result<Vec<Tool>> {
        if self.capabilities.fail_tool_list {
            return Err(GatewayError::upstream(&self.server, "tool listing failed"));
        }
        Ok(self.capabilities.tools.iter().map(|n| tool(n)).collect())
    }

    async fn list_prompts(&self) -> Result<Vec<Prompt>> {
        Ok(self.capabilities.prompts.iter().map(|n| prompt(n)).collect())
    }

    async fn list_resources(&self) -> Result<Vec<Resource>> {
        Ok(self
            .capabilities
            .resources
            .iter()
            .map(|n| resource(n))
            .collect())
    }

    async fn list_resource_templates(&self) -> Result<Vec<ResourceTemplate>> {
        Ok(self
            .capabilities
            .resource_templates
            .iter()
            .map(|n| resource_template(n))
            .collect())
    }

    async fn call_tool(&self, name: &str, _args: JsonObject) -> Result<CallToolResult> {
        Ok(CallToolResult::success(vec![Content::text(format!(
            "{}:{}",
            self.server, name
        ))]))
    }

    async fn get_prompt(
        &self,
        _name: &str,
        _args: Option<JsonObject>,
    ) -> Result<GetPromptResult> {
        serde_json::from_value(json!({"messages": []})).map_err(Into::into)
    }

    async fn read_resource(&self, uri: &str) -> Result<ReadResourceResult> {
        serde_json::from_value(json!({
            "contents": [{"uri": uri, "text": "contents"}]
        }))
        .map_err(Into::into)
    }
}

/// Factory serving canned capabilities per upstream name. Capabilities
/// can be swapped mid-test; a fresh session (after `pool.remove`) picks
/// up the new ones.
#[derive(Default)]
pub(crate) struct StubFactory {
    capabilities: parking_lot::Mutex<HashMap<String, StubCapabilities>>,
    starts: AtomicUsize,
}

impl StubFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_server(self, name: &str, capabilities: StubCapabilities) -> Self {
        self.capabilities
            .lock()
            .insert(name.to_string(), capabilities);
        self
    }

    pub fn set(&self, name: &str, capabilities: StubCapabilities) {
        self.capabilities
            .lock()
            .insert(name.to_string(), capabilities);
    }

    pub fn start_count(&self) -> usize {
        self.starts.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SessionFactory for StubFactory {
    async fn start(
        &self,
        server: &ServerConfig,
        _ctx: &StartContext,
    ) -> Result<Arc<dyn UpstreamRpc>> {
        self.starts.fetch_add(1, Ordering::SeqCst);
        let capabilities = self
            .capabilities
            .lock()
            .get(&server.name)
            .cloned()
            .ok_or_else(|| GatewayError::upstream(&server.name, "unreachable"))?;
        Ok(Arc::new(StubRpc {
            server: server.name.clone(),
            capabilities,
        }))
    }
}

pub(crate) fn server_config(name: &str) -> ServerConfig {
    ServerConfig {
        name: name.to_string(),
        ..Default::default()
    }
}

/// Gateway wired to a stub factory, with every listed server active.
pub(crate) fn stub_gateway(
    factory: Arc<StubFactory>,
    servers: &[&str],
    dynamic_tools: bool,
) -> Arc<Gateway> {
    let mut catalog = Catalog::new();
    for name in servers {
        catalog.add(server_config(name));
    }

    let configuration = Configuration {
        server_names: servers.iter().map(|s| s.to_string()).collect(),
        servers: catalog.into_entries(),
        ..Default::default()
    };

    let secrets: Arc<dyn SecretsProvider> = Arc::new(EnvSecretsProvider::new());
    let pool = ClientPool::new(factory);
    let code_runtime: Option<Arc<dyn CodeRuntime>> = None;

    Gateway::new(
        configuration,
        pool,
        secrets,
        Arc::new(MemoryCredentialStore::new()),
        code_runtime,
        dynamic_tools,
    )
}
