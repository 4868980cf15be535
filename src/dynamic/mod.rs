//! Dynamic meta-tools
//!
//! Built-in tools that mutate the active upstream set at runtime:
//! mcp-find / mcp-add / mcp-remove / mcp-config-set / mcp-exec /
//! code-mode / mcp-registry-import. They are injected into the aggregate
//! under the synthetic server name `dynamic-mcps` when the dynamic-tools
//! feature is enabled.

pub mod code_mode;
pub mod find;
pub mod secrets_form;

use crate::capabilities::{CallContext, ToolHandler, ToolRegistration};
use crate::catalog::{import, ServerKind};
use crate::gateway::{ChangedKinds, Gateway};
use crate::oauth::dcr;
use crate::{GatewayError, Result};
use code_mode::ToolSet;
use rmcp::model::{
    CallToolResult, Content, CreateElicitationRequestParam, ElicitationAction,
    ElicitationSchema, JsonObject, Tool,
};
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Weak};

/// Synthetic upstream name the meta-tools are registered under.
pub const DYNAMIC_SERVER_NAME: &str = "dynamic-mcps";

fn schema(value: Value) -> JsonObject {
    value.as_object().cloned().unwrap_or_default()
}

fn required_str(args: &JsonObject, key: &str) -> Result<String> {
    args.get(key)
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or_else(|| GatewayError::mcp(format!("{} parameter is required", key)))
}

fn optional_str_list(args: &JsonObject, key: &str) -> Option<Vec<String>> {
    args.get(key).and_then(Value::as_array).map(|items| {
        items
            .iter()
            .filter_map(Value::as_str)
            .map(str::to_string)
            .collect()
    })
}

fn text_result(message: impl Into<String>) -> CallToolResult {
    CallToolResult::success(vec![Content::text(message.into())])
}

fn error_result(message: impl Into<String>) -> CallToolResult {
    CallToolResult::error(vec![Content::text(message.into())])
}

/// The meta-tool registrations for one gateway.
pub fn registrations(gateway: &Arc<Gateway>) -> Vec<ToolRegistration> {
    let weak = Arc::downgrade(gateway);

    let tools: Vec<(Tool, Arc<dyn ToolHandler>)> = vec![
        (
            Tool::new(
                "mcp-find",
                "Search the catalog of available MCP servers",
                schema(json!({
                    "type": "object",
                    "properties": {
                        "query": {"type": "string", "description": "Search text"},
                        "limit": {"type": "integer", "description": "Maximum results", "default": 10}
                    },
                    "required": ["query"]
                })),
            ),
            Arc::new(FindHandler {
                gateway: weak.clone(),
            }),
        ),
        (
            Tool::new(
                "mcp-add",
                "Activate an MCP server from the catalog",
                schema(json!({
                    "type": "object",
                    "properties": {
                        "name": {"type": "string", "description": "Catalog server name"},
                        "tools": {
                            "type": "array",
                            "items": {"type": "string"},
                            "description": "Enable only these tools (default: all)"
                        }
                    },
                    "required": ["name"]
                })),
            ),
            Arc::new(AddHandler {
                gateway: weak.clone(),
            }),
        ),
        (
            Tool::new(
                "mcp-remove",
                "Deactivate an MCP server and drop its capabilities",
                schema(json!({
                    "type": "object",
                    "properties": {
                        "name": {"type": "string", "description": "Active server name"}
                    },
                    "required": ["name"]
                })),
            ),
            Arc::new(RemoveHandler {
                gateway: weak.clone(),
            }),
        ),
        (
            Tool::new(
                "mcp-config-set",
                "Set one configuration value for a server and re-federate it",
                schema(json!({
                    "type": "object",
                    "properties": {
                        "server": {"type": "string"},
                        "key": {"type": "string"},
                        "value": {"type": "string"}
                    },
                    "required": ["server", "key", "value"]
                })),
            ),
            Arc::new(ConfigSetHandler {
                gateway: weak.clone(),
            }),
        ),
        (
            Tool::new(
                "mcp-exec",
                "Invoke a registered tool by name",
                schema(json!({
                    "type": "object",
                    "properties": {
                        "name": {"type": "string", "description": "Registered tool name"},
                        "arguments": {"type": "object", "description": "Arguments for the tool"}
                    },
                    "required": ["name"]
                })),
            ),
            Arc::new(ExecHandler {
                gateway: weak.clone(),
            }),
        ),
        (
            Tool::new(
                "code-mode",
                "Wrap the tools of selected servers into a sandboxed code-execution tool",
                schema(json!({
                    "type": "object",
                    "properties": {
                        "servers": {"type": "array", "items": {"type": "string"}},
                        "name": {"type": "string", "description": "Suffix for the generated tool"}
                    },
                    "required": ["servers", "name"]
                })),
            ),
            Arc::new(CodeModeHandler {
                gateway: weak.clone(),
            }),
        ),
        (
            Tool::new(
                "mcp-registry-import",
                "Import MCP server definitions from a registry URL",
                schema(json!({
                    "type": "object",
                    "properties": {
                        "url": {"type": "string", "description": "Registry document URL"}
                    },
                    "required": ["url"]
                })),
            ),
            Arc::new(RegistryImportHandler {
                gateway: weak.clone(),
            }),
        ),
    ];

    tools
        .into_iter()
        .map(|(tool, handler)| ToolRegistration {
            server_name: DYNAMIC_SERVER_NAME.to_string(),
            tool,
            handler,
        })
        .collect()
}

fn upgrade(weak: &Weak<Gateway>) -> Result<Arc<Gateway>> {
    weak.upgrade()
        .ok_or_else(|| GatewayError::internal("gateway is shutting down"))
}

struct FindHandler {
    gateway: Weak<Gateway>,
}

#[async_trait::async_trait]
impl ToolHandler for FindHandler {
    async fn call(&self, _ctx: &CallContext, args: JsonObject) -> Result<CallToolResult> {
        let gateway = upgrade(&self.gateway)?;

        let query = match args.get("query").and_then(Value::as_str) {
            Some(query) if !query.is_empty() => query.to_string(),
            _ => return Ok(error_result("query parameter is required")),
        };
        let limit = args
            .get("limit")
            .and_then(Value::as_u64)
            .map(|l| l as usize)
            .unwrap_or(find::DEFAULT_LIMIT);

        let snapshot = gateway.configuration_snapshot();
        let results = find::find_servers(&snapshot, &query, limit);

        Ok(text_result(serde_json::to_string_pretty(&results)?))
    }
}

struct AddHandler {
    gateway: Weak<Gateway>,
}

impl AddHandler {
    /// Ask the client for consent before handing out the authorization
    /// URL. Returns false when the user declined.
    async fn ask_consent(ctx: &CallContext, server: &str) -> Result<bool> {
        let Some(peer) = ctx.peer.as_ref() else {
            return Ok(true);
        };

        let requested_schema = ElicitationSchema::builder()
            .required_enum("action", vec!["authorize".into(), "cancel".into()])
            .build()
            .map_err(|e| GatewayError::internal(format!("bad elicitation schema: {}", e)))?;

        let result = peer
            .create_elicitation(CreateElicitationRequestParam {
                message: format!(
                    "'{}' requires OAuth authorization. Open the authorization page?",
                    server
                ),
                requested_schema,
            })
            .await
            .map_err(|e| GatewayError::mcp(format!("elicitation failed: {}", e)))?;

        let authorized = matches!(result.action, ElicitationAction::Accept)
            && result
                .content
                .as_ref()
                .and_then(|c| c.get("action"))
                .and_then(Value::as_str)
                .is_none_or(|action| action == "authorize");

        Ok(authorized)
    }
}

#[async_trait::async_trait]
impl ToolHandler for AddHandler {
    async fn call(&self, ctx: &CallContext, args: JsonObject) -> Result<CallToolResult> {
        let gateway = upgrade(&self.gateway)?;
        let name = required_str(&args, "name")?;
        let selected_tools = optional_str_list(&args, "tools");

        let server = match gateway.with_configuration(|c| c.server(&name).map(Clone::clone)) {
            Ok(server) => server,
            Err(_) => return Ok(error_result(format!("unknown server '{}'", name))),
        };

        let added = gateway.with_configuration(|c| {
            if let Some(tools) = &selected_tools {
                c.set_enabled_tools(&name, tools.clone());
            }
            c.add_server_name(&name)
        });
        if !added {
            tracing::debug!("'{}' already active", name);
        }

        // Restrict the upcoming federation's additions to the selection.
        let tool_filter: Option<HashSet<String>> =
            selected_tools.map(|tools| tools.into_iter().collect());

        // Secrets may have been provided since boot; re-read them.
        let mut resolved = HashMap::new();
        for spec in &server.secrets {
            if let Some(value) = gateway.secrets().get_secret(&spec.name).await? {
                resolved.insert(spec.name.clone(), value);
            }
        }
        let missing = gateway.with_configuration(|c| {
            for (key, value) in resolved {
                c.secrets.insert(key, value);
            }
            c.missing_secrets(&server)
        });

        if !missing.is_empty() {
            tracing::info!(
                "'{}' is missing secrets {:?}; returning entry form",
                name,
                missing
            );
            return Ok(secrets_form::missing_secrets_result(&name, &missing));
        }

        if server.kind == ServerKind::RemoteOauth {
            let Some(oauth) = server.oauth.as_ref() else {
                return Ok(error_result(format!(
                    "server '{}' is remote-oauth but has no oauth endpoints",
                    name
                )));
            };

            // Already authorized: just federate like any other upstream.
            if gateway.credentials().status(&name).await.is_ok() {
                gateway.start_oauth_provider(&name);
                gateway.reload_server(&name, tool_filter.as_ref()).await?;
                return Ok(text_result(format!("added '{}'", name)));
            }

            let client_id = match oauth.registration_endpoint.as_deref() {
                Some(endpoint) => dcr::register_client(gateway.http(), endpoint)
                    .await?
                    .client_id,
                None => "mcp-gateway".to_string(),
            };
            let (auth_url, _verifier) = dcr::authorization_url(oauth, &client_id)?;

            gateway.start_oauth_provider(&name);

            if ctx.supports_elicitation() && !Self::ask_consent(ctx, &name).await? {
                return Ok(text_result(format!("authorization for '{}' declined", name)));
            }

            return Ok(text_result(format!(
                "'{}' requires authorization. Open this URL to continue:\n{}",
                name, auth_url
            )));
        }

        gateway.reload_server(&name, tool_filter.as_ref()).await?;
        Ok(text_result(format!("added '{}'", name)))
    }
}

struct RemoveHandler {
    gateway: Weak<Gateway>,
}

#[async_trait::async_trait]
impl ToolHandler for RemoveHandler {
    async fn call(&self, _ctx: &CallContext, args: JsonObject) -> Result<CallToolResult> {
        let gateway = upgrade(&self.gateway)?;
        let name = required_str(&args, "name")?;

        let was_active = gateway.with_configuration(|c| c.remove_server_name(&name));
        gateway.remove_server(&name).await;

        if was_active {
            Ok(text_result(format!("removed '{}'", name)))
        } else {
            Ok(text_result(format!("'{}' was not active", name)))
        }
    }
}

struct ConfigSetHandler {
    gateway: Weak<Gateway>,
}

#[async_trait::async_trait]
impl ToolHandler for ConfigSetHandler {
    async fn call(&self, _ctx: &CallContext, args: JsonObject) -> Result<CallToolResult> {
        let gateway = upgrade(&self.gateway)?;
        let server = required_str(&args, "server")?;
        let key = required_str(&args, "key")?;
        let value = required_str(&args, "value")?;

        // "tools" sets the server's enabled-tools list; anything else is
        // an opaque config value handed to the upstream.
        let tool_filter: Option<HashSet<String>> = if key == "tools" {
            let tools: Vec<String> = value
                .split(',')
                .map(|t| t.trim().to_string())
                .filter(|t| !t.is_empty())
                .collect();
            gateway.with_configuration(|c| c.set_enabled_tools(&server, tools.clone()));
            Some(tools.into_iter().collect())
        } else {
            gateway.with_configuration(|c| c.set_config_value(&server, &key, &value));
            None
        };

        // New config means a fresh session: drop the old one first.
        gateway.pool().remove(&server);
        gateway.reload_server(&server, tool_filter.as_ref()).await?;

        Ok(text_result(format!("set {}.{} and re-federated", server, key)))
    }
}

struct ExecHandler {
    gateway: Weak<Gateway>,
}

#[async_trait::async_trait]
impl ToolHandler for ExecHandler {
    async fn call(&self, ctx: &CallContext, args: JsonObject) -> Result<CallToolResult> {
        let gateway = upgrade(&self.gateway)?;
        let name = required_str(&args, "name")?;

        if name == "mcp-exec" {
            return Ok(error_result("mcp-exec cannot invoke itself"));
        }

        let arguments = args
            .get("arguments")
            .and_then(Value::as_object)
            .cloned()
            .unwrap_or_default();

        let registration =
            match gateway.with_state(|s| s.registry.tool(&name).map(Clone::clone)) {
                Ok(registration) => registration,
                Err(e) => return Ok(error_result(e.to_string())),
            };

        registration.handler.call(ctx, arguments).await
    }
}

struct CodeModeHandler {
    gateway: Weak<Gateway>,
}

#[async_trait::async_trait]
impl ToolHandler for CodeModeHandler {
    async fn call(&self, _ctx: &CallContext, args: JsonObject) -> Result<CallToolResult> {
        let gateway = upgrade(&self.gateway)?;
        let name = required_str(&args, "name")?;

        let servers: Vec<String> = args
            .get("servers")
            .and_then(Value::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(Value::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();
        if servers.is_empty() {
            return Ok(error_result("servers parameter is required"));
        }

        let Some(runtime) = gateway.code_runtime().cloned() else {
            return Ok(error_result("no code-execution runtime is configured"));
        };

        let sets = gateway.with_state(|state| {
            servers
                .iter()
                .map(|server| ToolSet {
                    server: server.clone(),
                    tools: state
                        .per_server
                        .get(server)
                        .map(|set| set.tools.clone())
                        .unwrap_or_default(),
                })
                .collect::<Vec<_>>()
        });

        let tool_name = format!("code-mode-{}", name);
        let (tool, handler) = runtime.wrap(&tool_name, sets)?;

        gateway.add_dynamic_tool(ToolRegistration {
            server_name: DYNAMIC_SERVER_NAME.to_string(),
            tool,
            handler,
        });
        gateway
            .broker()
            .notify(ChangedKinds {
                tools: true,
                ..Default::default()
            })
            .await;

        Ok(text_result(format!("added tool '{}'", tool_name)))
    }
}

struct RegistryImportHandler {
    gateway: Weak<Gateway>,
}

#[async_trait::async_trait]
impl ToolHandler for RegistryImportHandler {
    async fn call(&self, _ctx: &CallContext, args: JsonObject) -> Result<CallToolResult> {
        let gateway = upgrade(&self.gateway)?;
        let url = required_str(&args, "url")?;

        let entries = import::fetch_registry(&url).await?;
        if entries.is_empty() {
            return Ok(text_result("registry contained no servers"));
        }

        let names: Vec<String> = entries.iter().map(|e| e.name.clone()).collect();
        gateway.with_configuration(|c| {
            for entry in entries {
                c.insert_server(entry);
            }
        });

        Ok(text_result(format!(
            "imported {} server(s): {}",
            names.len(),
            names.join(", ")
        )))
    }
}

#[cfg(test)]
mod dynamic_test;
