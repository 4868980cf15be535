//! Federation engine
//!
//! Full reload: wipe the aggregate under the capability lock, list every
//! active upstream in parallel (bounded by the CPU count), then
//! re-register everything and flip health to ready. One upstream failing
//! never fails the reload; it just contributes nothing this cycle.

use super::{Gateway, GatewayState};
use crate::capabilities::{
    CallContext, PromptHandler, PromptRegistration, ResourceHandler, ResourceRegistration,
    ResourceTemplateRegistration, ServerCapabilitySet, ToolHandler, ToolRegistration,
};
use crate::catalog::ServerConfig;
use crate::client::ClientPool;
use crate::config::StartContext;
use crate::telemetry;
use crate::{GatewayError, Result};
use rmcp::model::{CallToolResult, GetPromptResult, JsonObject, ReadResourceResult};
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

/// Whether a tool passes the enabled-tools filter.
///
/// With an empty global list the per-server list decides (absent list =
/// allow). A non-empty global list matches `*`, the bare tool name,
/// `server:tool`, `server:*`, `image:tool`, or `image:*`, all
/// case-insensitively.
pub(crate) fn tool_enabled(
    global: &[String],
    per_server: Option<&[String]>,
    server_name: &str,
    image: Option<&str>,
    tool: &str,
) -> bool {
    if global.is_empty() {
        return per_server.is_none_or(|list| list.iter().any(|t| t == tool));
    }

    let tool = tool.to_lowercase();
    let server = server_name.to_lowercase();
    let image = image.map(str::to_lowercase);

    global.iter().any(|entry| {
        let entry = entry.to_lowercase();
        if entry == "*" || entry == tool {
            return true;
        }
        if entry == format!("{}:{}", server, tool) || entry == format!("{}:*", server) {
            return true;
        }
        if let Some(ref image) = image {
            if entry == format!("{}:{}", image, tool) || entry == format!("{}:*", image) {
                return true;
            }
        }
        false
    })
}

/// Forwards a tool call to its originating upstream through the pool.
struct ForwardingToolHandler {
    pool: Arc<ClientPool>,
    server: ServerConfig,
    ctx: StartContext,
    tool_name: String,
}

#[async_trait::async_trait]
impl ToolHandler for ForwardingToolHandler {
    async fn call(&self, _ctx: &CallContext, args: JsonObject) -> Result<CallToolResult> {
        let client = self.pool.acquire(&self.server, &self.ctx).await?;
        client.call_tool(&self.tool_name, args).await
    }
}

struct ForwardingPromptHandler {
    pool: Arc<ClientPool>,
    server: ServerConfig,
    ctx: StartContext,
    prompt_name: String,
}

#[async_trait::async_trait]
impl PromptHandler for ForwardingPromptHandler {
    async fn get(&self, args: Option<JsonObject>) -> Result<GetPromptResult> {
        let client = self.pool.acquire(&self.server, &self.ctx).await?;
        client.get_prompt(&self.prompt_name, args).await
    }
}

/// Forwards resource reads; also used for resource templates, where the
/// concrete URI arrives at read time.
struct ForwardingResourceHandler {
    pool: Arc<ClientPool>,
    server: ServerConfig,
    ctx: StartContext,
}

#[async_trait::async_trait]
impl ResourceHandler for ForwardingResourceHandler {
    async fn read(&self, uri: &str) -> Result<ReadResourceResult> {
        let client = self.pool.acquire(&self.server, &self.ctx).await?;
        client.read_resource(uri).await
    }
}

/// List one upstream's capabilities and wrap them into registrations.
///
/// A tool-list failure fails the whole listing (the caller decides how to
/// degrade); the optional kinds degrade to empty with a log line.
pub(crate) async fn list_server_set(
    pool: &Arc<ClientPool>,
    server: &ServerConfig,
    ctx: &StartContext,
    global_tools: &[String],
    per_server_tools: Option<&[String]>,
) -> Result<ServerCapabilitySet> {
    let client = pool.acquire(server, ctx).await?;

    let tools = client.list_tools().await.map_err(|e| {
        GatewayError::capability_list(&server.name, "tools", e.to_string())
    })?;

    let prompts = match client.list_prompts().await {
        Ok(prompts) => prompts,
        Err(e) => {
            tracing::debug!("'{}' lists no prompts: {}", server.name, e);
            Vec::new()
        }
    };
    let resources = match client.list_resources().await {
        Ok(resources) => resources,
        Err(e) => {
            tracing::debug!("'{}' lists no resources: {}", server.name, e);
            Vec::new()
        }
    };
    let resource_templates = match client.list_resource_templates().await {
        Ok(templates) => templates,
        Err(e) => {
            tracing::debug!("'{}' lists no resource templates: {}", server.name, e);
            Vec::new()
        }
    };

    let mut set = ServerCapabilitySet::default();

    for tool in tools {
        let name = tool.name.to_string();
        if !tool_enabled(
            global_tools,
            per_server_tools,
            &server.name,
            server.image.as_deref(),
            &name,
        ) {
            tracing::debug!("tool '{}' from '{}' filtered out", name, server.name);
            continue;
        }
        set.tools.push(ToolRegistration {
            server_name: server.name.clone(),
            tool,
            handler: Arc::new(ForwardingToolHandler {
                pool: pool.clone(),
                server: server.clone(),
                ctx: ctx.clone(),
                tool_name: name,
            }),
        });
    }

    for prompt in prompts {
        let name = prompt.name.to_string();
        set.prompts.push(PromptRegistration {
            server_name: server.name.clone(),
            prompt,
            handler: Arc::new(ForwardingPromptHandler {
                pool: pool.clone(),
                server: server.clone(),
                ctx: ctx.clone(),
                prompt_name: name,
            }),
        });
    }

    let resource_handler = Arc::new(ForwardingResourceHandler {
        pool: pool.clone(),
        server: server.clone(),
        ctx: ctx.clone(),
    });

    for resource in resources {
        set.resources.push(ResourceRegistration {
            server_name: server.name.clone(),
            resource,
            handler: resource_handler.clone(),
        });
    }

    for template in resource_templates {
        set.resource_templates.push(ResourceTemplateRegistration {
            server_name: server.name.clone(),
            template,
            handler: resource_handler.clone(),
        });
    }

    telemetry::record_federated_capabilities(&server.name, "tools", set.tools.len());
    telemetry::record_federated_capabilities(&server.name, "prompts", set.prompts.len());
    telemetry::record_federated_capabilities(&server.name, "resources", set.resources.len());
    telemetry::record_federated_capabilities(
        &server.name,
        "resource_templates",
        set.resource_templates.len(),
    );

    Ok(set)
}

/// Register one upstream's set into the aggregate.
pub(crate) fn register_set(state: &mut GatewayState, name: String, set: ServerCapabilitySet) {
    for registration in &set.tools {
        state.registry.add_tool(registration.clone());
    }
    for registration in &set.prompts {
        state.registry.add_prompt(registration.clone());
    }
    for registration in &set.resources {
        state.registry.add_resource(registration.clone());
    }
    for registration in &set.resource_templates {
        state.registry.add_resource_template(registration.clone());
    }
    state.per_server.insert(name, set);
}

fn worker_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(4)
}

impl Gateway {
    /// Full reload: rebuild the aggregate from every active upstream.
    pub async fn reload(self: &Arc<Self>) -> Result<()> {
        let snapshot = self.configuration_snapshot();
        let active = snapshot.active_servers();

        {
            let mut state = self.state.lock();
            state.registry.clear();
            state.per_server.clear();
        }

        let semaphore = Arc::new(Semaphore::new(worker_count()));
        let mut tasks: JoinSet<(String, ServerCapabilitySet)> = JoinSet::new();

        for server in active {
            let pool = self.pool.clone();
            let ctx = snapshot.start_context(&server);
            let global_tools = snapshot.global_tools.clone();
            let per_server_tools = snapshot.tools.get(&server.name).cloned();
            let semaphore = semaphore.clone();

            tasks.spawn(async move {
                let _permit = semaphore.acquire_owned().await;
                let name = server.name.clone();
                match list_server_set(
                    &pool,
                    &server,
                    &ctx,
                    &global_tools,
                    per_server_tools.as_deref(),
                )
                .await
                {
                    Ok(set) => (name, set),
                    Err(e) => {
                        tracing::warn!("upstream '{}' contributed nothing: {}", name, e);
                        (name, ServerCapabilitySet::default())
                    }
                }
            });
        }

        let mut results = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(result) => results.push(result),
                Err(e) => tracing::warn!("federation task failed: {}", e),
            }
        }

        // Best-effort cross-upstream ordering: follow activation order.
        results.sort_by_key(|(name, _)| {
            snapshot
                .server_names
                .iter()
                .position(|n| n == name)
                .unwrap_or(usize::MAX)
        });

        let dynamic = if self.dynamic_tools {
            let mut registrations = crate::dynamic::registrations(self);
            registrations.extend(self.dynamic_extra_snapshot());
            registrations
        } else {
            Vec::new()
        };

        let tool_count;
        {
            let mut state = self.state.lock();
            for (name, set) in results {
                register_set(&mut state, name, set);
            }
            for registration in dynamic {
                state.registry.add_tool(registration);
            }
            tool_count = state.registry.tool_count();
            // Readiness is published before the lock is released so any
            // reader seeing ready also sees the populated registry.
            self.health.set_ready(true);
        }

        tracing::info!("federation complete: {} tools registered", tool_count);
        Ok(())
    }
}

#[cfg(test)]
#[path = "federation_test.rs"]
mod federation_test;
