//! Capability registry
//!
//! Holds the federated view: per-upstream capability sets and the
//! aggregate index the MCP server serves from. The registry itself is
//! not thread-safe; the gateway serializes mutation under its capability
//! lock.

use crate::Result;
use rmcp::model::{
    CallToolResult, GetPromptResult, JsonObject, Prompt, ReadResourceResult, Resource,
    ResourceTemplate, Tool,
};
use rmcp::service::{Peer, RoleServer};
use std::collections::HashMap;
use std::sync::Arc;

/// Context handed to capability handlers for one inbound call.
#[derive(Clone, Default)]
pub struct CallContext {
    /// Peer of the calling client, when the call came over a live session.
    pub peer: Option<Peer<RoleServer>>,

    /// Client implementation name, for telemetry.
    pub client_name: Option<String>,
}

impl CallContext {
    /// Whether the calling client declared the elicitation capability.
    pub fn supports_elicitation(&self) -> bool {
        self.peer
            .as_ref()
            .and_then(|peer| peer.peer_info())
            .is_some_and(|info| info.capabilities.elicitation.is_some())
    }
}

/// Handler behind a federated tool.
#[async_trait::async_trait]
pub trait ToolHandler: Send + Sync {
    async fn call(&self, ctx: &CallContext, args: JsonObject) -> Result<CallToolResult>;
}

/// Handler behind a federated prompt.
#[async_trait::async_trait]
pub trait PromptHandler: Send + Sync {
    async fn get(&self, args: Option<JsonObject>) -> Result<GetPromptResult>;
}

/// Handler behind a federated resource or resource template.
#[async_trait::async_trait]
pub trait ResourceHandler: Send + Sync {
    async fn read(&self, uri: &str) -> Result<ReadResourceResult>;
}

#[derive(Clone)]
pub struct ToolRegistration {
    /// Upstream the tool came from.
    pub server_name: String,
    pub tool: Tool,
    pub handler: Arc<dyn ToolHandler>,
}

impl std::fmt::Debug for ToolRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistration")
            .field("server_name", &self.server_name)
            .field("tool", &self.tool)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct PromptRegistration {
    pub server_name: String,
    pub prompt: Prompt,
    pub handler: Arc<dyn PromptHandler>,
}

impl std::fmt::Debug for PromptRegistration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PromptRegistration")
            .field("server_name", &self.server_name)
            .field("prompt", &self.prompt)
            .finish_non_exhaustive()
    }
}

#[derive(Clone)]
pub struct ResourceRegistration {
    pub server_name: String,
    pub resource: Resource,
    pub handler: Arc<dyn ResourceHandler>,
}

#[derive(Clone)]
pub struct ResourceTemplateRegistration {
    pub server_name: String,
    pub template: ResourceTemplate,
    pub handler: Arc<dyn ResourceHandler>,
}

impl ToolRegistration {
    pub fn key(&self) -> String {
        self.tool.name.to_string()
    }
}

impl PromptRegistration {
    pub fn key(&self) -> String {
        self.prompt.name.to_string()
    }
}

impl ResourceRegistration {
    pub fn key(&self) -> String {
        self.resource.uri.to_string()
    }
}

impl ResourceTemplateRegistration {
    pub fn key(&self) -> String {
        self.template.uri_template.to_string()
    }
}

/// Everything one upstream currently contributes, in upstream list order.
#[derive(Clone, Default)]
pub struct ServerCapabilitySet {
    pub tools: Vec<ToolRegistration>,
    pub prompts: Vec<PromptRegistration>,
    pub resources: Vec<ResourceRegistration>,
    pub resource_templates: Vec<ResourceTemplateRegistration>,
}

impl ServerCapabilitySet {
    pub fn tool_names(&self) -> Vec<String> {
        self.tools.iter().map(ToolRegistration::key).collect()
    }

    pub fn prompt_names(&self) -> Vec<String> {
        self.prompts.iter().map(PromptRegistration::key).collect()
    }

    pub fn resource_uris(&self) -> Vec<String> {
        self.resources.iter().map(ResourceRegistration::key).collect()
    }

    pub fn resource_template_uris(&self) -> Vec<String> {
        self.resource_templates
            .iter()
            .map(ResourceTemplateRegistration::key)
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
            && self.prompts.is_empty()
            && self.resources.is_empty()
            && self.resource_templates.is_empty()
    }
}

/// One keyed, ordered index of registrations.
///
/// Insertion order is preserved for listing; re-registering an existing
/// key replaces the record in place (last writer wins). Cross-upstream
/// collisions are warned about by the registry wrappers.
struct KeyedIndex<T> {
    entries: HashMap<String, T>,
    order: Vec<String>,
    kind: &'static str,
}

impl<T: Clone> KeyedIndex<T> {
    fn new(kind: &'static str) -> Self {
        Self {
            entries: HashMap::new(),
            order: Vec::new(),
            kind,
        }
    }

    /// Insert, returning the replaced record if the key existed.
    fn insert(&mut self, key: String, value: T) -> Option<T> {
        let previous = self.entries.insert(key.clone(), value);
        if previous.is_none() {
            self.order.push(key);
        }
        previous
    }

    fn remove(&mut self, key: &str) {
        if self.entries.remove(key).is_some() {
            self.order.retain(|k| k != key);
        }
    }

    fn get(&self, key: &str) -> Option<&T> {
        self.entries.get(key)
    }

    fn values(&self) -> impl Iterator<Item = &T> {
        self.order.iter().filter_map(|k| self.entries.get(k))
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    fn len(&self) -> usize {
        self.entries.len()
    }
}

/// The aggregate index served to clients.
pub struct CapabilityRegistry {
    tools: KeyedIndex<ToolRegistration>,
    prompts: KeyedIndex<PromptRegistration>,
    resources: KeyedIndex<ResourceRegistration>,
    resource_templates: KeyedIndex<ResourceTemplateRegistration>,
}

impl Default for CapabilityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CapabilityRegistry {
    pub fn new() -> Self {
        Self {
            tools: KeyedIndex::new("tool"),
            prompts: KeyedIndex::new("prompt"),
            resources: KeyedIndex::new("resource"),
            resource_templates: KeyedIndex::new("resource template"),
        }
    }

    pub fn add_tool(&mut self, registration: ToolRegistration) {
        let key = registration.key();
        let server = registration.server_name.clone();
        if let Some(previous) = self.tools.insert(key.clone(), registration) {
            warn_on_collision("tool", &key, &previous.server_name, &server);
        }
    }

    pub fn add_prompt(&mut self, registration: PromptRegistration) {
        let key = registration.key();
        let server = registration.server_name.clone();
        if let Some(previous) = self.prompts.insert(key.clone(), registration) {
            warn_on_collision("prompt", &key, &previous.server_name, &server);
        }
    }

    pub fn add_resource(&mut self, registration: ResourceRegistration) {
        let key = registration.key();
        let server = registration.server_name.clone();
        if let Some(previous) = self.resources.insert(key.clone(), registration) {
            warn_on_collision("resource", &key, &previous.server_name, &server);
        }
    }

    pub fn add_resource_template(&mut self, registration: ResourceTemplateRegistration) {
        let key = registration.key();
        let server = registration.server_name.clone();
        if let Some(previous) = self.resource_templates.insert(key.clone(), registration) {
            warn_on_collision("resource template", &key, &previous.server_name, &server);
        }
    }

    pub fn remove_tools(&mut self, keys: &[String]) {
        for key in keys {
            self.tools.remove(key);
        }
    }

    pub fn remove_prompts(&mut self, keys: &[String]) {
        for key in keys {
            self.prompts.remove(key);
        }
    }

    pub fn remove_resources(&mut self, keys: &[String]) {
        for key in keys {
            self.resources.remove(key);
        }
    }

    pub fn remove_resource_templates(&mut self, keys: &[String]) {
        for key in keys {
            self.resource_templates.remove(key);
        }
    }

    pub fn tool(&self, name: &str) -> Result<&ToolRegistration> {
        self.tools
            .get(name)
            .ok_or_else(|| crate::GatewayError::not_found("tool", name))
    }

    pub fn prompt(&self, name: &str) -> Result<&PromptRegistration> {
        self.prompts
            .get(name)
            .ok_or_else(|| crate::GatewayError::not_found("prompt", name))
    }

    pub fn resource(&self, uri: &str) -> Result<&ResourceRegistration> {
        self.resources
            .get(uri)
            .ok_or_else(|| crate::GatewayError::not_found("resource", uri))
    }

    pub fn resource_template(&self, uri_template: &str) -> Result<&ResourceTemplateRegistration> {
        self.resource_templates
            .get(uri_template)
            .ok_or_else(|| crate::GatewayError::not_found("resource template", uri_template))
    }

    /// Resource-template registration whose template matches a concrete URI.
    ///
    /// Matching is on the literal prefix before the first `{` expansion,
    /// which covers the common `scheme://host/{path}` shapes.
    pub fn matching_resource_template(&self, uri: &str) -> Option<&ResourceTemplateRegistration> {
        self.resource_templates
            .values()
            .find(|registration| uri_template_matches(&registration.key(), uri))
    }

    pub fn tool_descriptors(&self) -> Vec<Tool> {
        self.tools.values().map(|r| r.tool.clone()).collect()
    }

    pub fn prompt_descriptors(&self) -> Vec<Prompt> {
        self.prompts.values().map(|r| r.prompt.clone()).collect()
    }

    pub fn resource_descriptors(&self) -> Vec<Resource> {
        self.resources.values().map(|r| r.resource.clone()).collect()
    }

    pub fn resource_template_descriptors(&self) -> Vec<ResourceTemplate> {
        self.resource_templates
            .values()
            .map(|r| r.template.clone())
            .collect()
    }

    pub fn tool_count(&self) -> usize {
        self.tools.len()
    }

    /// Drop every registration, in key order: tools, prompts, resources,
    /// resource templates.
    pub fn clear(&mut self) {
        self.tools.clear();
        self.prompts.clear();
        self.resources.clear();
        self.resource_templates.clear();
    }
}

/// Upstream names are expected to scope capability names by convention;
/// when they don't, last writer wins.
fn warn_on_collision(kind: &str, key: &str, previous_server: &str, new_server: &str) {
    if previous_server != new_server {
        tracing::warn!(
            "{} '{}' from '{}' shadows the one from '{}'",
            kind,
            key,
            new_server,
            previous_server
        );
    }
}

/// Whether a URI template's literal prefix matches a concrete URI.
pub(crate) fn uri_template_matches(template: &str, uri: &str) -> bool {
    match template.split_once('{') {
        Some((prefix, _)) => !prefix.is_empty() && uri.starts_with(prefix),
        None => template == uri,
    }
}
