//! Gateway configuration
//!
//! The configuration snapshot is the single mutable view of "what the
//! gateway is currently serving": the ordered active server set, the
//! known catalog, per-server config values, secrets, and tool filters.
//! It is mutated only from the gateway side (meta-tool handlers); readers
//! clone it before enumerating.

use crate::catalog::{Catalog, ServerConfig};
use crate::secrets::SecretsProvider;
use crate::{GatewayError, Result};
use std::collections::HashMap;
use std::sync::Arc;

/// Everything an upstream start needs beyond its immutable descriptor:
/// the per-server config values and resolved secrets.
#[derive(Debug, Clone, Default)]
pub struct StartContext {
    pub config: HashMap<String, String>,
    pub secrets: HashMap<String, String>,
}

/// Mutable configuration snapshot.
#[derive(Debug, Clone, Default)]
pub struct Configuration {
    /// Currently active upstreams, in activation order.
    pub server_names: Vec<String>,

    /// Known catalog of upstream descriptors.
    pub servers: HashMap<String, ServerConfig>,

    /// Per-server configuration values (`mcp-config-set`).
    pub config: HashMap<String, HashMap<String, String>>,

    /// Resolved secret values, keyed by secret name.
    pub secrets: HashMap<String, String>,

    /// Per-server enabled tool lists; a missing entry allows everything.
    pub tools: HashMap<String, Vec<String>>,

    /// Global enabled-tools filter (`--tools`); empty means "use the
    /// per-server lists".
    pub global_tools: Vec<String>,
}

impl Configuration {
    /// Build a snapshot from a catalog, the initially active server names,
    /// and the secrets those servers declare.
    pub async fn build(
        catalog: Catalog,
        server_names: Vec<String>,
        global_tools: Vec<String>,
        secrets: &Arc<dyn SecretsProvider>,
    ) -> Result<Self> {
        let servers = catalog.into_entries();

        for name in &server_names {
            if !servers.contains_key(name) {
                return Err(GatewayError::config(format!(
                    "unknown server '{}' requested",
                    name
                )));
            }
        }

        let mut configuration = Self {
            server_names,
            servers,
            global_tools,
            ..Default::default()
        };

        // Catalog entries may restrict their own tool set up front.
        let declared: Vec<(String, Vec<String>)> = configuration
            .servers
            .values()
            .filter_map(|s| s.enabled_tools.clone().map(|list| (s.name.clone(), list)))
            .collect();
        for (name, list) in declared {
            configuration.tools.insert(name, list);
        }

        configuration.resolve_secrets(secrets).await?;

        Ok(configuration)
    }

    /// Re-read declared secrets for every catalog entry from the provider.
    pub async fn resolve_secrets(&mut self, provider: &Arc<dyn SecretsProvider>) -> Result<()> {
        for server in self.servers.values() {
            for spec in &server.secrets {
                if let Some(value) = provider.get_secret(&spec.name).await? {
                    self.secrets.insert(spec.name.clone(), value);
                }
            }
        }
        Ok(())
    }

    /// The descriptor for an upstream, or a config error if unknown.
    pub fn server(&self, name: &str) -> Result<&ServerConfig> {
        self.servers
            .get(name)
            .ok_or_else(|| GatewayError::config(format!("unknown server '{}'", name)))
    }

    /// Active upstream descriptors in activation order. Names without a
    /// catalog entry are skipped with a warning.
    pub fn active_servers(&self) -> Vec<ServerConfig> {
        self.server_names
            .iter()
            .filter_map(|name| match self.servers.get(name) {
                Some(server) => Some(server.clone()),
                None => {
                    tracing::warn!("active server '{}' missing from catalog", name);
                    None
                }
            })
            .collect()
    }

    /// Append a server to the active set. Returns false if already active.
    pub fn add_server_name(&mut self, name: &str) -> bool {
        if self.server_names.iter().any(|n| n == name) {
            return false;
        }
        self.server_names.push(name.to_string());
        true
    }

    /// Remove a server from the active set. Returns false if not active.
    pub fn remove_server_name(&mut self, name: &str) -> bool {
        let before = self.server_names.len();
        self.server_names.retain(|n| n != name);
        self.server_names.len() != before
    }

    /// Write one per-server config value.
    pub fn set_config_value(&mut self, server: &str, key: &str, value: &str) {
        self.config
            .entry(server.to_string())
            .or_default()
            .insert(key.to_string(), value.to_string());
    }

    /// Replace one server's enabled-tools list.
    pub fn set_enabled_tools(&mut self, server: &str, tools: Vec<String>) {
        self.tools.insert(server.to_string(), tools);
    }

    /// Add or replace a catalog entry, picking up any enabled-tools list
    /// it declares.
    pub fn insert_server(&mut self, entry: ServerConfig) {
        if let Some(list) = &entry.enabled_tools {
            self.tools.insert(entry.name.clone(), list.clone());
        }
        self.servers.insert(entry.name.clone(), entry);
    }

    /// Secrets an upstream declares but which are missing or empty.
    pub fn missing_secrets(&self, server: &ServerConfig) -> Vec<String> {
        server
            .secrets
            .iter()
            .filter(|spec| {
                self.secrets
                    .get(&spec.name)
                    .is_none_or(|value| value.is_empty())
            })
            .map(|spec| spec.name.clone())
            .collect()
    }

    /// Assemble the start context for one upstream: its config values and
    /// the resolved values of its declared secrets (keyed by env name).
    pub fn start_context(&self, server: &ServerConfig) -> StartContext {
        let config = self.config.get(&server.name).cloned().unwrap_or_default();

        let mut secrets = HashMap::new();
        for spec in &server.secrets {
            if let Some(value) = self.secrets.get(&spec.name) {
                secrets.insert(spec.env_name().to_string(), value.clone());
            }
        }

        StartContext { config, secrets }
    }
}
