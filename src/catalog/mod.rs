//! Upstream server catalog
//!
//! The catalog is the set of MCP servers the gateway knows how to run.
//! It is loaded from a JSON file and can be extended at runtime via
//! `mcp-registry-import`.

pub mod import;

use crate::{GatewayError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// How an upstream is reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ServerKind {
    /// Container image run over stdio (`docker run --rm -i <image> ...`)
    #[default]
    StdioContainer,
    /// Remote server over streamable HTTP
    RemoteHttp,
    /// Remote server over streamable HTTP behind OAuth
    RemoteOauth,
}

impl ServerKind {
    /// Wire label used in telemetry attributes.
    pub fn as_str(&self) -> &'static str {
        match self {
            ServerKind::StdioContainer => "stdio",
            ServerKind::RemoteHttp => "remote",
            ServerKind::RemoteOauth => "remote-oauth",
        }
    }
}

/// A secret an upstream declares it needs before it can run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecretSpec {
    /// Secret name as looked up in the secrets provider
    pub name: String,

    /// Environment variable the value is exposed as (defaults to the name)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub env: Option<String>,
}

impl SecretSpec {
    pub fn env_name(&self) -> &str {
        self.env.as_deref().unwrap_or(&self.name)
    }
}

/// Tool metadata carried by catalog entries, used by `mcp-find` scoring.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolSummary {
    pub name: String,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// OAuth endpoints for a remote-oauth upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OAuthSpec {
    pub authorization_endpoint: String,
    pub token_endpoint: String,

    /// RFC 7591 dynamic client registration endpoint
    #[serde(skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,

    #[serde(default)]
    pub scopes: Vec<String>,
}

/// Immutable descriptor for one upstream MCP server.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServerConfig {
    pub name: String,

    #[serde(default)]
    pub kind: ServerKind,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,

    /// Container image (stdio-container upstreams)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,

    /// Command appended after the image
    #[serde(default)]
    pub command: Vec<String>,

    /// Static environment for the container
    #[serde(default)]
    pub env: HashMap<String, String>,

    /// Endpoint URL (remote upstreams)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Extra HTTP headers for remote upstreams
    #[serde(default)]
    pub headers: HashMap<String, String>,

    /// Secrets the server requires before it can start
    #[serde(default)]
    pub secrets: Vec<SecretSpec>,

    /// JSON schema for per-server configuration keys
    #[serde(skip_serializing_if = "Option::is_none")]
    pub config_schema: Option<Value>,

    /// Whether the server is meant to stay up between calls
    #[serde(default)]
    pub long_lived: bool,

    /// Catalog-declared tool summaries (search metadata, not live state)
    #[serde(default)]
    pub tools: Vec<ToolSummary>,

    /// Restrict federation to these tool names; absent means allow all
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled_tools: Option<Vec<String>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub oauth: Option<OAuthSpec>,
}

impl ServerConfig {
    /// Names of the secrets this server declares.
    pub fn secret_names(&self) -> Vec<&str> {
        self.secrets.iter().map(|s| s.name.as_str()).collect()
    }
}

/// Catalog of known upstream servers, keyed by name.
#[derive(Debug, Clone, Default)]
pub struct Catalog {
    entries: HashMap<String, ServerConfig>,
}

impl Catalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a catalog from a JSON file containing an array of entries.
    pub fn load_from_file(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<ServerConfig> = serde_json::from_str(&content)
            .map_err(|e| GatewayError::config(format!("invalid catalog {}: {}", path, e)))?;

        let mut catalog = Self::new();
        for entry in entries {
            catalog.add(entry);
        }

        Ok(catalog)
    }

    pub fn get(&self, name: &str) -> Option<&ServerConfig> {
        self.entries.get(name)
    }

    pub fn add(&mut self, entry: ServerConfig) {
        self.entries.insert(entry.name.clone(), entry);
    }

    pub fn remove(&mut self, name: &str) -> Option<ServerConfig> {
        self.entries.remove(name)
    }

    pub fn list(&self) -> Vec<&ServerConfig> {
        self.entries.values().collect()
    }

    pub fn into_entries(self) -> HashMap<String, ServerConfig> {
        self.entries
    }
}
