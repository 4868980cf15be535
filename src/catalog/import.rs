//! Registry import
//!
//! Fetches a JSON registry document over HTTP and converts it into
//! catalog entries. Accepts either a bare array of entries or an object
//! with a `servers` array (registry export format).

use super::ServerConfig;
use crate::{GatewayError, Result};
use serde_json::Value;

/// Fetch a registry document and parse it into catalog entries.
pub async fn fetch_registry(url: &str) -> Result<Vec<ServerConfig>> {
    let response = reqwest::get(url).await?;

    if !response.status().is_success() {
        return Err(GatewayError::config(format!(
            "registry fetch failed: {} returned {}",
            url,
            response.status()
        )));
    }

    let document: Value = response.json().await?;
    parse_registry_document(document)
}

/// Parse a registry document into catalog entries.
pub fn parse_registry_document(document: Value) -> Result<Vec<ServerConfig>> {
    let entries = match document {
        Value::Array(items) => items,
        Value::Object(mut obj) => match obj.remove("servers") {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(GatewayError::config(format!(
                    "registry 'servers' must be an array, got {}",
                    type_name(&other)
                )));
            }
            // A single server object is accepted as a one-entry registry.
            None => vec![Value::Object(obj)],
        },
        other => {
            return Err(GatewayError::config(format!(
                "registry document must be an array or object, got {}",
                type_name(&other)
            )));
        }
    };

    let mut servers = Vec::with_capacity(entries.len());
    for entry in entries {
        let server: ServerConfig = serde_json::from_value(entry)
            .map_err(|e| GatewayError::config(format!("invalid registry entry: {}", e)))?;
        servers.push(server);
    }

    Ok(servers)
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "bool",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
