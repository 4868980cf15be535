//! Secrets management
//!
//! All secret and environment-variable access in the gateway goes through
//! the `SecretsProvider` trait; nothing else calls `std::env::var()`.

mod env;

pub use env::EnvSecretsProvider;

use crate::Result;
use std::collections::HashMap;

/// Provides access to secrets and environment variables.
///
/// The trait is async so that cloud backends (Vault, AWS Secrets Manager)
/// can be dropped in without signature changes.
#[async_trait::async_trait]
pub trait SecretsProvider: Send + Sync {
    /// Get a single secret value by key. Returns None if it doesn't exist.
    async fn get_secret(&self, key: &str) -> Result<Option<String>>;

    /// Get all secrets as a map.
    async fn get_all_secrets(&self) -> Result<HashMap<String, String>>;

    /// Get a secret value with a default fallback.
    async fn get_secret_or(&self, key: &str, default: &str) -> Result<String> {
        Ok(self
            .get_secret(key)
            .await?
            .unwrap_or_else(|| default.to_string()))
    }

    /// Check whether a secret exists and is non-empty.
    async fn has_secret(&self, key: &str) -> bool {
        self.get_secret(key)
            .await
            .ok()
            .flatten()
            .is_some_and(|v| !v.is_empty())
    }
}
