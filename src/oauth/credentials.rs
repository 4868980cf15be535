//! Credential store for remote-oauth upstreams
//!
//! The store is the gateway's window onto token state: the supervisor
//! polls `status`, session startup reads `access_token`, and `refresh`
//! exchanges the refresh token against the upstream's token endpoint.

use crate::error::OAuthError;
use crate::Result;
use chrono::{DateTime, Duration, Utc};
use serde::Deserialize;
use std::collections::HashMap;
use tokio::sync::RwLock;

/// Refresh when a token is within this many seconds of expiry.
pub const REFRESH_MARGIN_SECS: i64 = 5 * 60;

/// Snapshot of one upstream's token state.
#[derive(Debug, Clone, Copy)]
pub struct TokenStatus {
    pub expires_at: Option<DateTime<Utc>>,
    pub needs_refresh: bool,
}

/// A stored OAuth credential plus what is needed to refresh it.
#[derive(Debug, Clone)]
pub struct StoredCredential {
    pub access_token: String,
    pub refresh_token: Option<String>,
    pub expires_at: Option<DateTime<Utc>>,
    pub token_endpoint: String,
    pub client_id: String,
}

#[async_trait::async_trait]
pub trait CredentialStore: Send + Sync {
    /// Token status for an upstream. Errors when the upstream was never
    /// authorized; the supervisor treats that as terminal.
    async fn status(&self, server: &str) -> Result<TokenStatus>;

    /// Current access token, if one is stored.
    async fn access_token(&self, server: &str) -> Result<Option<String>>;

    /// Exchange the refresh token for a new access token.
    async fn refresh(&self, server: &str) -> Result<()>;

    /// Store a credential (initial grant or DCR bootstrap).
    async fn store(&self, server: &str, credential: StoredCredential) -> Result<()>;

    /// Drop a credential.
    async fn remove(&self, server: &str) -> Result<()>;
}

/// RFC 6749 token endpoint response.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// In-memory credential store backed by the upstream token endpoints.
pub struct MemoryCredentialStore {
    credentials: RwLock<HashMap<String, StoredCredential>>,
    http: reqwest::Client,
}

impl MemoryCredentialStore {
    pub fn new() -> Self {
        Self {
            credentials: RwLock::new(HashMap::new()),
            http: reqwest::Client::new(),
        }
    }
}

impl Default for MemoryCredentialStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl CredentialStore for MemoryCredentialStore {
    async fn status(&self, server: &str) -> Result<TokenStatus> {
        let credentials = self.credentials.read().await;
        let credential = credentials
            .get(server)
            .ok_or_else(|| OAuthError::NoCredential(server.to_string()))?;

        let needs_refresh = credential
            .expires_at
            .is_some_and(|t| t - Utc::now() <= Duration::seconds(REFRESH_MARGIN_SECS));

        Ok(TokenStatus {
            expires_at: credential.expires_at,
            needs_refresh,
        })
    }

    async fn access_token(&self, server: &str) -> Result<Option<String>> {
        let credentials = self.credentials.read().await;
        Ok(credentials.get(server).map(|c| c.access_token.clone()))
    }

    async fn refresh(&self, server: &str) -> Result<()> {
        let (token_endpoint, client_id, refresh_token) = {
            let credentials = self.credentials.read().await;
            let credential = credentials
                .get(server)
                .ok_or_else(|| OAuthError::NoCredential(server.to_string()))?;
            let refresh_token = credential
                .refresh_token
                .clone()
                .ok_or_else(|| OAuthError::Unauthorized(server.to_string()))?;
            (
                credential.token_endpoint.clone(),
                credential.client_id.clone(),
                refresh_token,
            )
        };

        let response = self
            .http
            .post(&token_endpoint)
            .form(&[
                ("grant_type", "refresh_token"),
                ("refresh_token", refresh_token.as_str()),
                ("client_id", client_id.as_str()),
            ])
            .send()
            .await?;

        let status = response.status();
        if status == reqwest::StatusCode::UNAUTHORIZED || status == reqwest::StatusCode::BAD_REQUEST
        {
            return Err(OAuthError::Unauthorized(server.to_string()).into());
        }
        if !status.is_success() {
            return Err(OAuthError::Protocol(format!(
                "token endpoint returned {} for '{}'",
                status, server
            ))
            .into());
        }

        let token: TokenResponse = response
            .json()
            .await
            .map_err(|e| OAuthError::Protocol(format!("bad token response: {}", e)))?;

        let mut credentials = self.credentials.write().await;
        let credential = credentials
            .get_mut(server)
            .ok_or_else(|| OAuthError::NoCredential(server.to_string()))?;
        credential.access_token = token.access_token;
        if token.refresh_token.is_some() {
            credential.refresh_token = token.refresh_token;
        }
        credential.expires_at = token
            .expires_in
            .map(|seconds| Utc::now() + Duration::seconds(seconds));

        tracing::info!("refreshed OAuth token for '{}'", server);
        Ok(())
    }

    async fn store(&self, server: &str, credential: StoredCredential) -> Result<()> {
        self.credentials
            .write()
            .await
            .insert(server.to_string(), credential);
        Ok(())
    }

    async fn remove(&self, server: &str) -> Result<()> {
        self.credentials.write().await.remove(server);
        Ok(())
    }
}
