//! Error types for the MCP gateway
//!
//! One thiserror hierarchy; everything converts into GatewayError for
//! unified handling at the edges.

use thiserror::Error;

/// Main error type for gateway operations
#[derive(Error, Debug)]
pub enum GatewayError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Upstream '{server}' unavailable: {message}")]
    Upstream { server: String, message: String },

    #[error("Listing {kind} on '{server}' failed: {message}")]
    CapabilityList {
        server: String,
        kind: &'static str,
        message: String,
    },

    #[error("{kind} not found: {key}")]
    NotFound { kind: &'static str, key: String },

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Origin error: {0}")]
    Origin(String),

    #[error("OAuth error: {0}")]
    OAuth(#[from] OAuthError),

    #[error("MCP error: {0}")]
    Mcp(String),

    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// OAuth supervisor and token errors
#[derive(Error, Debug)]
pub enum OAuthError {
    #[error("upstream '{0}' is not authorized")]
    Unauthorized(String),

    #[error("refresh for '{0}' timed out")]
    RefreshTimeout(String),

    #[error("no credential stored for '{0}'")]
    NoCredential(String),

    #[error("{0}")]
    Protocol(String),
}

/// Convenient result type for gateway operations
pub type Result<T> = std::result::Result<T, GatewayError>;

impl GatewayError {
    /// Create a config error
    #[inline]
    pub fn config<S: Into<String>>(msg: S) -> Self {
        GatewayError::Config(msg.into())
    }

    /// Create an upstream-unavailable error
    #[inline]
    pub fn upstream(server: impl Into<String>, msg: impl Into<String>) -> Self {
        GatewayError::Upstream {
            server: server.into(),
            message: msg.into(),
        }
    }

    /// Create a capability-list error for one kind
    #[inline]
    pub fn capability_list(
        server: impl Into<String>,
        kind: &'static str,
        msg: impl Into<String>,
    ) -> Self {
        GatewayError::CapabilityList {
            server: server.into(),
            kind,
            message: msg.into(),
        }
    }

    /// Create a typed not-found error
    #[inline]
    pub fn not_found(kind: &'static str, key: impl Into<String>) -> Self {
        GatewayError::NotFound {
            kind,
            key: key.into(),
        }
    }

    /// Create an auth error
    #[inline]
    pub fn auth<S: Into<String>>(msg: S) -> Self {
        GatewayError::Auth(msg.into())
    }

    /// Create an MCP protocol error
    #[inline]
    pub fn mcp<S: Into<String>>(msg: S) -> Self {
        GatewayError::Mcp(msg.into())
    }

    /// Create an internal error for unexpected conditions
    #[inline]
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        GatewayError::Internal(msg.into())
    }

    /// True for the errors that permanently stop an OAuth provider supervisor.
    pub fn is_unauthorized(&self) -> bool {
        matches!(self, GatewayError::OAuth(OAuthError::Unauthorized(_)))
    }
}
