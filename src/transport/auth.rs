//! Bearer authentication
//!
//! The bearer token comes from `MCP_GATEWAY_AUTH_TOKEN` or is generated
//! at boot. The header must be exactly `Bearer <token>`; the token
//! comparison is constant-time. `/health` and in-container deployments
//! bypass the check.

use crate::secrets::SecretsProvider;
use crate::Result;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use rand::Rng;
use std::sync::Arc;

/// Operator-provided bearer token.
pub const AUTH_TOKEN_ENV: &str = "MCP_GATEWAY_AUTH_TOKEN";

/// Set to "1" when the gateway runs inside a compose network; disables
/// both the origin check and bearer auth.
pub const IN_CONTAINER_ENV: &str = "DOCKER_MCP_IN_CONTAINER";

const TOKEN_LENGTH: usize = 50;
const TOKEN_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyz0123456789";

const WWW_AUTHENTICATE_VALUE: &str = "Bearer realm=\"MCP Gateway\"";

/// Security settings for the HTTP edge, resolved once at boot.
pub struct EdgeSecurity {
    pub bearer_token: String,
    pub in_container: bool,
    /// Whether the token was generated (and should be shown to the
    /// operator) rather than taken from the environment.
    pub generated: bool,
}

impl EdgeSecurity {
    /// Resolve the two environment toggles through the secrets provider.
    pub async fn load(secrets: &Arc<dyn SecretsProvider>) -> Result<Self> {
        let in_container = secrets
            .get_secret(IN_CONTAINER_ENV)
            .await?
            .is_some_and(|v| v == "1");

        let configured = secrets
            .get_secret(AUTH_TOKEN_ENV)
            .await?
            .filter(|token| !token.is_empty());

        Ok(match configured {
            Some(bearer_token) => Self {
                bearer_token,
                in_container,
                generated: false,
            },
            None => Self {
                bearer_token: generate_token(),
                in_container,
                generated: true,
            },
        })
    }
}

/// 50 characters over `[a-z0-9]` from the thread-local CSPRNG.
pub fn generate_token() -> String {
    let mut rng = rand::rng();
    (0..TOKEN_LENGTH)
        .map(|_| TOKEN_ALPHABET[rng.random_range(0..TOKEN_ALPHABET.len())] as char)
        .collect()
}

fn constant_time_eq(a: &str, b: &str) -> bool {
    use subtle::ConstantTimeEq;
    a.as_bytes().ct_eq(b.as_bytes()).into()
}

/// Whether an Authorization header value grants access.
pub(crate) fn authorized(expected_token: &str, header_value: Option<&str>) -> bool {
    // Exactly "Bearer " (one space), case-sensitive, then the token.
    let Some(presented) = header_value.and_then(|v| v.strip_prefix("Bearer ")) else {
        return false;
    };
    constant_time_eq(expected_token, presented)
}

/// Bearer-auth middleware (inner layer).
pub async fn bearer_auth(
    State(security): State<Arc<EdgeSecurity>>,
    request: Request,
    next: Next,
) -> Response {
    if security.in_container || request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let header_value = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    if authorized(&security.bearer_token, header_value) {
        return next.run(request).await;
    }

    (
        StatusCode::UNAUTHORIZED,
        [(header::WWW_AUTHENTICATE, WWW_AUTHENTICATE_VALUE)],
        "Unauthorized",
    )
        .into_response()
}

#[cfg(test)]
#[path = "auth_test.rs"]
mod auth_test;
