//! Dynamic client registration and authorization URLs
//!
//! `mcp-add` uses these when activating a remote-oauth upstream: register
//! a client against the upstream's RFC 7591 endpoint, then hand the user
//! an authorization URL (PKCE, via the oauth2 crate).

use crate::catalog::OAuthSpec;
use crate::error::OAuthError;
use crate::Result;
use oauth2::basic::BasicClient;
use oauth2::{AuthUrl, ClientId, CsrfToken, PkceCodeChallenge, RedirectUrl, Scope};
use serde::{Deserialize, Serialize};

/// Redirect target for the local authorization flow.
pub const REDIRECT_URI: &str = "http://localhost:3000/oauth/callback";

#[derive(Debug, Serialize)]
struct RegistrationRequest<'a> {
    client_name: &'a str,
    redirect_uris: Vec<&'a str>,
    grant_types: Vec<&'a str>,
    response_types: Vec<&'a str>,
    token_endpoint_auth_method: &'a str,
}

/// RFC 7591 registration response (the fields the gateway uses).
#[derive(Debug, Clone, Deserialize)]
pub struct RegisteredClient {
    pub client_id: String,
    #[serde(default)]
    pub client_secret: Option<String>,
}

/// Register a public client against a registration endpoint.
pub async fn register_client(
    http: &reqwest::Client,
    registration_endpoint: &str,
) -> Result<RegisteredClient> {
    let request = RegistrationRequest {
        client_name: "MCP Gateway",
        redirect_uris: vec![REDIRECT_URI],
        grant_types: vec!["authorization_code", "refresh_token"],
        response_types: vec!["code"],
        token_endpoint_auth_method: "none",
    };

    let response = http
        .post(registration_endpoint)
        .json(&request)
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        return Err(OAuthError::Protocol(format!(
            "client registration failed: {} returned {}",
            registration_endpoint, status
        ))
        .into());
    }

    let client: RegisteredClient = response
        .json()
        .await
        .map_err(|e| OAuthError::Protocol(format!("bad registration response: {}", e)))?;

    Ok(client)
}

/// Build the authorization URL for a registered client.
///
/// Returns the URL and the PKCE code verifier the callback needs to
/// complete the exchange.
pub fn authorization_url(spec: &OAuthSpec, client_id: &str) -> Result<(String, String)> {
    let client = BasicClient::new(ClientId::new(client_id.to_string()))
        .set_auth_uri(
            AuthUrl::new(spec.authorization_endpoint.clone())
                .map_err(|e| OAuthError::Protocol(format!("invalid auth URL: {}", e)))?,
        )
        .set_redirect_uri(
            RedirectUrl::new(REDIRECT_URI.to_string())
                .map_err(|e| OAuthError::Protocol(format!("invalid redirect URI: {}", e)))?,
        );

    let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

    let (url, _csrf) = client
        .authorize_url(CsrfToken::new_random)
        .add_scopes(spec.scopes.iter().map(|s| Scope::new(s.clone())))
        .set_pkce_challenge(pkce_challenge)
        .url();

    Ok((url.to_string(), pkce_verifier.secret().to_string()))
}
