//! Origin validation
//!
//! Browser-facing DNS-rebinding protection: requests carrying an Origin
//! header must come from localhost. Requests without one (CLI clients,
//! same-origin calls) pass untouched.

use super::auth::EdgeSecurity;
use axum::extract::{Request, State};
use axum::http::{header, StatusCode};
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use std::sync::Arc;
use url::Url;

const FORBIDDEN_BODY: &str = "Forbidden: Invalid Origin header\n";

/// Whether an Origin header value is acceptable: http/https scheme and a
/// hostname of exactly `localhost` or `127.0.0.1`, any port.
pub(crate) fn origin_allowed(origin: &str) -> bool {
    let Ok(url) = Url::parse(origin) else {
        return false;
    };

    if !matches!(url.scheme(), "http" | "https") {
        return false;
    }

    matches!(url.host_str(), Some("localhost") | Some("127.0.0.1"))
}

/// Origin-check middleware (outer layer).
pub async fn origin_check(
    State(security): State<Arc<EdgeSecurity>>,
    request: Request,
    next: Next,
) -> Response {
    if security.in_container || request.uri().path() == "/health" {
        return next.run(request).await;
    }

    let origin = request
        .headers()
        .get(header::ORIGIN)
        .and_then(|v| v.to_str().ok());

    match origin {
        None => next.run(request).await,
        Some(origin) if origin_allowed(origin) => next.run(request).await,
        Some(origin) => {
            tracing::warn!("rejected request with origin '{}'", origin);
            (StatusCode::FORBIDDEN, FORBIDDEN_BODY).into_response()
        }
    }
}

#[cfg(test)]
#[path = "origin_test.rs"]
mod origin_test;
