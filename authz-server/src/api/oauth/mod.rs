//! OAuth 2.0 authorization server endpoints
//!
//! - `POST /oauth2/token`: client_credentials, authorization_code and
//!   refresh_token grants (RFC 6749)
//! - `POST /oauth2/introspect`: token introspection (RFC 7662)
//! - `POST /oauth2/revoke`: token revocation (RFC 7009)
//! - `GET /oauth2/authorize`: authorization code issuance for an end user
//!   authenticated upstream
//!
//! Clients authenticate with HTTP Basic or with form credentials.

mod client_auth;
mod handlers;
pub mod models;
#[cfg(test)]
mod tests;

use crate::state::AppState;
use utoipa_axum::{router::OpenApiRouter, routes};

/// Creates OAuth 2.0 routes
pub(super) fn router() -> OpenApiRouter<AppState> {
    OpenApiRouter::new()
        .routes(routes!(handlers::token))
        .routes(routes!(handlers::introspect))
        .routes(routes!(handlers::revoke))
        .routes(routes!(handlers::authorize))
}
