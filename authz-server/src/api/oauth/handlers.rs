//! OAuth 2.0 endpoint handlers

use crate::api::oauth::client_auth::{client_credentials, FormOrJson};
use crate::api::oauth::models::{
    AuthorizeQuery, IntrospectionResponse, TokenForm, TokenLookupForm, TokenResponse,
};
use crate::errors::{ApiError, ErrorResponse};
use crate::openapi::OAUTH_TAG;
use crate::state::AppState;
use authz_engine::AuthorizeError;
use axum::{
    extract::{Query, State},
    response::{IntoResponse, Response},
    Json,
};
use http::header::{CACHE_CONTROL, LOCATION, PRAGMA};
use http::{HeaderMap, StatusCode};
use log::{debug, warn};
use url::Url;

/// Token endpoint (RFC 6749 section 3.2)
#[utoipa::path(
    post,
    path = "/oauth2/token",
    tag = OAUTH_TAG,
    request_body(content = TokenForm, content_type = "application/x-www-form-urlencoded"),
    params(
        ("Authorization" = Option<String>, Header, description = "HTTP Basic client credentials"),
    ),
    responses(
        (status = 200, description = "Token issued", body = TokenResponse),
        (status = 400, description = "Invalid request or grant", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub(super) async fn token(
    State(state): State<AppState>,
    headers: HeaderMap,
    FormOrJson(form): FormOrJson<TokenForm>,
) -> Result<Response, ApiError> {
    let credentials = client_credentials(
        &headers,
        form.client_id.as_deref(),
        form.client_secret.as_deref(),
    )?;
    let request = form.into_request()?;
    let issued = state.service.token(&credentials, &request).await?;

    Ok((
        [(CACHE_CONTROL, "no-store"), (PRAGMA, "no-cache")],
        Json(TokenResponse::from(issued)),
    )
        .into_response())
}

/// Token introspection endpoint (RFC 7662)
#[utoipa::path(
    post,
    path = "/oauth2/introspect",
    tag = OAUTH_TAG,
    request_body(content = TokenLookupForm, content_type = "application/x-www-form-urlencoded"),
    params(
        ("Authorization" = Option<String>, Header, description = "HTTP Basic client credentials"),
    ),
    responses(
        (status = 200, description = "Introspection result", body = IntrospectionResponse),
        (status = 400, description = "Missing token", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub(super) async fn introspect(
    State(state): State<AppState>,
    headers: HeaderMap,
    FormOrJson(form): FormOrJson<TokenLookupForm>,
) -> Result<Json<IntrospectionResponse>, ApiError> {
    let credentials = client_credentials(
        &headers,
        form.client_id.as_deref(),
        form.client_secret.as_deref(),
    )?;
    let introspection = state
        .service
        .introspect(&credentials, form.token()?, form.hint())
        .await?;
    Ok(Json(introspection.into()))
}

/// Token revocation endpoint (RFC 7009)
#[utoipa::path(
    post,
    path = "/oauth2/revoke",
    tag = OAUTH_TAG,
    request_body(content = TokenLookupForm, content_type = "application/x-www-form-urlencoded"),
    params(
        ("Authorization" = Option<String>, Header, description = "HTTP Basic client credentials"),
    ),
    responses(
        (status = 200, description = "Token revoked, or unknown to the client"),
        (status = 400, description = "Missing token", body = ErrorResponse),
        (status = 401, description = "Client authentication failed", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub(super) async fn revoke(
    State(state): State<AppState>,
    headers: HeaderMap,
    FormOrJson(form): FormOrJson<TokenLookupForm>,
) -> Result<StatusCode, ApiError> {
    let credentials = client_credentials(
        &headers,
        form.client_id.as_deref(),
        form.client_secret.as_deref(),
    )?;
    state
        .service
        .revoke(&credentials, form.token()?, form.hint())
        .await?;
    Ok(StatusCode::OK)
}

/// Authorization endpoint (RFC 6749 section 3.1).
///
/// The end user must already be authenticated by a fronting proxy that sets
/// the configured subject header.
#[utoipa::path(
    get,
    path = "/oauth2/authorize",
    tag = OAUTH_TAG,
    params(AuthorizeQuery),
    responses(
        (status = 302, description = "Redirect to redirect_uri with a code or an error"),
        (status = 400, description = "Unknown client or redirect URI", body = ErrorResponse),
        (status = 401, description = "End user not authenticated", body = ErrorResponse),
        (status = 500, description = "Storage failure", body = ErrorResponse)
    )
)]
pub(super) async fn authorize(
    State(state): State<AppState>,
    headers: HeaderMap,
    Query(query): Query<AuthorizeQuery>,
) -> Response {
    let subject_header = state.config.authorize.subject_header.as_str();
    let subject = headers
        .get(subject_header)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|subject| !subject.is_empty());
    let Some(subject) = subject else {
        warn!(
            "Authorization request for client '{}' without an authenticated end user",
            query.client_id
        );
        return (
            StatusCode::UNAUTHORIZED,
            Json(ErrorResponse {
                error: "access_denied".to_string(),
                error_description: Some(format!("missing {subject_header} header")),
            }),
        )
            .into_response();
    };

    match state.service.authorize(&query.into(), subject).await {
        Ok(redirect) => {
            debug!("Authorization code issued for '{}'", subject);
            found(redirect)
        }
        Err(AuthorizeError::Redirect(redirect)) => found(redirect),
        Err(AuthorizeError::Rejected(err)) => ApiError::from(err).into_response(),
    }
}

fn found(location: Url) -> Response {
    (StatusCode::FOUND, [(LOCATION, location.to_string())]).into_response()
}
