//! Client authentication (RFC 6749 section 2.3.1) and request body extraction

use crate::errors::ApiError;
use authz_engine::{ClientAuthenticationMethod, ClientCredentials};
use axum::extract::{Form, FromRequest, Json, Request};
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue};
use serde::de::DeserializeOwned;
use url::form_urlencoded;

/// Extracts the client credentials of a request.
///
/// HTTP Basic wins when an `Authorization` header is present. Form
/// `client_id` and `client_secret` sent alongside it are tolerated as long
/// as they repeat the Basic credentials.
pub(crate) fn client_credentials(
    headers: &HeaderMap,
    form_client_id: Option<&str>,
    form_client_secret: Option<&str>,
) -> Result<ClientCredentials, ApiError> {
    let form_client_id = form_client_id.filter(|id| !id.is_empty());
    let form_client_secret = form_client_secret.filter(|secret| !secret.is_empty());

    if let Some(header) = headers.get(AUTHORIZATION) {
        let (client_id, client_secret) = parse_basic(header)?;
        if form_client_id.is_some_and(|id| id != client_id) {
            return Err(ApiError::invalid_request(
                "client_id does not match the authenticated client",
            ));
        }
        if form_client_secret.is_some_and(|secret| secret != client_secret) {
            return Err(ApiError::invalid_request(
                "client_secret does not match the Authorization header",
            ));
        }
        return Ok(ClientCredentials {
            client_id,
            client_secret,
            method: ClientAuthenticationMethod::ClientSecretBasic,
        });
    }

    match (form_client_id, form_client_secret) {
        (Some(client_id), Some(client_secret)) => Ok(ClientCredentials {
            client_id: client_id.to_string(),
            client_secret: client_secret.to_string(),
            method: ClientAuthenticationMethod::ClientSecretPost,
        }),
        _ => Err(ApiError::unauthorized("client authentication required")),
    }
}

fn parse_basic(header: &HeaderValue) -> Result<(String, String), ApiError> {
    let value = header
        .to_str()
        .map_err(|_| ApiError::unauthorized("malformed Authorization header"))?;
    let encoded = match value.split_once(' ') {
        Some((scheme, encoded)) if scheme.eq_ignore_ascii_case("basic") => encoded.trim(),
        _ => return Err(ApiError::unauthorized("unsupported authorization scheme")),
    };

    let decoded = STANDARD
        .decode(encoded)
        .ok()
        .and_then(|bytes| String::from_utf8(bytes).ok())
        .ok_or_else(|| ApiError::unauthorized("malformed Basic credentials"))?;
    let (client_id, client_secret) = decoded
        .split_once(':')
        .ok_or_else(|| ApiError::unauthorized("malformed Basic credentials"))?;

    Ok((form_decode(client_id), form_decode(client_secret)))
}

/// Reverses `application/x-www-form-urlencoded` escaping, which RFC 6749
/// applies to Basic credentials before base64 encoding.
fn form_decode(value: &str) -> String {
    let pair = format!("v={}", value.replace('&', "%26"));
    form_urlencoded::parse(pair.as_bytes())
        .next()
        .map(|(_, decoded)| decoded.into_owned())
        .unwrap_or_default()
}

/// Body extractor accepting form-encoded (default) or JSON payloads, with
/// rejections reported as `invalid_request`
pub struct FormOrJson<T>(pub T);

impl<S, T> FromRequest<S> for FormOrJson<T>
where
    S: Send + Sync,
    T: DeserializeOwned + Send,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let is_json = req
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|ct| ct.to_str().ok())
            .is_some_and(|ct| ct.starts_with("application/json"));

        if is_json {
            let Json(value) = Json::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::invalid_request(e.body_text()))?;
            Ok(Self(value))
        } else {
            let Form(value) = Form::<T>::from_request(req, state)
                .await
                .map_err(|e| ApiError::invalid_request(e.body_text()))?;
            Ok(Self(value))
        }
    }
}
