use authz_engine::OAuthError;
use axum::response::{IntoResponse, Response};
use axum::Json;
use http::header::WWW_AUTHENTICATE;
use http::{HeaderValue, StatusCode};
use log::error;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use utoipa::ToSchema;

/// OAuth 2.0 error response body (RFC 6749 section 5.2)
#[derive(Debug, Serialize, Deserialize, ToSchema, Clone, PartialEq)]
pub struct ErrorResponse {
    /// Error code
    pub error: String,
    /// Human-readable error description
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_description: Option<String>,
}

/// Wraps an [`OAuthError`] so handlers can return it directly
#[derive(Debug)]
pub struct ApiError(pub OAuthError);

impl ApiError {
    /// Create a new invalid_request error (400)
    pub fn invalid_request<S: ToString>(detail: S) -> Self {
        Self(OAuthError::InvalidRequest(detail.to_string()))
    }

    /// Create a new invalid_client error (401)
    pub fn unauthorized<S: ToString>(detail: S) -> Self {
        Self(OAuthError::Authentication(detail.to_string()))
    }

    pub fn status_code(&self) -> StatusCode {
        match self.0 {
            OAuthError::Authentication(_) => StatusCode::UNAUTHORIZED,
            OAuthError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
            OAuthError::InvalidGrant(_)
            | OAuthError::InvalidRequest(_)
            | OAuthError::InvalidScope(_)
            | OAuthError::UnsupportedGrantType(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<OAuthError> for ApiError {
    fn from(err: OAuthError) -> Self {
        Self(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status_code = self.status_code();
        let error_description = match &self.0 {
            OAuthError::Storage(err) => {
                error!("Storage failure while serving request: {}", err);
                None
            }
            err => Some(err.detail()),
        };
        let body = ErrorResponse {
            error: self.0.error_code().to_string(),
            error_description,
        };

        let mut response = (status_code, Json(body)).into_response();
        if status_code == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                WWW_AUTHENTICATE,
                HeaderValue::from_static("Basic realm=\"oauth2\""),
            );
        }
        response
    }
}

/// Failures that abort server start-up
#[derive(Error, Debug)]
pub enum StartupError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Failed to initialize store: {0}")]
    Store(String),

    #[error("Failed to register bootstrap client: {0}")]
    Bootstrap(#[from] OAuthError),
}
