use thiserror::Error;

/// Errors raised by a storage backend
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Uniqueness constraint violated: {0}")]
    Duplicate(String),

    #[error("Failed to serialize value: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Backend error: {0}")]
    Backend(String),
}

impl From<redis::RedisError> for StoreError {
    fn from(err: redis::RedisError) -> Self {
        StoreError::Backend(err.to_string())
    }
}

/// Errors surfaced by the authorization server operations.
///
/// Each variant maps onto one of the RFC 6749 error codes, see
/// [`OAuthError::error_code`].
#[derive(Error, Debug)]
pub enum OAuthError {
    #[error("Client authentication failed: {0}")]
    Authentication(String),

    #[error("Invalid grant: {0}")]
    InvalidGrant(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid scope: {0}")]
    InvalidScope(String),

    #[error("Unsupported grant type: {0}")]
    UnsupportedGrantType(String),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl OAuthError {
    /// The `error` value of the RFC 6749 section 5.2 error response
    pub fn error_code(&self) -> &'static str {
        match self {
            OAuthError::Authentication(_) => "invalid_client",
            OAuthError::InvalidGrant(_) => "invalid_grant",
            OAuthError::InvalidRequest(_) => "invalid_request",
            OAuthError::InvalidScope(_) => "invalid_scope",
            OAuthError::UnsupportedGrantType(_) => "unsupported_grant_type",
            OAuthError::Storage(_) => "server_error",
        }
    }

    /// The message carried by the error, without the error code
    pub fn detail(&self) -> String {
        match self {
            OAuthError::Authentication(detail)
            | OAuthError::InvalidGrant(detail)
            | OAuthError::InvalidRequest(detail)
            | OAuthError::InvalidScope(detail)
            | OAuthError::UnsupportedGrantType(detail) => detail.clone(),
            OAuthError::Storage(err) => err.to_string(),
        }
    }

    pub(crate) fn authentication<S: ToString>(detail: S) -> Self {
        OAuthError::Authentication(detail.to_string())
    }

    pub(crate) fn invalid_grant<S: ToString>(detail: S) -> Self {
        OAuthError::InvalidGrant(detail.to_string())
    }

    pub(crate) fn invalid_request<S: ToString>(detail: S) -> Self {
        OAuthError::InvalidRequest(detail.to_string())
    }

    pub(crate) fn invalid_scope<S: ToString>(detail: S) -> Self {
        OAuthError::InvalidScope(detail.to_string())
    }
}
