//! OAuth 2.0 request and response bodies

use authz_engine::models::format_scope;
use authz_engine::{
    AuthorizationRequest, GrantType, Introspection, IssuedTokens, OAuthError, TokenKind,
    TokenRequest,
};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};

/// Token request (RFC 6749 sections 4.1.3, 4.4.2 and 6)
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TokenForm {
    /// "authorization_code", "client_credentials" or "refresh_token"
    pub grant_type: Option<String>,
    /// Client identifier, for client_secret_post or alongside HTTP Basic
    pub client_id: Option<String>,
    /// Client secret, for client_secret_post
    pub client_secret: Option<String>,
    /// Requested scopes (space-separated)
    pub scope: Option<String>,
    /// Authorization code (authorization_code grant)
    pub code: Option<String>,
    /// Redirect URI used in the authorization request (authorization_code grant)
    pub redirect_uri: Option<String>,
    /// PKCE code verifier (authorization_code grant)
    pub code_verifier: Option<String>,
    /// Refresh token (refresh_token grant)
    pub refresh_token: Option<String>,
}

impl TokenForm {
    /// Converts the form into the grant-specific request
    pub fn into_request(self) -> Result<TokenRequest, OAuthError> {
        let grant_type = required(self.grant_type, "grant_type")?.parse::<GrantType>()?;
        Ok(match grant_type {
            GrantType::ClientCredentials => TokenRequest::ClientCredentials { scope: self.scope },
            GrantType::AuthorizationCode => TokenRequest::AuthorizationCode {
                code: required(self.code, "code")?,
                redirect_uri: self.redirect_uri,
                code_verifier: self.code_verifier,
            },
            GrantType::RefreshToken => TokenRequest::RefreshToken {
                refresh_token: required(self.refresh_token, "refresh_token")?,
                scope: self.scope,
            },
        })
    }
}

fn required(value: Option<String>, name: &str) -> Result<String, OAuthError> {
    value
        .filter(|value| !value.is_empty())
        .ok_or_else(|| OAuthError::InvalidRequest(format!("{name} is required")))
}

/// Successful token response (RFC 6749 section 5.1)
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct TokenResponse {
    /// The access token string
    pub access_token: String,
    /// Token type - always "Bearer"
    pub token_type: String,
    /// Access token lifetime in seconds
    pub expires_in: i64,
    /// Refresh token, when the grant issues one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,
    /// Granted scopes (space-separated)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

impl From<IssuedTokens> for TokenResponse {
    fn from(issued: IssuedTokens) -> Self {
        let scope = Some(format_scope(&issued.scopes)).filter(|scope| !scope.is_empty());
        Self {
            expires_in: issued.expires_in(),
            access_token: issued.access_token.value,
            token_type: "Bearer".to_string(),
            refresh_token: issued.refresh_token.map(|token| token.value),
            scope,
        }
    }
}

/// Introspection (RFC 7662) and revocation (RFC 7009) request
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct TokenLookupForm {
    /// The token to look up
    pub token: Option<String>,
    /// "access_token" or "refresh_token"; unknown hints are ignored
    pub token_type_hint: Option<String>,
    /// Client identifier, for client_secret_post or alongside HTTP Basic
    pub client_id: Option<String>,
    /// Client secret, for client_secret_post
    pub client_secret: Option<String>,
}

impl TokenLookupForm {
    pub fn token(&self) -> Result<&str, OAuthError> {
        self.token
            .as_deref()
            .filter(|token| !token.is_empty())
            .ok_or_else(|| OAuthError::InvalidRequest("token is required".to_string()))
    }

    pub fn hint(&self) -> Option<TokenKind> {
        self.token_type_hint.as_deref().and_then(TokenKind::from_hint)
    }
}

/// Introspection response (RFC 7662 section 2.2)
#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct IntrospectionResponse {
    /// Whether the token is active
    pub active: bool,
    /// Client the token was issued to
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,
    /// Resource owner, or the client itself for client_credentials
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,
    /// Token scopes (space-separated)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
    /// "Bearer" for access tokens
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    /// Expiration timestamp (Unix time)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,
    /// Issued at timestamp (Unix time)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,
    /// Not-before timestamp (Unix time)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nbf: Option<i64>,
    /// Token issuer
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub iss: Option<String>,
}

impl From<Introspection> for IntrospectionResponse {
    fn from(introspection: Introspection) -> Self {
        Self {
            active: introspection.active,
            client_id: introspection.client_id,
            sub: introspection.sub,
            scope: introspection.scope,
            token_type: introspection.token_type,
            exp: introspection.exp,
            iat: introspection.iat,
            nbf: introspection.nbf,
            iss: introspection.iss,
        }
    }
}

/// Authorization request query (RFC 6749 section 4.1.1)
#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AuthorizeQuery {
    /// Must be "code"
    #[serde(default)]
    pub response_type: String,
    /// Client identifier
    #[serde(default)]
    pub client_id: String,
    /// Redirect URI; optional when the client has exactly one registered
    pub redirect_uri: Option<String>,
    /// Requested scopes (space-separated)
    pub scope: Option<String>,
    /// Opaque value echoed back to the client
    pub state: Option<String>,
    /// PKCE code challenge
    pub code_challenge: Option<String>,
    /// PKCE code challenge method, "S256" (default) or "plain"
    pub code_challenge_method: Option<String>,
}

impl From<AuthorizeQuery> for AuthorizationRequest {
    fn from(query: AuthorizeQuery) -> Self {
        Self {
            response_type: query.response_type,
            client_id: query.client_id,
            redirect_uri: query.redirect_uri,
            scope: query.scope,
            state: query.state,
            code_challenge: query.code_challenge,
            code_challenge_method: query.code_challenge_method,
        }
    }
}
