//! Domain model shared by the registry, the stores and the grant engine

use crate::error::OAuthError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

/// OAuth 2.0 grant types understood by the token endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    AuthorizationCode,
    ClientCredentials,
    RefreshToken,
}

impl GrantType {
    pub fn as_str(&self) -> &'static str {
        match self {
            GrantType::AuthorizationCode => "authorization_code",
            GrantType::ClientCredentials => "client_credentials",
            GrantType::RefreshToken => "refresh_token",
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for GrantType {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "authorization_code" => Ok(GrantType::AuthorizationCode),
            "client_credentials" => Ok(GrantType::ClientCredentials),
            "refresh_token" => Ok(GrantType::RefreshToken),
            other => Err(OAuthError::UnsupportedGrantType(other.to_string())),
        }
    }
}

/// How a confidential client presents its secret
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ClientAuthenticationMethod {
    /// HTTP Basic `Authorization` header
    ClientSecretBasic,
    /// `client_id` and `client_secret` form parameters
    ClientSecretPost,
}

impl ClientAuthenticationMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ClientAuthenticationMethod::ClientSecretBasic => "client_secret_basic",
            ClientAuthenticationMethod::ClientSecretPost => "client_secret_post",
        }
    }
}

impl FromStr for ClientAuthenticationMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "client_secret_basic" => Ok(ClientAuthenticationMethod::ClientSecretBasic),
            "client_secret_post" => Ok(ClientAuthenticationMethod::ClientSecretPost),
            other => Err(format!("unknown client authentication method '{other}'")),
        }
    }
}

/// A client registered with the authorization server
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegisteredClient {
    /// Surrogate identifier, stable across upserts of the same `client_id`
    pub id: String,
    /// Business identifier presented by the client
    pub client_id: String,
    /// Encoded secret, see [`crate::secret`]
    pub client_secret_hash: String,
    pub authentication_methods: BTreeSet<ClientAuthenticationMethod>,
    pub grant_types: BTreeSet<GrantType>,
    pub redirect_uris: BTreeSet<String>,
    pub scopes: BTreeSet<String>,
    pub require_consent: bool,
    pub created_at: DateTime<Utc>,
}

impl RegisteredClient {
    pub fn allows_grant(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }

    pub fn allows_method(&self, method: ClientAuthenticationMethod) -> bool {
        self.authentication_methods.contains(&method)
    }

    pub fn has_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.contains(redirect_uri)
    }

    /// Returns the scopes of `requested` that this client may not ask for
    pub fn unknown_scopes<'a>(&self, requested: &'a BTreeSet<String>) -> Vec<&'a str> {
        requested
            .iter()
            .filter(|scope| !self.scopes.contains(*scope))
            .map(String::as_str)
            .collect()
    }
}

/// Input for [`crate::registry::ClientRegistry::save`].
///
/// `client_secret` is either a raw secret, which gets hashed on save, or an
/// already encoded value carrying an `{id}` prefix such as `{noop}secret`.
#[derive(Debug, Clone)]
pub struct ClientRegistration {
    pub client_id: String,
    pub client_secret: String,
    pub authentication_methods: BTreeSet<ClientAuthenticationMethod>,
    pub grant_types: BTreeSet<GrantType>,
    pub redirect_uris: BTreeSet<String>,
    pub scopes: BTreeSet<String>,
    pub require_consent: bool,
}

impl ClientRegistration {
    pub fn new(client_id: impl Into<String>, client_secret: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            client_secret: client_secret.into(),
            authentication_methods: BTreeSet::new(),
            grant_types: BTreeSet::new(),
            redirect_uris: BTreeSet::new(),
            scopes: BTreeSet::new(),
            require_consent: false,
        }
    }

    pub fn authentication_method(mut self, method: ClientAuthenticationMethod) -> Self {
        self.authentication_methods.insert(method);
        self
    }

    pub fn grant_type(mut self, grant_type: GrantType) -> Self {
        self.grant_types.insert(grant_type);
        self
    }

    pub fn redirect_uri(mut self, redirect_uri: impl Into<String>) -> Self {
        self.redirect_uris.insert(redirect_uri.into());
        self
    }

    pub fn scope(mut self, scope: impl Into<String>) -> Self {
        self.scopes.insert(scope.into());
        self
    }

    pub fn require_consent(mut self, require_consent: bool) -> Self {
        self.require_consent = require_consent;
        self
    }
}

/// The kinds of opaque credential an authorization record can hold
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    AccessToken,
    RefreshToken,
    AuthorizationCode,
}

impl TokenKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TokenKind::AccessToken => "access_token",
            TokenKind::RefreshToken => "refresh_token",
            TokenKind::AuthorizationCode => "code",
        }
    }

    /// Parses an RFC 7009 `token_type_hint`
    pub fn from_hint(hint: &str) -> Option<Self> {
        match hint {
            "access_token" => Some(TokenKind::AccessToken),
            "refresh_token" => Some(TokenKind::RefreshToken),
            _ => None,
        }
    }
}

/// An opaque credential value with its validity window
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IssuedCredential {
    pub value: String,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl IssuedCredential {
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now >= self.expires_at
    }
}

/// PKCE code challenge transformation (RFC 7636 section 4.2)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    #[serde(rename = "S256")]
    S256,
    #[serde(rename = "plain")]
    Plain,
}

impl FromStr for CodeChallengeMethod {
    type Err = OAuthError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "S256" => Ok(CodeChallengeMethod::S256),
            "plain" => Ok(CodeChallengeMethod::Plain),
            other => Err(OAuthError::invalid_request(format!(
                "unsupported code_challenge_method '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeChallenge {
    pub challenge: String,
    pub method: CodeChallengeMethod,
}

/// Persisted evidence that a grant was issued to a client for a subject.
///
/// Records are append-only: token values never change after insertion. The
/// only mutations are the `consumed` flag (single-use codes and rotated
/// refresh tokens) and the `revoked` flag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationRecord {
    pub id: String,
    pub client_id: String,
    /// Resource owner; equals the client id for `client_credentials`
    pub subject: String,
    pub grant_type: GrantType,
    pub scopes: BTreeSet<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<IssuedCredential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<IssuedCredential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_code: Option<IssuedCredential>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<CodeChallenge>,
    pub issued_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    #[serde(default)]
    pub consumed: bool,
    #[serde(default)]
    pub revoked: bool,
}

impl AuthorizationRecord {
    pub fn credential(&self, kind: TokenKind) -> Option<&IssuedCredential> {
        match kind {
            TokenKind::AccessToken => self.access_token.as_ref(),
            TokenKind::RefreshToken => self.refresh_token.as_ref(),
            TokenKind::AuthorizationCode => self.authorization_code.as_ref(),
        }
    }

    /// All credentials carried by this record, tagged with their kind
    pub fn credentials(&self) -> impl Iterator<Item = (TokenKind, &IssuedCredential)> {
        [
            (TokenKind::AccessToken, self.access_token.as_ref()),
            (TokenKind::RefreshToken, self.refresh_token.as_ref()),
            (TokenKind::AuthorizationCode, self.authorization_code.as_ref()),
        ]
        .into_iter()
        .filter_map(|(kind, credential)| credential.map(|c| (kind, c)))
    }

    /// The point after which no credential of this record is usable
    pub fn latest_expiry(&self) -> DateTime<Utc> {
        self.credentials()
            .map(|(_, credential)| credential.expires_at)
            .max()
            .unwrap_or(self.expires_at)
    }

    /// Whether the credential of the given kind can still be used
    pub fn is_usable(&self, kind: TokenKind, now: DateTime<Utc>) -> bool {
        !self.revoked
            && self
                .credential(kind)
                .is_some_and(|credential| !credential.is_expired(now))
    }
}

/// Parses a space-delimited scope parameter
pub fn parse_scope(scope: Option<&str>) -> BTreeSet<String> {
    scope
        .map(|s| s.split_whitespace().map(str::to_string).collect())
        .unwrap_or_default()
}

/// Formats scopes as a space-delimited scope parameter
pub fn format_scope(scopes: &BTreeSet<String>) -> String {
    scopes.iter().map(String::as_str).collect::<Vec<_>>().join(" ")
}
