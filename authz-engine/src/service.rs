//! Entry point used by the HTTP layer: wires registry, validator, issuer and
//! introspection together over one store.

use crate::error::OAuthError;
use crate::grant::{GrantValidator, TokenRequest};
use crate::introspection::{Introspection, IntrospectionService};
use crate::issuer::{IssuedTokens, PendingCode, TokenIssuer, TokenSettings};
use crate::models::{GrantType, RegisteredClient, TokenKind, parse_scope};
use crate::pkce;
use crate::registry::{ClientCredentials, ClientRegistry};
use crate::store::Store;
use crate::token::{SecureTokenGenerator, TokenGenerator};
use log::{info, warn};
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// Tunables of [`AuthorizationService`]
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    pub tokens: TokenSettings,
    pub rotate_refresh_tokens: bool,
    /// Reported as `iss` by introspection
    pub issuer: Option<String>,
    pub client_cache_ttl: Duration,
    pub client_cache_capacity: u64,
}

impl Default for ServiceSettings {
    fn default() -> Self {
        Self {
            tokens: TokenSettings::default(),
            rotate_refresh_tokens: true,
            issuer: None,
            client_cache_ttl: Duration::from_secs(30),
            client_cache_capacity: 1024,
        }
    }
}

/// Query parameters of an authorization request (RFC 6749 section 4.1.1)
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AuthorizationRequest {
    pub response_type: String,
    pub client_id: String,
    pub redirect_uri: Option<String>,
    pub scope: Option<String>,
    pub state: Option<String>,
    pub code_challenge: Option<String>,
    pub code_challenge_method: Option<String>,
}

/// Failure of an authorization request
#[derive(Debug)]
pub enum AuthorizeError {
    /// The client or its redirect URI could not be established. The user
    /// agent must not be redirected.
    Rejected(OAuthError),
    /// Error response to deliver through the client's redirect URI
    Redirect(Url),
}

#[derive(Clone)]
pub struct AuthorizationService {
    store: Store,
    registry: ClientRegistry,
    validator: GrantValidator,
    issuer: TokenIssuer,
    introspection: IntrospectionService,
}

impl AuthorizationService {
    pub fn new(store: Store, settings: ServiceSettings) -> Self {
        Self::with_generator(store, Arc::new(SecureTokenGenerator), settings)
    }

    pub fn with_generator(
        store: Store,
        generator: Arc<dyn TokenGenerator>,
        settings: ServiceSettings,
    ) -> Self {
        Self {
            registry: ClientRegistry::new(
                store.clone(),
                settings.client_cache_ttl,
                settings.client_cache_capacity,
            ),
            validator: GrantValidator::new(store.clone(), settings.rotate_refresh_tokens),
            issuer: TokenIssuer::new(store.clone(), generator, settings.tokens),
            introspection: IntrospectionService::new(store.clone(), settings.issuer),
            store,
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    pub fn registry(&self) -> &ClientRegistry {
        &self.registry
    }

    /// Handles a token request: authenticates the client, validates the grant
    /// and issues a fresh access token.
    pub async fn token(
        &self,
        credentials: &ClientCredentials,
        request: &TokenRequest,
    ) -> Result<IssuedTokens, OAuthError> {
        let client = self.registry.authenticate(credentials).await?;
        let grant = self.validator.validate(&client, request).await?;
        self.issuer.issue_token(&client, grant).await
    }

    pub async fn introspect(
        &self,
        credentials: &ClientCredentials,
        token: &str,
        hint: Option<TokenKind>,
    ) -> Result<Introspection, OAuthError> {
        let caller = self.registry.authenticate(credentials).await?;
        self.introspection.introspect(&caller, token, hint).await
    }

    pub async fn revoke(
        &self,
        credentials: &ClientCredentials,
        token: &str,
        hint: Option<TokenKind>,
    ) -> Result<(), OAuthError> {
        let caller = self.registry.authenticate(credentials).await?;
        self.introspection.revoke(&caller, token, hint).await
    }

    /// Handles an authorization request of an end user already authenticated
    /// as `subject`, returning the redirect carrying the authorization code.
    pub async fn authorize(
        &self,
        request: &AuthorizationRequest,
        subject: &str,
    ) -> Result<Url, AuthorizeError> {
        let client = self
            .registry
            .find_by_client_id(&request.client_id)
            .await
            .map_err(AuthorizeError::Rejected)?
            .ok_or_else(|| {
                warn!(
                    "Authorization request for unknown client '{}'",
                    request.client_id
                );
                AuthorizeError::Rejected(OAuthError::invalid_request("unknown client_id"))
            })?;

        let redirect_uri = resolve_redirect_uri(&client, request.redirect_uri.as_deref())
            .map_err(AuthorizeError::Rejected)?;
        let redirect = |error: &str, description: &str| {
            AuthorizeError::Redirect(with_params(
                redirect_uri.clone(),
                [
                    ("error", Some(error)),
                    ("error_description", Some(description)),
                    ("state", request.state.as_deref()),
                ],
            ))
        };

        if request.response_type != "code" {
            return Err(redirect(
                "unsupported_response_type",
                "only response_type=code is supported",
            ));
        }
        if !client.allows_grant(GrantType::AuthorizationCode) {
            return Err(redirect(
                "unauthorized_client",
                "client may not use the authorization_code grant",
            ));
        }

        let scopes = parse_scope(request.scope.as_deref());
        let unknown = client.unknown_scopes(&scopes);
        if !unknown.is_empty() {
            return Err(redirect(
                "invalid_scope",
                &format!("scope not registered for client: {}", unknown.join(" ")),
            ));
        }

        let code_challenge = pkce::code_challenge(
            request.code_challenge.as_deref(),
            request.code_challenge_method.as_deref(),
        )
        .map_err(|err| redirect(err.error_code(), &err.detail()))?;

        if client.require_consent {
            info!(
                "Client '{}' requires consent; treating the request of '{}' as approved upstream",
                client.client_id, subject
            );
        }

        let record = self
            .issuer
            .issue_authorization_code(
                &client,
                PendingCode {
                    subject: subject.to_string(),
                    scopes,
                    redirect_uri: request.redirect_uri.clone(),
                    code_challenge,
                },
            )
            .await
            .map_err(|err| redirect(err.error_code(), "authorization code could not be issued"))?;

        let code = record
            .authorization_code
            .as_ref()
            .map(|code| code.value.as_str());
        Ok(with_params(
            redirect_uri.clone(),
            [("code", code), ("state", request.state.as_deref())],
        ))
    }
}

/// Picks the redirect URI of an authorization request.
///
/// A supplied URI must match a registered one exactly. Without one, the client
/// must have exactly one registered URI.
fn resolve_redirect_uri(
    client: &RegisteredClient,
    requested: Option<&str>,
) -> Result<Url, OAuthError> {
    let uri = match requested {
        Some(uri) if client.has_redirect_uri(uri) => uri,
        Some(uri) => {
            warn!(
                "Unregistered redirect_uri '{}' for client '{}'",
                uri, client.client_id
            );
            return Err(OAuthError::invalid_request("unregistered redirect_uri"));
        }
        None => {
            let mut registered = client.redirect_uris.iter();
            match (registered.next(), registered.next()) {
                (Some(only), None) => only.as_str(),
                _ => return Err(OAuthError::invalid_request("redirect_uri is required")),
            }
        }
    };
    Url::parse(uri).map_err(|err| OAuthError::invalid_request(format!("invalid redirect_uri: {err}")))
}

fn with_params<'a>(
    mut url: Url,
    params: impl IntoIterator<Item = (&'a str, Option<&'a str>)>,
) -> Url {
    {
        let mut pairs = url.query_pairs_mut();
        for (name, value) in params {
            if let Some(value) = value {
                pairs.append_pair(name, value);
            }
        }
    }
    url
}
