//! Client registry: lookup, upsert and authentication of registered clients

use crate::error::OAuthError;
use crate::models::{ClientAuthenticationMethod, ClientRegistration, RegisteredClient};
use crate::secret::{encode_secret, verify_secret};
use crate::store::{ClientStore, Store};
use chrono::Utc;
use log::{debug, info, warn};
use moka::future::Cache as MokaCache;
use std::ops::Deref;
use std::time::Duration;
use url::Url;

/// Credentials presented by a client on a protected endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientCredentials {
    pub client_id: String,
    pub client_secret: String,
    pub method: ClientAuthenticationMethod,
}

/// A client whose credentials were verified by [`ClientRegistry::authenticate`].
///
/// The grant engine only accepts this type, so an unauthenticated client can
/// never reach token issuance.
#[derive(Debug, Clone)]
pub struct AuthenticatedClient(RegisteredClient);

impl AuthenticatedClient {
    #[cfg(test)]
    pub(crate) fn assume_authenticated(client: RegisteredClient) -> Self {
        Self(client)
    }
}

impl Deref for AuthenticatedClient {
    type Target = RegisteredClient;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

#[derive(Clone)]
pub struct ClientRegistry {
    store: Store,
    cache: Option<MokaCache<String, RegisteredClient>>,
}

impl ClientRegistry {
    /// Creates a registry in front of `store`.
    ///
    /// Lookups are cached for `cache_ttl`; a zero TTL disables the cache.
    pub fn new(store: Store, cache_ttl: Duration, cache_capacity: u64) -> Self {
        let cache = (!cache_ttl.is_zero()).then(|| {
            MokaCache::builder()
                .time_to_live(cache_ttl)
                .max_capacity(cache_capacity)
                .build()
        });
        Self { store, cache }
    }

    pub async fn find_by_client_id(
        &self,
        client_id: &str,
    ) -> Result<Option<RegisteredClient>, OAuthError> {
        if let Some(cache) = &self.cache {
            if let Some(client) = cache.get(client_id).await {
                return Ok(Some(client));
            }
        }

        let client = self.store.find(client_id).await?;
        if let (Some(cache), Some(client)) = (&self.cache, &client) {
            cache.insert(client_id.to_string(), client.clone()).await;
        }
        Ok(client)
    }

    /// Registers a client, replacing the fields of an existing client with
    /// the same `client_id` while keeping its surrogate id.
    pub async fn save(&self, registration: ClientRegistration) -> Result<RegisteredClient, OAuthError> {
        validate_registration(&registration)?;

        let mut authentication_methods = registration.authentication_methods;
        if authentication_methods.is_empty() {
            authentication_methods.insert(ClientAuthenticationMethod::ClientSecretBasic);
        }

        let client = RegisteredClient {
            id: uuid::Uuid::new_v4().to_string(),
            client_id: registration.client_id,
            client_secret_hash: encode_secret(&registration.client_secret),
            authentication_methods,
            grant_types: registration.grant_types,
            redirect_uris: registration.redirect_uris,
            scopes: registration.scopes,
            require_consent: registration.require_consent,
            created_at: Utc::now(),
        };

        let saved = self.store.save(client).await?;
        if let Some(cache) = &self.cache {
            cache.invalidate(&saved.client_id).await;
        }

        info!(
            "Saved client '{}' (id {}) with grants [{}]",
            saved.client_id,
            saved.id,
            saved
                .grant_types
                .iter()
                .map(|grant| grant.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        );
        Ok(saved)
    }

    /// Verifies client credentials.
    ///
    /// Unknown clients and wrong secrets fail with the same error so the
    /// response does not reveal which client ids exist.
    pub async fn authenticate(
        &self,
        credentials: &ClientCredentials,
    ) -> Result<AuthenticatedClient, OAuthError> {
        let Some(client) = self.find_by_client_id(&credentials.client_id).await? else {
            warn!("Authentication attempt for unknown client '{}'", credentials.client_id);
            return Err(OAuthError::authentication("invalid client credentials"));
        };

        if !verify_secret(&credentials.client_secret, &client.client_secret_hash) {
            warn!("Invalid secret presented by client '{}'", client.client_id);
            return Err(OAuthError::authentication("invalid client credentials"));
        }

        if !client.allows_method(credentials.method) {
            warn!(
                "Client '{}' used unregistered authentication method {}",
                client.client_id,
                credentials.method.as_str()
            );
            return Err(OAuthError::authentication(format!(
                "authentication method {} is not registered for this client",
                credentials.method.as_str()
            )));
        }

        debug!(
            "Authenticated client '{}' via {}",
            client.client_id,
            credentials.method.as_str()
        );
        Ok(AuthenticatedClient(client))
    }
}

fn validate_registration(registration: &ClientRegistration) -> Result<(), OAuthError> {
    if registration.client_id.trim().is_empty() {
        return Err(OAuthError::invalid_request("client_id must not be empty"));
    }
    if registration.client_secret.is_empty() {
        return Err(OAuthError::invalid_request("client_secret must not be empty"));
    }
    if registration.grant_types.is_empty() {
        return Err(OAuthError::invalid_request(
            "at least one grant type must be registered",
        ));
    }
    if let Some(invalid) = registration
        .redirect_uris
        .iter()
        .find(|uri| Url::parse(uri).is_err())
    {
        return Err(OAuthError::invalid_request(format!(
            "invalid redirect_uri '{invalid}'"
        )));
    }
    Ok(())
}
