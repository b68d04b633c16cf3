//! Token issuance: mints credentials and persists them as authorization records

use crate::error::{OAuthError, StoreError};
use crate::grant::ValidatedGrant;
use crate::models::{
    AuthorizationRecord, CodeChallenge, GrantType, IssuedCredential, RegisteredClient,
};
use crate::registry::AuthenticatedClient;
use crate::store::{RecordStore, Store};
use crate::token::TokenGenerator;
use chrono::{DateTime, Duration, Utc};
use log::{error, info, warn};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Attempts made when a freshly generated value collides with a stored one
pub const MAX_GENERATION_ATTEMPTS: usize = 3;

/// Lifetimes of the credentials minted by [`TokenIssuer`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenSettings {
    pub access_token_ttl: Duration,
    pub refresh_token_ttl: Duration,
    pub authorization_code_ttl: Duration,
}

impl Default for TokenSettings {
    fn default() -> Self {
        Self {
            access_token_ttl: Duration::seconds(300),
            refresh_token_ttl: Duration::seconds(3600),
            authorization_code_ttl: Duration::seconds(300),
        }
    }
}

/// Credentials returned to the client by the token endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct IssuedTokens {
    pub record_id: String,
    pub access_token: IssuedCredential,
    pub refresh_token: Option<IssuedCredential>,
    pub scopes: BTreeSet<String>,
}

impl IssuedTokens {
    /// Lifetime of the access token in seconds
    pub fn expires_in(&self) -> i64 {
        (self.access_token.expires_at - self.access_token.issued_at).num_seconds()
    }
}

/// What gets bound to an authorization code at the authorization endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct PendingCode {
    pub subject: String,
    pub scopes: BTreeSet<String>,
    pub redirect_uri: Option<String>,
    pub code_challenge: Option<CodeChallenge>,
}

#[derive(Clone)]
pub struct TokenIssuer {
    store: Store,
    generator: Arc<dyn TokenGenerator>,
    settings: TokenSettings,
}

impl TokenIssuer {
    pub fn new(store: Store, generator: Arc<dyn TokenGenerator>, settings: TokenSettings) -> Self {
        Self {
            store,
            generator,
            settings,
        }
    }

    /// Mints an access token (and a refresh token when the grant asks for
    /// one) and persists them in a new record.
    ///
    /// The record is readable by introspection once this returns. When the
    /// grant consumed a code or refresh token and nothing could be persisted,
    /// the consumption is released so the client may retry.
    pub async fn issue_token(
        &self,
        client: &AuthenticatedClient,
        grant: ValidatedGrant,
    ) -> Result<IssuedTokens, OAuthError> {
        let settings = self.settings;
        let inserted = self
            .insert_with_retry(|generator, now| {
                let access_token = credential(generator, now, settings.access_token_ttl);
                let refresh_token = grant
                    .issue_refresh_token
                    .then(|| credential(generator, now, settings.refresh_token_ttl));
                let expires_at = refresh_token
                    .as_ref()
                    .map_or(access_token.expires_at, |refresh| refresh.expires_at);

                AuthorizationRecord {
                    id: uuid::Uuid::new_v4().to_string(),
                    client_id: client.client_id.clone(),
                    subject: grant.subject.clone(),
                    grant_type: grant.grant_type,
                    scopes: grant.scopes.clone(),
                    access_token: Some(access_token),
                    refresh_token,
                    authorization_code: None,
                    redirect_uri: None,
                    code_challenge: None,
                    issued_at: now,
                    expires_at,
                    consumed: false,
                    revoked: false,
                }
            })
            .await;
        let record = match inserted {
            Ok(record) => record,
            Err(err) => {
                if let Some(id) = &grant.consumed_record {
                    self.release_consumption(id).await;
                }
                return Err(err);
            }
        };

        info!(
            "Issued access token to client '{}' via {} (record {}, {} scopes, refresh: {})",
            record.client_id,
            record.grant_type,
            record.id,
            record.scopes.len(),
            record.refresh_token.is_some() || grant.carried_refresh_token.is_some()
        );

        let AuthorizationRecord {
            id,
            access_token,
            refresh_token,
            scopes,
            ..
        } = record;
        let access_token = access_token.ok_or_else(|| {
            OAuthError::Storage(StoreError::Backend(
                "issued record lost its access token".to_string(),
            ))
        })?;

        Ok(IssuedTokens {
            record_id: id,
            access_token,
            refresh_token: refresh_token.or(grant.carried_refresh_token),
            scopes,
        })
    }

    /// Mints a single-use authorization code bound to `pending`
    pub async fn issue_authorization_code(
        &self,
        client: &RegisteredClient,
        pending: PendingCode,
    ) -> Result<AuthorizationRecord, OAuthError> {
        let ttl = self.settings.authorization_code_ttl;
        let record = self
            .insert_with_retry(|generator, now| {
                let code = credential(generator, now, ttl);
                AuthorizationRecord {
                    id: uuid::Uuid::new_v4().to_string(),
                    client_id: client.client_id.clone(),
                    subject: pending.subject.clone(),
                    grant_type: GrantType::AuthorizationCode,
                    scopes: pending.scopes.clone(),
                    access_token: None,
                    refresh_token: None,
                    expires_at: code.expires_at,
                    authorization_code: Some(code),
                    redirect_uri: pending.redirect_uri.clone(),
                    code_challenge: pending.code_challenge.clone(),
                    issued_at: now,
                    consumed: false,
                    revoked: false,
                }
            })
            .await?;

        info!(
            "Issued authorization code to client '{}' for subject '{}' (record {})",
            record.client_id, record.subject, record.id
        );
        Ok(record)
    }

    async fn release_consumption(&self, id: &str) {
        match self.store.release(id).await {
            Ok(true) => info!("Released consumption of record {id} after failed issuance"),
            Ok(false) => warn!("Record {id} was no longer consumed when releasing it"),
            Err(err) => error!("Failed to release consumption of record {id}: {err}"),
        }
    }

    /// Builds a record with fresh credentials and inserts it, regenerating
    /// on uniqueness violations up to [`MAX_GENERATION_ATTEMPTS`] times.
    async fn insert_with_retry<F>(&self, build: F) -> Result<AuthorizationRecord, OAuthError>
    where
        F: Fn(&dyn TokenGenerator, DateTime<Utc>) -> AuthorizationRecord,
    {
        let mut last_collision = None;
        for attempt in 1..=MAX_GENERATION_ATTEMPTS {
            let record = build(self.generator.as_ref(), Utc::now());
            match self.store.insert(&record).await {
                Ok(()) => return Ok(record),
                Err(StoreError::Duplicate(what)) => {
                    warn!(
                        "Generated {what} collided with a stored value (attempt {attempt}/{MAX_GENERATION_ATTEMPTS})"
                    );
                    last_collision = Some(what);
                }
                Err(err) => {
                    error!("Failed to persist authorization record: {err}");
                    return Err(err.into());
                }
            }
        }

        let what = last_collision.unwrap_or_default();
        error!("Giving up after {MAX_GENERATION_ATTEMPTS} colliding {what} values");
        Err(StoreError::Duplicate(what).into())
    }
}

fn credential(generator: &dyn TokenGenerator, now: DateTime<Utc>, ttl: Duration) -> IssuedCredential {
    IssuedCredential {
        value: generator.generate(),
        issued_at: now,
        expires_at: now + ttl,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{ClientAuthenticationMethod, TokenKind, parse_scope};
    use crate::token::SecureTokenGenerator;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Replays a fixed script of values, then counts upwards
    struct ScriptedGenerator {
        script: Mutex<Vec<String>>,
        counter: AtomicUsize,
    }

    impl ScriptedGenerator {
        fn new(script: &[&str]) -> Self {
            Self {
                script: Mutex::new(script.iter().rev().map(|s| s.to_string()).collect()),
                counter: AtomicUsize::new(0),
            }
        }
    }

    impl TokenGenerator for ScriptedGenerator {
        fn generate(&self) -> String {
            self.script.lock().unwrap().pop().unwrap_or_else(|| {
                format!("generated-{}", self.counter.fetch_add(1, Ordering::SeqCst))
            })
        }
    }

    fn client() -> AuthenticatedClient {
        AuthenticatedClient::assume_authenticated(RegisteredClient {
            id: "id-1".to_string(),
            client_id: "messaging-client".to_string(),
            client_secret_hash: "{noop}secret".to_string(),
            authentication_methods: [ClientAuthenticationMethod::ClientSecretBasic].into(),
            grant_types: [GrantType::ClientCredentials, GrantType::RefreshToken].into(),
            redirect_uris: BTreeSet::new(),
            scopes: parse_scope(Some("message.read")),
            require_consent: false,
            created_at: Utc::now(),
        })
    }

    fn grant(issue_refresh_token: bool) -> ValidatedGrant {
        ValidatedGrant {
            grant_type: GrantType::ClientCredentials,
            subject: "messaging-client".to_string(),
            scopes: parse_scope(Some("message.read")),
            issue_refresh_token,
            carried_refresh_token: None,
            consumed_record: None,
        }
    }

    #[tokio::test]
    async fn test_issue_token_is_immediately_visible() {
        let store = Store::in_memory();
        let issuer = TokenIssuer::new(
            store.clone(),
            Arc::new(SecureTokenGenerator),
            TokenSettings::default(),
        );

        let issued = issuer.issue_token(&client(), grant(false)).await.unwrap();
        assert_eq!(issued.expires_in(), 300);
        assert!(issued.refresh_token.is_none());

        let record = store
            .find_by_token(&issued.access_token.value, TokenKind::AccessToken)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(record.id, issued.record_id);
        assert_eq!(record.client_id, "messaging-client");
    }

    #[tokio::test]
    async fn test_refresh_token_extends_record_expiry() {
        let store = Store::in_memory();
        let issuer = TokenIssuer::new(
            store.clone(),
            Arc::new(SecureTokenGenerator),
            TokenSettings::default(),
        );

        let issued = issuer.issue_token(&client(), grant(true)).await.unwrap();
        let refresh = issued.refresh_token.unwrap();
        let record = store.find_by_id(&issued.record_id).await.unwrap().unwrap();
        assert_eq!(record.expires_at, refresh.expires_at);
    }

    #[tokio::test]
    async fn test_collision_is_retried() {
        let store = Store::in_memory();
        let issuer = TokenIssuer::new(
            store.clone(),
            Arc::new(ScriptedGenerator::new(&["dup", "dup", "dup"])),
            TokenSettings::default(),
        );

        let first = issuer.issue_token(&client(), grant(false)).await.unwrap();
        assert_eq!(first.access_token.value, "dup");

        // two more collisions, then a fresh value
        let second = issuer.issue_token(&client(), grant(false)).await.unwrap();
        assert_eq!(second.access_token.value, "generated-0");
    }

    #[tokio::test]
    async fn test_collision_retries_are_bounded() {
        let store = Store::in_memory();
        let script = vec!["dup"; MAX_GENERATION_ATTEMPTS + 1];
        let issuer = TokenIssuer::new(
            store.clone(),
            Arc::new(ScriptedGenerator::new(&script)),
            TokenSettings::default(),
        );

        issuer.issue_token(&client(), grant(false)).await.unwrap();
        let err = issuer.issue_token(&client(), grant(false)).await.unwrap_err();
        assert!(matches!(err, OAuthError::Storage(StoreError::Duplicate(_))));
    }

    #[tokio::test]
    async fn test_failed_issuance_releases_consumed_record() {
        let store = Store::in_memory();
        let consumed = AuthorizationRecord {
            id: "consumed".to_string(),
            client_id: "messaging-client".to_string(),
            subject: "messaging-client".to_string(),
            grant_type: GrantType::ClientCredentials,
            scopes: BTreeSet::new(),
            access_token: Some(credential(&SecureTokenGenerator, Utc::now(), Duration::seconds(60))),
            refresh_token: None,
            authorization_code: None,
            redirect_uri: None,
            code_challenge: None,
            issued_at: Utc::now(),
            expires_at: Utc::now() + Duration::seconds(60),
            consumed: false,
            revoked: false,
        };
        store.insert(&consumed).await.unwrap();
        assert!(store.try_consume("consumed").await.unwrap());

        let script = vec!["dup"; MAX_GENERATION_ATTEMPTS + 1];
        let issuer = TokenIssuer::new(
            store.clone(),
            Arc::new(ScriptedGenerator::new(&script)),
            TokenSettings::default(),
        );
        issuer.issue_token(&client(), grant(false)).await.unwrap();

        let grant = ValidatedGrant {
            consumed_record: Some("consumed".to_string()),
            ..grant(false)
        };
        let err = issuer.issue_token(&client(), grant).await.unwrap_err();
        assert!(matches!(err, OAuthError::Storage(StoreError::Duplicate(_))));
        assert!(!store.find_by_id("consumed").await.unwrap().unwrap().consumed);
    }

    #[tokio::test]
    async fn test_carried_refresh_token_is_returned() {
        let issuer = TokenIssuer::new(
            Store::in_memory(),
            Arc::new(SecureTokenGenerator),
            TokenSettings::default(),
        );
        let carried = IssuedCredential {
            value: "old-refresh".to_string(),
            issued_at: Utc::now(),
            expires_at: Utc::now() + Duration::seconds(60),
        };
        let grant = ValidatedGrant {
            carried_refresh_token: Some(carried.clone()),
            ..grant(false)
        };

        let issued = issuer.issue_token(&client(), grant).await.unwrap();
        assert_eq!(issued.refresh_token, Some(carried));
    }

    #[tokio::test]
    async fn test_issue_authorization_code() {
        let store = Store::in_memory();
        let settings = TokenSettings {
            authorization_code_ttl: Duration::seconds(60),
            ..TokenSettings::default()
        };
        let issuer = TokenIssuer::new(store.clone(), Arc::new(SecureTokenGenerator), settings);

        let record = issuer
            .issue_authorization_code(
                &client(),
                PendingCode {
                    subject: "user1".to_string(),
                    scopes: parse_scope(Some("message.read")),
                    redirect_uri: Some("http://127.0.0.1:8080/authorized".to_string()),
                    code_challenge: None,
                },
            )
            .await
            .unwrap();

        let code = record.authorization_code.as_ref().unwrap();
        assert_eq!((code.expires_at - code.issued_at).num_seconds(), 60);
        assert!(record.access_token.is_none());
        assert!(
            store
                .find_by_token(&code.value, TokenKind::AuthorizationCode)
                .await
                .unwrap()
                .is_some()
        );
    }
}
