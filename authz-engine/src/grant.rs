//! Grant validation: decides whether a token request may be honoured

use crate::error::OAuthError;
use crate::models::{AuthorizationRecord, GrantType, IssuedCredential, TokenKind, parse_scope};
use crate::pkce;
use crate::registry::AuthenticatedClient;
use crate::store::{RecordStore, Store};
use chrono::Utc;
use log::{debug, warn};
use std::collections::BTreeSet;

/// Grant-specific parameters of a token request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenRequest {
    ClientCredentials {
        scope: Option<String>,
    },
    AuthorizationCode {
        code: String,
        redirect_uri: Option<String>,
        code_verifier: Option<String>,
    },
    RefreshToken {
        refresh_token: String,
        scope: Option<String>,
    },
}

impl TokenRequest {
    pub fn grant_type(&self) -> GrantType {
        match self {
            TokenRequest::ClientCredentials { .. } => GrantType::ClientCredentials,
            TokenRequest::AuthorizationCode { .. } => GrantType::AuthorizationCode,
            TokenRequest::RefreshToken { .. } => GrantType::RefreshToken,
        }
    }
}

/// Outcome of a successful validation, consumed by the token issuer
#[derive(Debug, Clone, PartialEq)]
pub struct ValidatedGrant {
    pub grant_type: GrantType,
    pub subject: String,
    pub scopes: BTreeSet<String>,
    /// Whether the issuer must mint a new refresh token
    pub issue_refresh_token: bool,
    /// Refresh token handed back unchanged when rotation is disabled
    pub carried_refresh_token: Option<IssuedCredential>,
    /// Record consumed by this grant, released again if issuance fails
    pub consumed_record: Option<String>,
}

#[derive(Clone)]
pub struct GrantValidator {
    store: Store,
    rotate_refresh_tokens: bool,
}

impl GrantValidator {
    pub fn new(store: Store, rotate_refresh_tokens: bool) -> Self {
        Self {
            store,
            rotate_refresh_tokens,
        }
    }

    pub async fn validate(
        &self,
        client: &AuthenticatedClient,
        request: &TokenRequest,
    ) -> Result<ValidatedGrant, OAuthError> {
        let grant_type = request.grant_type();
        if !client.allows_grant(grant_type) {
            warn!(
                "Client '{}' is not allowed to use grant type {}",
                client.client_id, grant_type
            );
            return Err(OAuthError::invalid_grant(format!(
                "grant type {grant_type} is not allowed for this client"
            )));
        }

        match request {
            TokenRequest::ClientCredentials { scope } => {
                self.client_credentials(client, scope.as_deref())
            }
            TokenRequest::AuthorizationCode {
                code,
                redirect_uri,
                code_verifier,
            } => {
                self.authorization_code(
                    client,
                    code,
                    redirect_uri.as_deref(),
                    code_verifier.as_deref(),
                )
                .await
            }
            TokenRequest::RefreshToken {
                refresh_token,
                scope,
            } => {
                self.refresh_token(client, refresh_token, scope.as_deref())
                    .await
            }
        }
    }

    fn client_credentials(
        &self,
        client: &AuthenticatedClient,
        scope: Option<&str>,
    ) -> Result<ValidatedGrant, OAuthError> {
        let requested = parse_scope(scope);
        let unknown = client.unknown_scopes(&requested);
        if !unknown.is_empty() {
            return Err(OAuthError::invalid_scope(format!(
                "scope not registered for client: {}",
                unknown.join(" ")
            )));
        }

        // no scope parameter means every registered scope
        let scopes = if requested.is_empty() {
            client.scopes.clone()
        } else {
            requested
        };

        Ok(ValidatedGrant {
            grant_type: GrantType::ClientCredentials,
            subject: client.client_id.clone(),
            scopes,
            issue_refresh_token: false,
            carried_refresh_token: None,
            consumed_record: None,
        })
    }

    async fn authorization_code(
        &self,
        client: &AuthenticatedClient,
        code: &str,
        redirect_uri: Option<&str>,
        code_verifier: Option<&str>,
    ) -> Result<ValidatedGrant, OAuthError> {
        let record = self
            .find_owned(client, code, TokenKind::AuthorizationCode)
            .await?;

        if record.consumed {
            warn!(
                "Replay of consumed authorization code (record {}) by client '{}'",
                record.id, client.client_id
            );
            return Err(OAuthError::invalid_grant("authorization code already used"));
        }
        if record.redirect_uri.as_deref() != redirect_uri {
            return Err(OAuthError::invalid_grant("redirect_uri mismatch"));
        }
        pkce::verify(record.code_challenge.as_ref(), code_verifier)?;

        if !self.store.try_consume(&record.id).await? {
            warn!(
                "Lost race to consume authorization code (record {}) for client '{}'",
                record.id, client.client_id
            );
            return Err(OAuthError::invalid_grant("authorization code already used"));
        }

        Ok(ValidatedGrant {
            grant_type: GrantType::AuthorizationCode,
            subject: record.subject,
            scopes: record.scopes,
            issue_refresh_token: client.allows_grant(GrantType::RefreshToken),
            carried_refresh_token: None,
            consumed_record: Some(record.id),
        })
    }

    async fn refresh_token(
        &self,
        client: &AuthenticatedClient,
        refresh_token: &str,
        scope: Option<&str>,
    ) -> Result<ValidatedGrant, OAuthError> {
        let record = self
            .find_owned(client, refresh_token, TokenKind::RefreshToken)
            .await?;

        if record.consumed {
            return Err(unknown_credential(TokenKind::RefreshToken));
        }

        let requested = parse_scope(scope);
        let scopes = if requested.is_empty() {
            record.scopes.clone()
        } else if requested.is_subset(&record.scopes) {
            requested
        } else {
            return Err(OAuthError::invalid_scope(
                "requested scope exceeds the original grant",
            ));
        };

        if !self.rotate_refresh_tokens {
            return Ok(ValidatedGrant {
                grant_type: GrantType::RefreshToken,
                subject: record.subject,
                scopes,
                issue_refresh_token: false,
                carried_refresh_token: record.refresh_token,
                consumed_record: None,
            });
        }

        if !self.store.try_consume(&record.id).await? {
            warn!(
                "Refresh token of record {} was rotated concurrently",
                record.id
            );
            return Err(unknown_credential(TokenKind::RefreshToken));
        }

        Ok(ValidatedGrant {
            grant_type: GrantType::RefreshToken,
            subject: record.subject,
            scopes,
            issue_refresh_token: true,
            carried_refresh_token: None,
            consumed_record: Some(record.id),
        })
    }

    /// Looks up a live credential and checks that it was issued to `client`.
    ///
    /// Unknown, expired, revoked and foreign credentials all report the same
    /// error so that a client cannot tell them apart.
    async fn find_owned(
        &self,
        client: &AuthenticatedClient,
        value: &str,
        kind: TokenKind,
    ) -> Result<AuthorizationRecord, OAuthError> {
        match self.store.find_by_token(value, kind).await? {
            Some(record) if record.client_id != client.client_id => {
                warn!(
                    "Client '{}' presented a {} issued to '{}'",
                    client.client_id,
                    kind.as_str(),
                    record.client_id
                );
                Err(unknown_credential(kind))
            }
            Some(record) if !record.is_usable(kind, Utc::now()) => {
                debug!("Record {} holds an expired or revoked {}", record.id, kind.as_str());
                Err(unknown_credential(kind))
            }
            Some(record) => {
                debug!("Found record {} for {}", record.id, kind.as_str());
                Ok(record)
            }
            None => Err(unknown_credential(kind)),
        }
    }
}

fn unknown_credential(kind: TokenKind) -> OAuthError {
    OAuthError::invalid_grant(format!("invalid {}", kind.as_str()))
}
