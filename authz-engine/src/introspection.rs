//! Token introspection (RFC 7662) and revocation (RFC 7009)

use crate::error::OAuthError;
use crate::models::{AuthorizationRecord, TokenKind, format_scope};
use crate::registry::AuthenticatedClient;
use crate::store::{RecordStore, Store};
use chrono::{DateTime, Utc};
use log::{debug, info};

/// Claims reported for a token. Inactive tokens carry no claims.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Introspection {
    pub active: bool,
    pub client_id: Option<String>,
    pub sub: Option<String>,
    pub scope: Option<String>,
    pub token_type: Option<String>,
    pub exp: Option<i64>,
    pub iat: Option<i64>,
    pub nbf: Option<i64>,
    pub iss: Option<String>,
}

impl Introspection {
    pub fn inactive() -> Self {
        Self::default()
    }
}

/// Reads the record store on behalf of resource servers
#[derive(Clone)]
pub struct IntrospectionService {
    store: Store,
    issuer: Option<String>,
}

impl IntrospectionService {
    pub fn new(store: Store, issuer: Option<String>) -> Self {
        Self { store, issuer }
    }

    /// Reports whether `token` is an active access or refresh token.
    ///
    /// Unknown, expired, revoked and rotated tokens are all reported as
    /// `active: false` without further detail.
    pub async fn introspect(
        &self,
        caller: &AuthenticatedClient,
        token: &str,
        hint: Option<TokenKind>,
    ) -> Result<Introspection, OAuthError> {
        let now = Utc::now();
        let Some((record, kind)) = self.lookup(token, hint).await? else {
            debug!("Introspection by '{}' of an unknown token", caller.client_id);
            return Ok(Introspection::inactive());
        };

        if !is_active(&record, kind, now) {
            debug!(
                "Introspection by '{}' of inactive {} (record {})",
                caller.client_id,
                kind.as_str(),
                record.id
            );
            return Ok(Introspection::inactive());
        }

        let Some(credential) = record.credential(kind) else {
            return Ok(Introspection::inactive());
        };

        Ok(Introspection {
            active: true,
            client_id: Some(record.client_id.clone()),
            sub: Some(record.subject.clone()),
            scope: Some(format_scope(&record.scopes)),
            token_type: (kind == TokenKind::AccessToken).then(|| "Bearer".to_string()),
            exp: Some(credential.expires_at.timestamp()),
            iat: Some(credential.issued_at.timestamp()),
            nbf: Some(credential.issued_at.timestamp()),
            iss: self.issuer.clone(),
        })
    }

    /// Revokes the record holding `token` if it belongs to `caller`.
    ///
    /// Unknown tokens and tokens of other clients are ignored, the caller
    /// cannot tell them apart from a successful revocation.
    pub async fn revoke(
        &self,
        caller: &AuthenticatedClient,
        token: &str,
        hint: Option<TokenKind>,
    ) -> Result<(), OAuthError> {
        let Some((record, kind)) = self.lookup(token, hint).await? else {
            debug!("Revocation by '{}' of an unknown token", caller.client_id);
            return Ok(());
        };

        if record.client_id != caller.client_id {
            info!(
                "Client '{}' tried to revoke a {} of client '{}'",
                caller.client_id,
                kind.as_str(),
                record.client_id
            );
            return Ok(());
        }

        self.store.revoke(&record.id).await?;
        info!(
            "Client '{}' revoked record {} through its {}",
            caller.client_id,
            record.id,
            kind.as_str()
        );
        Ok(())
    }

    /// Tries the hinted kind first, then the remaining token kinds
    async fn lookup(
        &self,
        token: &str,
        hint: Option<TokenKind>,
    ) -> Result<Option<(AuthorizationRecord, TokenKind)>, OAuthError> {
        let mut kinds = vec![TokenKind::AccessToken, TokenKind::RefreshToken];
        if let Some(hint) = hint {
            kinds.retain(|kind| *kind != hint);
            kinds.insert(0, hint);
        }

        for kind in kinds {
            if let Some(record) = self.store.find_by_token(token, kind).await? {
                return Ok(Some((record, kind)));
            }
        }
        Ok(None)
    }
}

fn is_active(record: &AuthorizationRecord, kind: TokenKind, now: DateTime<Utc>) -> bool {
    match kind {
        // a rotated refresh token is no longer usable
        TokenKind::RefreshToken => !record.consumed && record.is_usable(kind, now),
        TokenKind::AccessToken => record.is_usable(kind, now),
        TokenKind::AuthorizationCode => false,
    }
}
