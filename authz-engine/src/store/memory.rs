use super::{ClientStore, RecordStore};
use crate::error::StoreError;
use crate::models::{AuthorizationRecord, RegisteredClient, TokenKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Debug, Default)]
struct RecordTables {
    by_id: HashMap<String, AuthorizationRecord>,
    /// Unique index over every credential value, pointing at the record id
    by_token: HashMap<(TokenKind, String), String>,
}

impl RecordTables {
    fn unindex(&mut self, record: &AuthorizationRecord) {
        for (kind, credential) in record.credentials() {
            self.by_token.remove(&(kind, credential.value.clone()));
        }
    }
}

/// Process-local store. Cloning shares the underlying tables.
#[derive(Clone, Default)]
pub struct InMemoryStore {
    records: Arc<RwLock<RecordTables>>,
    clients: Arc<RwLock<HashMap<String, RegisteredClient>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn health_check(&self) -> Result<(), String> {
        Ok(())
    }

    /// Number of records currently held
    pub async fn record_count(&self) -> usize {
        self.records.read().await.by_id.len()
    }
}

#[async_trait]
impl RecordStore for InMemoryStore {
    async fn find_by_token(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> Result<Option<AuthorizationRecord>, StoreError> {
        let tables = self.records.read().await;
        Ok(tables
            .by_token
            .get(&(kind, token.to_string()))
            .and_then(|id| tables.by_id.get(id))
            .cloned())
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<AuthorizationRecord>, StoreError> {
        Ok(self.records.read().await.by_id.get(id).cloned())
    }

    async fn insert(&self, record: &AuthorizationRecord) -> Result<(), StoreError> {
        let mut tables = self.records.write().await;

        if tables.by_id.contains_key(&record.id) {
            return Err(StoreError::Duplicate("id".to_string()));
        }
        for (kind, credential) in record.credentials() {
            if tables
                .by_token
                .contains_key(&(kind, credential.value.clone()))
            {
                return Err(StoreError::Duplicate(kind.as_str().to_string()));
            }
        }

        for (kind, credential) in record.credentials() {
            tables
                .by_token
                .insert((kind, credential.value.clone()), record.id.clone());
        }
        tables.by_id.insert(record.id.clone(), record.clone());
        Ok(())
    }

    async fn try_consume(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.records.write().await;
        match tables.by_id.get_mut(id) {
            Some(record) if !record.consumed => {
                record.consumed = true;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.records.write().await;
        match tables.by_id.get_mut(id) {
            Some(record) if record.consumed => {
                record.consumed = false;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn revoke(&self, id: &str) -> Result<bool, StoreError> {
        let mut tables = self.records.write().await;
        match tables.by_id.get_mut(id) {
            Some(record) => {
                record.revoked = true;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    async fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let mut tables = self.records.write().await;
        let expired: Vec<AuthorizationRecord> = tables
            .by_id
            .values()
            .filter(|record| record.latest_expiry() <= now)
            .cloned()
            .collect();

        for record in &expired {
            tables.unindex(record);
            tables.by_id.remove(&record.id);
        }
        Ok(expired.len())
    }
}

#[async_trait]
impl ClientStore for InMemoryStore {
    async fn find(&self, client_id: &str) -> Result<Option<RegisteredClient>, StoreError> {
        Ok(self.clients.read().await.get(client_id).cloned())
    }

    async fn save(&self, mut client: RegisteredClient) -> Result<RegisteredClient, StoreError> {
        let mut clients = self.clients.write().await;
        if let Some(existing) = clients.get(&client.client_id) {
            client.id = existing.id.clone();
            client.created_at = existing.created_at;
        }
        clients.insert(client.client_id.clone(), client.clone());
        Ok(client)
    }
}
