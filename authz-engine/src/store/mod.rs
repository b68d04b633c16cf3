use crate::error::StoreError;
use crate::models::{AuthorizationRecord, RegisteredClient, TokenKind};
use chrono::{DateTime, Utc};

pub mod memory;
pub mod redis;

/// Persistence of authorization records.
///
/// Implementations enforce the uniqueness of every credential value across
/// all records: [`RecordStore::insert`] fails with [`StoreError::Duplicate`]
/// instead of overwriting. A record is visible to [`RecordStore::find_by_token`]
/// as soon as `insert` returns.
#[async_trait::async_trait]
pub trait RecordStore: Send + Sync {
    /// Looks up the record holding `token` as a credential of the given kind
    async fn find_by_token(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> Result<Option<AuthorizationRecord>, StoreError>;

    async fn find_by_id(&self, id: &str) -> Result<Option<AuthorizationRecord>, StoreError>;

    /// Persists a new record, failing if its id or any credential value is taken
    async fn insert(&self, record: &AuthorizationRecord) -> Result<(), StoreError>;

    /// Atomically flips `consumed` from false to true.
    ///
    /// Returns `false` if the record is missing or was already consumed, so
    /// that among concurrent callers exactly one observes `true`.
    async fn try_consume(&self, id: &str) -> Result<bool, StoreError>;

    /// Undoes a successful [`RecordStore::try_consume`] whose follow-up
    /// issuance failed. Returns whether the record was consumed.
    async fn release(&self, id: &str) -> Result<bool, StoreError>;

    /// Marks the record revoked. Returns whether the record exists.
    async fn revoke(&self, id: &str) -> Result<bool, StoreError>;

    /// Deletes records whose every credential expired before `now`
    async fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError>;
}

/// Persistence of registered clients, keyed by business `client_id`
#[async_trait::async_trait]
pub trait ClientStore: Send + Sync {
    async fn find(&self, client_id: &str) -> Result<Option<RegisteredClient>, StoreError>;

    /// Inserts or replaces the client with the same `client_id`.
    ///
    /// When a client already exists its surrogate `id` and `created_at` are
    /// kept; the returned value is what was stored.
    async fn save(&self, client: RegisteredClient) -> Result<RegisteredClient, StoreError>;
}

/// Storage backend selected at start-up.
///
/// The enum wraps the concrete implementations so that the rest of the crate
/// is written against one type, whichever backend the deployment picked.
#[derive(Clone)]
pub enum Store {
    /// Process-local maps, used by tests and single-node deployments
    InMemory(memory::InMemoryStore),
    /// Redis-backed durable store
    Redis(redis::RedisStore),
}

impl Store {
    pub fn in_memory() -> Self {
        Store::InMemory(memory::InMemoryStore::new())
    }

    /// Checks that the backend answers
    pub async fn health_check(&self) -> Result<(), String> {
        match self {
            Self::InMemory(store) => store.health_check().await,
            Self::Redis(store) => store.health_check().await,
        }
    }
}

#[async_trait::async_trait]
impl RecordStore for Store {
    async fn find_by_token(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> Result<Option<AuthorizationRecord>, StoreError> {
        match self {
            Self::InMemory(store) => store.find_by_token(token, kind).await,
            Self::Redis(store) => store.find_by_token(token, kind).await,
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<AuthorizationRecord>, StoreError> {
        match self {
            Self::InMemory(store) => store.find_by_id(id).await,
            Self::Redis(store) => store.find_by_id(id).await,
        }
    }

    async fn insert(&self, record: &AuthorizationRecord) -> Result<(), StoreError> {
        match self {
            Self::InMemory(store) => store.insert(record).await,
            Self::Redis(store) => store.insert(record).await,
        }
    }

    async fn try_consume(&self, id: &str) -> Result<bool, StoreError> {
        match self {
            Self::InMemory(store) => store.try_consume(id).await,
            Self::Redis(store) => store.try_consume(id).await,
        }
    }

    async fn release(&self, id: &str) -> Result<bool, StoreError> {
        match self {
            Self::InMemory(store) => store.release(id).await,
            Self::Redis(store) => store.release(id).await,
        }
    }

    async fn revoke(&self, id: &str) -> Result<bool, StoreError> {
        match self {
            Self::InMemory(store) => store.revoke(id).await,
            Self::Redis(store) => store.revoke(id).await,
        }
    }

    async fn remove_expired(&self, now: DateTime<Utc>) -> Result<usize, StoreError> {
        match self {
            Self::InMemory(store) => store.remove_expired(now).await,
            Self::Redis(store) => store.remove_expired(now).await,
        }
    }
}

#[async_trait::async_trait]
impl ClientStore for Store {
    async fn find(&self, client_id: &str) -> Result<Option<RegisteredClient>, StoreError> {
        match self {
            Self::InMemory(store) => store.find(client_id).await,
            Self::Redis(store) => store.find(client_id).await,
        }
    }

    async fn save(&self, client: RegisteredClient) -> Result<RegisteredClient, StoreError> {
        match self {
            Self::InMemory(store) => store.save(client).await,
            Self::Redis(store) => store.save(client).await,
        }
    }
}
