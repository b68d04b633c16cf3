use super::{ClientStore, RecordStore};
use crate::error::StoreError;
use crate::models::{AuthorizationRecord, RegisteredClient, TokenKind};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::{debug, error};
use redis::{AsyncCommands, Client, aio::ConnectionManager};

const KEY_PREFIX: &str = "authz";
/// Expiry for flag keys whose record has no TTL
const DEFAULT_FLAG_TTL_SECS: i64 = 86_400;

fn record_key(id: &str) -> String {
    format!("{KEY_PREFIX}:record:{id}")
}

fn index_key(kind: TokenKind, token: &str) -> String {
    format!("{KEY_PREFIX}:{}:{token}", kind.as_str())
}

fn consumed_key(id: &str) -> String {
    format!("{KEY_PREFIX}:consumed:{id}")
}

fn revoked_key(id: &str) -> String {
    format!("{KEY_PREFIX}:revoked:{id}")
}

fn client_key(client_id: &str) -> String {
    format!("{KEY_PREFIX}:client:{client_id}")
}

fn client_id_key(client_id: &str) -> String {
    format!("{KEY_PREFIX}:client-id:{client_id}")
}

/// Seconds until the last credential of the record expires, at least 1
fn ttl_secs(record: &AuthorizationRecord, now: DateTime<Utc>) -> i64 {
    (record.latest_expiry() - now).num_seconds().max(1)
}

/// Durable store on Redis.
///
/// Every credential value owns an index key created with `SET NX`, which is
/// the uniqueness constraint. Consumption and revocation are separate flag
/// keys so that the record JSON is written once and never rewritten.
/// Expired records disappear through key TTLs.
#[derive(Clone)]
pub struct RedisStore {
    _client: Client,
    conn_manager: ConnectionManager,
}

impl RedisStore {
    /// Connects to Redis and verifies the connection with a PING
    pub async fn new(redis_url: &str) -> Result<Self, String> {
        let client = match Client::open(redis_url) {
            Ok(client) => client,
            Err(err) => {
                return Err(format!("Failed to connect to Redis: {}", err));
            }
        };

        let conn_manager = match ConnectionManager::new(client.clone()).await {
            Ok(manager) => manager,
            Err(err) => {
                return Err(format!(
                    "Failed to create Redis connection manager: {}",
                    err
                ));
            }
        };

        let mut conn = conn_manager.clone();
        if let Err(err) = redis::cmd("PING").query_async::<String>(&mut conn).await {
            return Err(format!("Failed to ping Redis: {}", err));
        }

        Ok(Self {
            _client: client,
            conn_manager,
        })
    }

    pub async fn health_check(&self) -> Result<(), String> {
        let mut conn = self.conn_manager.clone();
        match redis::cmd("PING").query_async::<String>(&mut conn).await {
            Ok(_) => Ok(()),
            Err(err) => Err(format!("Redis health check failed: {}", err)),
        }
    }

    /// `SET key value NX EX ttl`, returning whether the key was created
    async fn set_nx_ex(
        conn: &mut ConnectionManager,
        key: &str,
        value: &str,
        ttl: i64,
    ) -> Result<bool, StoreError> {
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl)
            .query_async(conn)
            .await?;
        Ok(reply.is_some())
    }

    /// Remaining TTL of the record key, `None` when the record is gone
    async fn record_ttl(conn: &mut ConnectionManager, id: &str) -> Result<Option<i64>, StoreError> {
        let ttl: i64 = conn.ttl(record_key(id)).await?;
        Ok(match ttl {
            -2 => None,
            -1 => Some(DEFAULT_FLAG_TTL_SECS),
            ttl => Some(ttl.max(1)),
        })
    }

    /// Deletes index keys claimed by an insert that is being abandoned
    async fn release_claims(conn: &mut ConnectionManager, id: &str, claimed: &[String]) {
        if claimed.is_empty() {
            return;
        }
        if let Err(err) = conn.del::<_, ()>(claimed).await {
            error!("Failed to roll back partial insert of record {}: {}", id, err);
        }
    }

    async fn load(
        conn: &mut ConnectionManager,
        id: &str,
    ) -> Result<Option<AuthorizationRecord>, StoreError> {
        let (raw, consumed, revoked): (Option<String>, bool, bool) = redis::pipe()
            .get(record_key(id))
            .exists(consumed_key(id))
            .exists(revoked_key(id))
            .query_async(conn)
            .await?;

        let Some(raw) = raw else {
            return Ok(None);
        };
        let mut record: AuthorizationRecord = serde_json::from_str(&raw)?;
        record.consumed = record.consumed || consumed;
        record.revoked = record.revoked || revoked;
        Ok(Some(record))
    }
}

#[async_trait]
impl RecordStore for RedisStore {
    async fn find_by_token(
        &self,
        token: &str,
        kind: TokenKind,
    ) -> Result<Option<AuthorizationRecord>, StoreError> {
        let mut conn = self.conn_manager.clone();
        let id: Option<String> = conn.get(index_key(kind, token)).await?;
        match id {
            Some(id) => Self::load(&mut conn, &id).await,
            None => Ok(None),
        }
    }

    async fn find_by_id(&self, id: &str) -> Result<Option<AuthorizationRecord>, StoreError> {
        let mut conn = self.conn_manager.clone();
        Self::load(&mut conn, id).await
    }

    async fn insert(&self, record: &AuthorizationRecord) -> Result<(), StoreError> {
        let mut conn = self.conn_manager.clone();
        let ttl = ttl_secs(record, Utc::now());
        let serialized = serde_json::to_string(record)?;

        // index keys first, so the record only becomes readable once it owns them
        let mut claimed = Vec::new();
        for (kind, credential) in record.credentials() {
            let index = index_key(kind, &credential.value);
            match Self::set_nx_ex(&mut conn, &index, &record.id, ttl).await {
                Ok(true) => claimed.push(index),
                outcome => {
                    Self::release_claims(&mut conn, &record.id, &claimed).await;
                    outcome?;
                    return Err(StoreError::Duplicate(kind.as_str().to_string()));
                }
            }
        }

        match Self::set_nx_ex(&mut conn, &record_key(&record.id), &serialized, ttl).await {
            Ok(true) => {}
            outcome => {
                Self::release_claims(&mut conn, &record.id, &claimed).await;
                outcome?;
                return Err(StoreError::Duplicate("id".to_string()));
            }
        }

        debug!("Stored record {} with ttl {}s", record.id, ttl);
        Ok(())
    }

    async fn try_consume(&self, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn_manager.clone();
        let Some(ttl) = Self::record_ttl(&mut conn, id).await? else {
            return Ok(false);
        };
        Self::set_nx_ex(&mut conn, &consumed_key(id), "1", ttl).await
    }

    async fn release(&self, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn_manager.clone();
        let removed: i64 = conn.del(consumed_key(id)).await?;
        Ok(removed > 0)
    }

    async fn revoke(&self, id: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn_manager.clone();
        let Some(ttl) = Self::record_ttl(&mut conn, id).await? else {
            return Ok(false);
        };
        let _: () = redis::cmd("SET")
            .arg(revoked_key(id))
            .arg("1")
            .arg("EX")
            .arg(ttl)
            .query_async(&mut conn)
            .await?;
        Ok(true)
    }

    async fn remove_expired(&self, _now: DateTime<Utc>) -> Result<usize, StoreError> {
        // key TTLs already evict expired records
        Ok(0)
    }
}

#[async_trait]
impl ClientStore for RedisStore {
    async fn find(&self, client_id: &str) -> Result<Option<RegisteredClient>, StoreError> {
        let mut conn = self.conn_manager.clone();
        let raw: Option<String> = conn.get(client_key(client_id)).await?;
        match raw {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    async fn save(&self, mut client: RegisteredClient) -> Result<RegisteredClient, StoreError> {
        let mut conn = self.conn_manager.clone();

        // the first writer pins the surrogate id for this client_id
        let id_key = client_id_key(&client.client_id);
        let _: Option<String> = redis::cmd("SET")
            .arg(&id_key)
            .arg(&client.id)
            .arg("NX")
            .query_async(&mut conn)
            .await?;
        client.id = conn.get(&id_key).await?;

        if let Some(existing) = self.find(&client.client_id).await? {
            client.created_at = existing.created_at;
        }

        let serialized = serde_json::to_string(&client)?;
        conn.set::<_, _, ()>(client_key(&client.client_id), serialized)
            .await?;
        Ok(client)
    }
}
