//! Bookkeeping of social events that were already handled, so a mention
//! seen twice is only turned into a job once.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use redis::aio::MultiplexedConnection;
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Debug, Error)]
pub enum DedupError {
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("Dedup store unavailable: {0}")]
    Unavailable(String),
}

#[async_trait]
pub trait DedupStore: Send + Sync {
    async fn is_handled(&self, event_id: &str) -> Result<bool, DedupError>;

    async fn mark_handled(&self, event_id: &str) -> Result<(), DedupError>;
}

/// Entries are `{prefix}{event_id}` keys holding the time they were
/// handled, expiring after the TTL.
#[derive(Clone)]
pub struct RedisDedupStore {
    conn: MultiplexedConnection,
    key_prefix: String,
    ttl: Duration,
}

impl RedisDedupStore {
    pub async fn connect(
        url: &str,
        key_prefix: impl Into<String>,
        ttl: Duration,
    ) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(url)?;
        let conn = client.get_multiplexed_async_connection().await?;
        Ok(Self {
            conn,
            key_prefix: key_prefix.into(),
            ttl,
        })
    }

    fn key(&self, event_id: &str) -> String {
        format!("{}{}", self.key_prefix, event_id)
    }
}

#[async_trait]
impl DedupStore for RedisDedupStore {
    async fn is_handled(&self, event_id: &str) -> Result<bool, DedupError> {
        let mut conn = self.conn.clone();
        let exists: bool = redis::cmd("EXISTS")
            .arg(self.key(event_id))
            .query_async(&mut conn)
            .await?;
        Ok(exists)
    }

    async fn mark_handled(&self, event_id: &str) -> Result<(), DedupError> {
        let mut conn = self.conn.clone();
        redis::cmd("SET")
            .arg(self.key(event_id))
            .arg(Utc::now().to_rfc3339())
            .arg("EX")
            .arg(self.ttl.as_secs().max(1))
            .query_async::<()>(&mut conn)
            .await?;
        Ok(())
    }
}

/// Process-local store with the same expiry semantics.
#[derive(Debug)]
pub struct MemoryDedupStore {
    entries: DashMap<String, Instant>,
    ttl: Duration,
}

impl MemoryDedupStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            ttl,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn is_handled(&self, event_id: &str) -> Result<bool, DedupError> {
        let live = self
            .entries
            .get(event_id)
            .map(|handled_at| handled_at.elapsed() < self.ttl);

        match live {
            Some(true) => Ok(true),
            Some(false) => {
                self.entries.remove(event_id);
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn mark_handled(&self, event_id: &str) -> Result<(), DedupError> {
        self.entries.insert(event_id.to_string(), Instant::now());
        Ok(())
    }
}

/// Store wrapper that never fails its caller. An unreadable store reports
/// "not handled", and a failed write is only logged.
#[derive(Clone)]
pub struct DedupTracker {
    store: Arc<dyn DedupStore>,
}

impl DedupTracker {
    pub fn new(store: Arc<dyn DedupStore>) -> Self {
        Self { store }
    }

    pub async fn is_handled(&self, event_id: &str) -> bool {
        match self.store.is_handled(event_id).await {
            Ok(handled) => handled,
            Err(e) => {
                warn!(event_id, error = %e, "Dedup lookup failed, treating event as new");
                false
            }
        }
    }

    pub async fn mark_handled(&self, event_id: &str) {
        match self.store.mark_handled(event_id).await {
            Ok(()) => debug!(event_id, "Event marked handled"),
            Err(e) => warn!(event_id, error = %e, "Failed to mark event handled"),
        }
    }
}
