//! Result store backends.
//!
//! The orchestrator caches the last full run's serialized results under a
//! fixed key with a TTL. Two backends are provided: an in-memory store for
//! single-process deployments and a Redis store for shared state.

use async_trait::async_trait;
use chrono::{DateTime, Duration as ChronoDuration, Utc};
use dashmap::DashMap;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;

// ═══════════════════════════════════════════════════════════════════════════════
// Store Trait
// ═══════════════════════════════════════════════════════════════════════════════

/// A key-value store with TTL semantics, as much of a cache as the
/// orchestrator needs.
#[async_trait]
pub trait ResultStore: Send + Sync {
    /// Fetch a value; `None` when absent or expired.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value with a time-to-live.
    async fn put(&self, key: &str, data: Vec<u8>, ttl: Duration) -> Result<()>;

    /// Remove a value. Removing an absent key is not an error.
    async fn forget(&self, key: &str) -> Result<()>;

    /// Backend name for logging.
    fn name(&self) -> &'static str;
}

// ═══════════════════════════════════════════════════════════════════════════════
// In-Memory Store
// ═══════════════════════════════════════════════════════════════════════════════

struct StoredEntry {
    data: Vec<u8>,
    expires_at: DateTime<Utc>,
}

impl StoredEntry {
    fn is_expired(&self) -> bool {
        Utc::now() >= self.expires_at
    }
}

/// In-process result store.
#[derive(Default)]
pub struct MemoryStore {
    entries: DashMap<String, StoredEntry>,
}

impl MemoryStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ResultStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(entry) = self.entries.get(key) {
            if entry.is_expired() {
                drop(entry);
                self.entries.remove(key);
                return Ok(None);
            }
            return Ok(Some(entry.data.clone()));
        }
        Ok(None)
    }

    async fn put(&self, key: &str, data: Vec<u8>, ttl: Duration) -> Result<()> {
        let expires_at = Utc::now()
            + ChronoDuration::from_std(ttl).unwrap_or_else(|_| ChronoDuration::seconds(300));
        self.entries.insert(
            key.to_string(),
            StoredEntry { data, expires_at },
        );
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<()> {
        self.entries.remove(key);
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Redis Store
// ═══════════════════════════════════════════════════════════════════════════════

/// Redis-backed result store, for deployments where several processes share
/// one cached snapshot.
pub struct RedisStore {
    client: redis::Client,
}

impl RedisStore {
    /// Wrap a redis client.
    pub fn new(client: redis::Client) -> Self {
        Self { client }
    }

    async fn connection(&self) -> Result<redis::aio::MultiplexedConnection> {
        Ok(self.client.get_multiplexed_async_connection().await?)
    }
}

#[async_trait]
impl ResultStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let mut conn = self.connection().await?;
        let data: Option<Vec<u8>> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(data)
    }

    async fn put(&self, key: &str, data: Vec<u8>, ttl: Duration) -> Result<()> {
        let mut conn = self.connection().await?;
        redis::cmd("SET")
            .arg(key)
            .arg(data)
            .arg("EX")
            .arg(ttl.as_secs().max(1))
            .query_async::<_, ()>(&mut conn)
            .await?;
        debug!(key, "Cached health check results");
        Ok(())
    }

    async fn forget(&self, key: &str) -> Result<()> {
        let mut conn = self.connection().await?;
        redis::cmd("DEL")
            .arg(key)
            .query_async::<_, ()>(&mut conn)
            .await?;
        Ok(())
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// Tests
// ═══════════════════════════════════════════════════════════════════════════════
