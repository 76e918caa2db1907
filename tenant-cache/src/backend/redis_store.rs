use super::CacheBackend;
use crate::config::ExternalConfig;
use crate::core::{CacheError, Result};
use async_trait::async_trait;
use redis::AsyncCommands;
use redis::aio::MultiplexedConnection;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info};

/// External shared store speaking the Redis protocol.
///
/// Expiry is delegated to the server (`SETEX`). Pattern deletes walk the
/// keyspace with `SCAN MATCH` and delete each batch. Every call is bounded by
/// the configured command timeout.
#[derive(Clone)]
pub struct RedisStore {
    conn: MultiplexedConnection,
    command_timeout: Duration,
    scan_count: usize,
}

impl RedisStore {
    /// Open a connection and perform the `PING` handshake.
    ///
    /// Fails with `BackendUnavailable` on a bad URL, refused connection or
    /// rejected handshake, and with `Timeout` when the handshake exceeds
    /// `connect_timeout`. After that, only connection-level failures are
    /// reported as `BackendUnavailable`; error replies become `Rejected`.
    pub async fn connect(url: &str, config: &ExternalConfig) -> Result<Self> {
        // Any failure before the handshake completes means no usable store
        let unavailable = |e: redis::RedisError| CacheError::BackendUnavailable(e.to_string());
        let client = redis::Client::open(url).map_err(unavailable)?;

        let conn = timeout(config.connect_timeout(), async {
            let mut conn = client
                .get_multiplexed_async_connection()
                .await
                .map_err(unavailable)?;
            let pong: String = redis::cmd("PING")
                .query_async(&mut conn)
                .await
                .map_err(unavailable)?;
            debug!("Redis handshake reply: {}", pong);
            Ok::<_, CacheError>(conn)
        })
        .await
        .map_err(|_| CacheError::Timeout("connect"))??;

        info!("Redis cache backend connected");

        Ok(Self {
            conn,
            command_timeout: config.command_timeout(),
            scan_count: config.scan_count.max(1),
        })
    }

    /// Run one command against a fresh handle to the shared connection
    async fn bounded<T, F, Fut>(&self, op: &'static str, f: F) -> Result<T>
    where
        F: FnOnce(MultiplexedConnection) -> Fut,
        Fut: Future<Output = redis::RedisResult<T>>,
    {
        match timeout(self.command_timeout, f(self.conn.clone())).await {
            Ok(result) => result.map_err(CacheError::from),
            Err(_) => Err(CacheError::Timeout(op)),
        }
    }
}

#[async_trait]
impl CacheBackend for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.bounded("get", |mut conn| async move { conn.get(key).await })
            .await
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        self.bounded("set", |mut conn| async move {
            conn.set_ex(key, value, ttl_secs).await
        })
        .await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let removed: u64 = self
            .bounded("delete", |mut conn| async move { conn.del(key).await })
            .await?;
        Ok(removed > 0)
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        let mut cursor: u64 = 0;
        let mut total_deleted = 0;

        loop {
            let (next_cursor, keys): (u64, Vec<String>) = self
                .bounded("scan", |mut conn| async move {
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(self.scan_count)
                        .query_async(&mut conn)
                        .await
                })
                .await?;

            if !keys.is_empty() {
                let deleted: u64 = self
                    .bounded("delete", |mut conn| async move { conn.del(&keys).await })
                    .await?;
                total_deleted += deleted;
            }

            cursor = next_cursor;
            if cursor == 0 {
                break;
            }
        }

        debug!("DELETE pattern={} removed={}", pattern, total_deleted);
        Ok(total_deleted)
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "redis"
    }
}
