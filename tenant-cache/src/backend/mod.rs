//! Storage backends
//!
//! - `LocalStore`: process-local map with lazy TTL eviction, always available
//! - `RedisStore`: external shared store, connected asynchronously

pub mod local;
pub mod redis_store;

use crate::core::Result;
use async_trait::async_trait;

pub use self::local::LocalStore;
pub use self::redis_store::RedisStore;

/// Operations every cache storage medium provides.
///
/// Keys are serialized [`CacheKey`](crate::core::CacheKey)s and values are
/// already-encoded bytes. Patterns use `*` as the only wildcard, matching any
/// run of characters.
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// Read a value; expired or missing entries are `None`
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Store a value for `ttl_secs` seconds
    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()>;

    /// Delete one key. Returns whether something was removed.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Delete every key matching `pattern`. Returns the number removed.
    async fn delete_pattern(&self, pattern: &str) -> Result<u64>;

    /// Whether the backend can currently serve requests
    fn is_ready(&self) -> bool;

    /// Short name used in logs
    fn name(&self) -> &'static str;
}
