use super::CacheBackend;
use crate::config::LocalConfig;
use crate::core::{CacheError, Result, StoredEntry};
use async_trait::async_trait;
use parking_lot::RwLock;
use regex::Regex;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Process-local store backed by a shared map.
///
/// Expired entries are evicted lazily when read; there is no background sweep.
/// When `max_entries` is reached, expired entries are purged first and then the
/// entry closest to expiry is dropped.
#[derive(Clone)]
pub struct LocalStore {
    data: Arc<RwLock<HashMap<String, StoredEntry>>>,
    max_entries: usize,
}

impl LocalStore {
    /// Create a new local store with the given configuration
    pub fn new(config: &LocalConfig) -> Self {
        info!("Initializing local cache store with max_entries={}", config.max_entries);

        Self {
            data: Arc::new(RwLock::new(HashMap::new())),
            max_entries: config.max_entries.max(1),
        }
    }

    /// Get a value by key, evicting it if expired
    pub fn get_sync(&self, key: &str) -> Option<Vec<u8>> {
        {
            let data = self.data.read();
            match data.get(key) {
                None => return None,
                Some(entry) if !entry.is_expired() => return Some(entry.data.clone()),
                Some(_) => {}
            }
        }

        // Re-check under the write lock; a concurrent set may have refreshed it
        let mut data = self.data.write();
        if data.get(key).is_some_and(StoredEntry::is_expired) {
            debug!("Key expired: {}", key);
            data.remove(key);
            return None;
        }
        data.get(key).map(|entry| entry.data.clone())
    }

    /// Set a key-value pair
    pub fn set_sync(&self, key: &str, value: Vec<u8>, ttl_secs: u64) {
        debug!("SET key={}, size={}, ttl={}", key, value.len(), ttl_secs);

        let mut data = self.data.write();
        if !data.contains_key(key) && data.len() >= self.max_entries {
            Self::make_room(&mut data, self.max_entries);
        }
        data.insert(key.to_string(), StoredEntry::new(value, ttl_secs));
    }

    /// Delete a key
    pub fn delete_sync(&self, key: &str) -> bool {
        debug!("DELETE key={}", key);
        self.data.write().remove(key).is_some()
    }

    /// Delete every key matching a `*` pattern
    pub fn delete_pattern_sync(&self, pattern: &str) -> Result<u64> {
        let regex = pattern_to_regex(pattern)?;

        let mut data = self.data.write();
        let before = data.len();
        data.retain(|key, _| !regex.is_match(key));
        let removed = (before - data.len()) as u64;

        debug!("DELETE pattern={} removed={}", pattern, removed);
        Ok(removed)
    }

    /// Drop every entry
    pub fn clear(&self) {
        let mut data = self.data.write();
        let count = data.len();
        data.clear();
        if count > 0 {
            info!("Cleared {} entries from local cache store", count);
        }
    }

    /// Number of stored entries, including expired ones not yet evicted
    pub fn len(&self) -> usize {
        self.data.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.read().is_empty()
    }

    /// Remaining TTL for a live key
    pub fn ttl(&self, key: &str) -> Option<u64> {
        self.data
            .read()
            .get(key)
            .filter(|entry| !entry.is_expired())
            .map(StoredEntry::remaining_ttl_secs)
    }

    fn make_room(data: &mut HashMap<String, StoredEntry>, max_entries: usize) {
        data.retain(|_, entry| !entry.is_expired());
        if data.len() < max_entries {
            return;
        }

        let victim = data
            .iter()
            .min_by_key(|(_, entry)| entry.expires_at)
            .map(|(key, _)| key.clone());
        if let Some(victim) = victim {
            warn!("Local cache store full ({} entries), evicting {}", max_entries, victim);
            data.remove(&victim);
        }
    }
}

/// Translate a `*` wildcard pattern into an anchored regex; everything else is literal
fn pattern_to_regex(pattern: &str) -> Result<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");

    Regex::new(&format!("^{body}$"))
        .map_err(|e| CacheError::InvalidKey(format!("pattern '{pattern}': {e}")))
}

#[async_trait]
impl CacheBackend for LocalStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self.get_sync(key))
    }

    async fn set(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> Result<()> {
        self.set_sync(key, value, ttl_secs);
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.delete_sync(key))
    }

    async fn delete_pattern(&self, pattern: &str) -> Result<u64> {
        self.delete_pattern_sync(pattern)
    }

    fn is_ready(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "local"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn store() -> LocalStore {
        LocalStore::new(&LocalConfig::default())
    }

    #[tokio::test]
    async fn test_set_get() {
        let store = store();

        store.set("key1", b"value1".to_vec(), 60).await.unwrap();

        let result = store.get("key1").await.unwrap();
        assert_eq!(result, Some(b"value1".to_vec()));
    }

    #[tokio::test]
    async fn test_get_nonexistent() {
        let store = store();
        assert_eq!(store.get("nonexistent").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let store = store();
        store.set("key1", b"value1".to_vec(), 60).await.unwrap();

        assert!(store.delete("key1").await.unwrap());
        assert!(!store.delete("key1").await.unwrap());
        assert_eq!(store.get("key1").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiration_evicts_on_read() {
        let store = store();
        store.set("key1", b"value1".to_vec(), 1).await.unwrap();
        assert_eq!(store.get("key1").await.unwrap(), Some(b"value1".to_vec()));

        tokio::time::sleep(Duration::from_secs(2)).await;

        // Still held until someone reads it
        assert_eq!(store.len(), 1);
        assert_eq!(store.get("key1").await.unwrap(), None);
        assert_eq!(store.len(), 0);
    }

    #[tokio::test]
    async fn test_overwrite_refreshes_value() {
        let store = store();
        store.set("key1", b"old".to_vec(), 60).await.unwrap();
        store.set("key1", b"new".to_vec(), 60).await.unwrap();
        assert_eq!(store.get("key1").await.unwrap(), Some(b"new".to_vec()));
        assert_eq!(store.len(), 1);
    }

    #[tokio::test]
    async fn test_delete_pattern() {
        let store = store();
        store.set("lookup:center:1:race", b"a".to_vec(), 60).await.unwrap();
        store.set("lookup:center:22:race", b"b".to_vec(), 60).await.unwrap();
        store.set("lookup:center:1:gender", b"c".to_vec(), 60).await.unwrap();
        store.set("lookup:global:race", b"d".to_vec(), 60).await.unwrap();

        let removed = store.delete_pattern("lookup:center:*:race").await.unwrap();
        assert_eq!(removed, 2);
        assert_eq!(store.get("lookup:center:1:race").await.unwrap(), None);
        assert_eq!(store.get("lookup:center:22:race").await.unwrap(), None);
        assert!(store.get("lookup:center:1:gender").await.unwrap().is_some());
        assert!(store.get("lookup:global:race").await.unwrap().is_some());
    }

    #[test]
    fn test_pattern_treats_regex_chars_literally() {
        let regex = pattern_to_regex("a.b:*").unwrap();
        assert!(regex.is_match("a.b:anything"));
        assert!(!regex.is_match("axb:anything"));

        let exact = pattern_to_regex("plain").unwrap();
        assert!(exact.is_match("plain"));
        assert!(!exact.is_match("plainer"));
    }

    #[test]
    fn test_capacity_evicts_soonest_expiry() {
        let store = LocalStore::new(&LocalConfig { max_entries: 2 });
        store.set_sync("short", b"1".to_vec(), 5);
        store.set_sync("long", b"2".to_vec(), 500);
        store.set_sync("third", b"3".to_vec(), 50);

        assert_eq!(store.len(), 2);
        assert_eq!(store.get_sync("short"), None);
        assert!(store.get_sync("long").is_some());
        assert!(store.get_sync("third").is_some());
    }

    #[test]
    fn test_clear() {
        let store = store();
        store.set_sync("a", b"1".to_vec(), 60);
        store.set_sync("b", b"2".to_vec(), 60);
        store.clear();
        assert!(store.is_empty());
    }

    #[test]
    fn test_ttl_reports_remaining() {
        let store = store();
        store.set_sync("a", b"1".to_vec(), 60);
        let ttl = store.ttl("a").unwrap();
        assert!(ttl > 50 && ttl <= 60);
        assert_eq!(store.ttl("missing"), None);
    }

    #[test]
    fn test_usable_as_trait_object() {
        let backend: Arc<dyn CacheBackend> = Arc::new(store());
        tokio_test::block_on(async {
            backend.set("lookup:global:race", b"[]".to_vec(), 60).await.unwrap();
            assert_eq!(backend.delete_pattern("lookup:*").await.unwrap(), 1);
            assert!(backend.is_ready());
            assert_eq!(backend.name(), "local");
        });
    }
}
