//! Read-through and invalidation operations.
//!
//! [`CacheService`] is constructed once and handed to request handlers. It
//! holds the [`BackendSelector`], which in turn owns the connection state and
//! both backends. Values are encoded as JSON, so any `Serialize +
//! DeserializeOwned` type can be cached.

use crate::backend::LocalStore;
use crate::config::CacheConfig;
use crate::core::types::StatsCounters;
use crate::core::{BoxError, CacheError, CacheKey, CacheStats, Result, TenantScope};
use crate::selector::{BackendSelector, ConnectionState};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::future::Future;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Namespace used by lookup (reference) tables
pub const LOOKUP_NAMESPACE: &str = "lookup";
/// Namespace used by dashboard aggregates
pub const DASHBOARD_NAMESPACE: &str = "dashboard";
/// Lookup tables change rarely: 24 hours
pub const LOOKUP_TTL_SECS: u64 = 86_400;
/// Dashboard aggregates go stale quickly: 5 minutes
pub const DASHBOARD_TTL_SECS: u64 = 300;
/// Longest TTL written to a backend; larger values are clamped (about 30 years)
pub const MAX_TTL_SECS: u64 = 30 * 365 * 86_400;

/// Something to delete from the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// Exactly one key
    Key(CacheKey),
    /// Every tenant's key in a namespace, plus the global key
    AllTenants {
        namespace: String,
        qualifier: Option<String>,
    },
}

impl Invalidation {
    pub fn all_tenants(namespace: impl Into<String>) -> Self {
        Self::AllTenants {
            namespace: namespace.into(),
            qualifier: None,
        }
    }

    pub fn all_tenants_qualified(namespace: impl Into<String>, qualifier: impl Into<String>) -> Self {
        Self::AllTenants {
            namespace: namespace.into(),
            qualifier: Some(qualifier.into()),
        }
    }
}

/// Tenant-aware read-through cache
#[derive(Clone)]
pub struct CacheService {
    selector: Arc<BackendSelector>,
    counters: Arc<StatsCounters>,
}

impl CacheService {
    /// Build the service and start connecting to the external store, if configured.
    ///
    /// Never fails: without a usable external store the service runs on the
    /// local store alone.
    pub fn new(config: &CacheConfig) -> Self {
        let service = Self::local_only(config);
        service.selector.start(config);
        service
    }

    /// Build the service without ever contacting an external store
    pub fn local_only(config: &CacheConfig) -> Self {
        let local = Arc::new(LocalStore::new(&config.local));
        Self::with_selector(BackendSelector::new(local))
    }

    /// Wrap an existing selector
    pub fn with_selector(selector: Arc<BackendSelector>) -> Self {
        Self {
            selector,
            counters: Arc::new(StatsCounters::default()),
        }
    }

    pub fn selector(&self) -> &Arc<BackendSelector> {
        &self.selector
    }

    /// Connection state of the external store
    pub fn state(&self) -> ConnectionState {
        self.selector.state()
    }

    /// Counter snapshot
    pub fn stats(&self) -> CacheStats {
        self.counters.snapshot(self.selector.degraded_ops())
    }

    // ========================================================================
    // Read-through
    // ========================================================================

    /// Return the cached value for `(namespace, scope)` or compute and cache it.
    ///
    /// On a hit `compute` is not called. A miss, a backend failure, or an
    /// undecodable entry all run `compute`; its value is written back with
    /// `ttl_secs` (clamped to `1..=MAX_TTL_SECS`) on a best-effort basis. Only
    /// `compute` failures (as [`CacheError::Compute`]) and invalid key
    /// components ([`CacheError::InvalidKey`]) reach the caller. Failed
    /// computations are never cached.
    ///
    /// Concurrent misses on the same key are not coalesced: each caller runs
    /// `compute` and the last write wins.
    ///
    /// # Example
    /// ```no_run
    /// # use tenant_cache::{CacheConfig, CacheService, TenantScope};
    /// # async fn example(service: CacheService) -> tenant_cache::Result<()> {
    /// let races: Vec<String> = service
    ///     .get_or_compute("races", TenantScope::Global, 86_400, || async {
    ///         Ok::<_, std::io::Error>(vec!["A".to_string(), "B".to_string()])
    ///     })
    ///     .await?;
    /// # Ok(())
    /// # }
    /// ```
    pub async fn get_or_compute<T, F, Fut, E>(
        &self,
        namespace: &str,
        scope: TenantScope,
        ttl_secs: u64,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        let key = CacheKey::new(namespace, scope)?;
        self.get_or_compute_key(&key, ttl_secs, compute).await
    }

    /// [`get_or_compute`](Self::get_or_compute) for an already-built key
    pub async fn get_or_compute_key<T, F, Fut, E>(
        &self,
        key: &CacheKey,
        ttl_secs: u64,
        compute: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        let key = key.as_string();

        if let Some(value) = self.read_decoded(&key).await {
            StatsCounters::bump(&self.counters.hits);
            debug!("Cache HIT for key: {}", key);
            return Ok(value);
        }

        StatsCounters::bump(&self.counters.misses);
        StatsCounters::bump(&self.counters.computes);
        debug!("Cache MISS for key: {}", key);

        let value = match compute().await {
            Ok(value) => value,
            Err(e) => {
                StatsCounters::bump(&self.counters.compute_failures);
                return Err(CacheError::compute(e));
            }
        };

        if !self.write_encoded(&key, &value, ttl_secs).await {
            StatsCounters::bump(&self.counters.write_failures);
        }

        Ok(value)
    }

    /// Cache a lookup table, keyed `lookup:<scope>:<table>`, for 24 hours
    pub async fn cache_lookup<T, F, Fut, E>(
        &self,
        table: &str,
        scope: TenantScope,
        fetch: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        let key = CacheKey::qualified(LOOKUP_NAMESPACE, scope, table)?;
        self.get_or_compute_key(&key, LOOKUP_TTL_SECS, fetch).await
    }

    /// Cache a dashboard aggregate, keyed `dashboard:<scope>:<name>`, for 5 minutes
    pub async fn cache_dashboard<T, F, Fut, E>(
        &self,
        name: &str,
        scope: TenantScope,
        fetch: F,
    ) -> Result<T>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
        E: Into<BoxError>,
    {
        let key = CacheKey::qualified(DASHBOARD_NAMESPACE, scope, name)?;
        self.get_or_compute_key(&key, DASHBOARD_TTL_SECS, fetch).await
    }

    /// Read and decode a value without computing anything
    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        self.read_decoded(&key.as_string()).await
    }

    /// Encode and store a value. Returns `false` if it was not stored.
    pub async fn set<T: Serialize>(&self, key: &CacheKey, value: &T, ttl_secs: u64) -> bool {
        self.write_encoded(&key.as_string(), value, ttl_secs).await
    }

    async fn read_decoded<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let bytes = self.selector.read(key).await?;
        match serde_json::from_slice(&bytes) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Discarding undecodable cache entry {}: {}", key, e);
                None
            }
        }
    }

    async fn write_encoded<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) -> bool {
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!("Cannot encode value for {}: {}", key, e);
                return false;
            }
        };
        self.selector
            .write(key, bytes, ttl_secs.clamp(1, MAX_TTL_SECS))
            .await
    }

    // ========================================================================
    // Invalidation
    // ========================================================================

    /// Delete the single key for `(namespace, scope)`.
    ///
    /// Deleting an absent key succeeds. Returns `false` if the namespace is
    /// invalid or the backend failed.
    pub async fn invalidate(&self, namespace: &str, scope: TenantScope) -> bool {
        match CacheKey::new(namespace, scope) {
            Ok(key) => self.invalidate_key(&key).await,
            Err(e) => {
                warn!("Skipping invalidation: {}", e);
                false
            }
        }
    }

    /// Delete exactly one key
    pub async fn invalidate_key(&self, key: &CacheKey) -> bool {
        StatsCounters::bump(&self.counters.invalidations);
        let key = key.as_string();
        debug!("Invalidating key: {}", key);
        self.selector.remove(&key).await
    }

    /// Delete every tenant's entry in `namespace`, then the global entry.
    ///
    /// The pattern `<namespace>:center:*` also matches qualified tenant keys
    /// such as `lookup:center:7:race`, but only the unqualified global key
    /// (`lookup:global`) is deleted. Use
    /// [`invalidate_all_tenants_qualified`](Self::invalidate_all_tenants_qualified)
    /// to clear `lookup:global:race` as well.
    pub async fn invalidate_all_tenants(&self, namespace: &str) -> bool {
        self.invalidate_all(namespace, None).await
    }

    /// Delete every tenant's `<namespace>:…:<qualifier>` entry, then the global one
    pub async fn invalidate_all_tenants_qualified(&self, namespace: &str, qualifier: &str) -> bool {
        self.invalidate_all(namespace, Some(qualifier)).await
    }

    async fn invalidate_all(&self, namespace: &str, qualifier: Option<&str>) -> bool {
        StatsCounters::bump(&self.counters.invalidations);

        let (pattern, global) = match Self::all_tenant_targets(namespace, qualifier) {
            Ok(targets) => targets,
            Err(e) => {
                warn!("Skipping invalidation: {}", e);
                return false;
            }
        };

        info!("Invalidating pattern: {}", pattern);
        let removed = self.selector.remove_matching(&pattern).await;

        // Partitioned and unpartitioned entries can coexist for one namespace
        let global = global.as_string();
        info!("Also invalidating global key: {}", global);
        let global_removed = self.selector.remove(&global).await;

        removed.is_some() && global_removed
    }

    fn all_tenant_targets(namespace: &str, qualifier: Option<&str>) -> Result<(String, CacheKey)> {
        let pattern = CacheKey::all_tenants_pattern(namespace, qualifier)?;
        let global = match qualifier {
            Some(qualifier) => CacheKey::qualified(namespace, TenantScope::Global, qualifier)?,
            None => CacheKey::new(namespace, TenantScope::Global)?,
        };
        Ok((pattern, global))
    }

    /// Invalidate a lookup table for one scope, or for every tenant when `scope` is `None`
    pub async fn invalidate_lookup(&self, table: &str, scope: Option<TenantScope>) -> bool {
        match scope {
            Some(scope) => match CacheKey::qualified(LOOKUP_NAMESPACE, scope, table) {
                Ok(key) => self.invalidate_key(&key).await,
                Err(e) => {
                    warn!("Skipping lookup invalidation: {}", e);
                    false
                }
            },
            None => self.invalidate_all_tenants_qualified(LOOKUP_NAMESPACE, table).await,
        }
    }

    /// Invalidate a dashboard for one scope, or every tenant's copy when `scope` is `None`.
    ///
    /// Unlike lookups, the all-tenants form leaves the global entry alone.
    pub async fn invalidate_dashboard(&self, name: &str, scope: Option<TenantScope>) -> bool {
        match scope {
            Some(scope) => match CacheKey::qualified(DASHBOARD_NAMESPACE, scope, name) {
                Ok(key) => self.invalidate_key(&key).await,
                Err(e) => {
                    warn!("Skipping dashboard invalidation: {}", e);
                    false
                }
            },
            None => {
                StatsCounters::bump(&self.counters.invalidations);
                match CacheKey::all_tenants_pattern(DASHBOARD_NAMESPACE, Some(name)) {
                    Ok(pattern) => self.selector.remove_matching(&pattern).await.is_some(),
                    Err(e) => {
                        warn!("Skipping dashboard invalidation: {}", e);
                        false
                    }
                }
            }
        }
    }

    /// Apply one invalidation target
    pub async fn apply(&self, target: &Invalidation) -> bool {
        match target {
            Invalidation::Key(key) => self.invalidate_key(key).await,
            Invalidation::AllTenants {
                namespace,
                qualifier,
            } => self.invalidate_all(namespace, qualifier.as_deref()).await,
        }
    }

    /// Invalidate `targets`, run `write`, then invalidate `targets` again.
    ///
    /// The second pass runs whatever the write returned, and the write's result
    /// is passed through. This narrows the window in which a concurrent reader
    /// can repopulate stale data but is not atomic with the write.
    pub async fn invalidate_around<T, E, F, Fut>(
        &self,
        targets: &[Invalidation],
        write: F,
    ) -> std::result::Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<T, E>>,
    {
        for target in targets {
            self.apply(target).await;
        }

        let result = write().await;

        for target in targets {
            self.apply(target).await;
        }

        result
    }
}
