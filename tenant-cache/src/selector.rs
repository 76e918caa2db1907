//! Backend selection and external store lifecycle.
//!
//! The selector owns the connection state of the external store and both
//! backend handles. It is also the one place where backend errors are turned
//! into degrade decisions: callers above it only ever see hits, misses and
//! success flags.
//!
//! ```text
//! Disabled ──start──▶ Connecting ──handshake ok──▶ Ready
//!                         │                          │
//!                         └──fail/timeout──▶ Unavailable ◀──connection error
//! ```
//!
//! `Unavailable` is terminal; there is no reconnection. A command the backend
//! rejects (an error reply) is absorbed like any other failure but leaves the
//! state alone.

use crate::backend::{CacheBackend, LocalStore, RedisStore};
use crate::config::CacheConfig;
use crate::core::CacheError;
use std::fmt;
use std::sync::atomic::{AtomicU8, AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use tracing::{debug, info, warn};

/// Connection state of the external shared store
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum ConnectionState {
    /// No connection attempted
    Disabled = 0,
    /// Handshake in flight; traffic goes to the local store
    Connecting = 1,
    /// External store is authoritative
    Ready = 2,
    /// Permanently fell back to the local store
    Unavailable = 3,
}

impl ConnectionState {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Connecting,
            2 => Self::Ready,
            3 => Self::Unavailable,
            _ => Self::Disabled,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disabled => "disabled",
            Self::Connecting => "connecting",
            Self::Ready => "ready",
            Self::Unavailable => "unavailable",
        }
    }
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of routing one operation
struct Route {
    backend: Arc<dyn CacheBackend>,
    external: bool,
}

/// Chooses the authoritative backend per operation
pub struct BackendSelector {
    state: AtomicU8,
    local: Arc<LocalStore>,
    external: OnceLock<Arc<dyn CacheBackend>>,
    degraded_ops: AtomicU64,
}

impl BackendSelector {
    /// Create a selector in the `Disabled` state
    pub fn new(local: Arc<LocalStore>) -> Arc<Self> {
        Arc::new(Self {
            state: AtomicU8::new(ConnectionState::Disabled as u8),
            local,
            external: OnceLock::new(),
            degraded_ops: AtomicU64::new(0),
        })
    }

    /// Begin connecting to the external store without blocking.
    ///
    /// A missing or unparsable URL, or the absence of a Tokio runtime, leaves
    /// the selector `Disabled`.
    pub fn start(self: &Arc<Self>, config: &CacheConfig) {
        let Some(url) = config.external.url().map(str::to_string) else {
            info!("No external cache configured, using local store only");
            return;
        };

        if let Err(e) = redis::Client::open(url.as_str()) {
            warn!("Ignoring malformed external cache URL: {}", e);
            return;
        }

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!("No async runtime available, external cache stays disabled");
            return;
        };

        if !self.transition(ConnectionState::Disabled, ConnectionState::Connecting) {
            debug!("External cache already started (state={})", self.state());
            return;
        }

        info!("Connecting to external cache");
        let selector = Arc::clone(self);
        let external = config.external.clone();
        runtime.spawn(async move {
            match RedisStore::connect(&url, &external).await {
                Ok(store) => {
                    selector.promote(Arc::new(store));
                }
                Err(e) => {
                    warn!("External cache connection failed, using local store: {}", e);
                    selector.transition(ConnectionState::Connecting, ConnectionState::Unavailable);
                }
            }
        });
    }

    /// Install an already-connected external backend and make it authoritative.
    ///
    /// Returns `false` when a backend was installed before or the selector has
    /// already degraded.
    pub fn install_external(&self, backend: Arc<dyn CacheBackend>) -> bool {
        let state = self.state();
        if matches!(state, ConnectionState::Ready | ConnectionState::Unavailable) {
            return false;
        }
        self.transition(state, ConnectionState::Connecting);
        self.promote(backend)
    }

    fn promote(&self, backend: Arc<dyn CacheBackend>) -> bool {
        let name = backend.name();
        if self.external.set(backend).is_err() {
            return false;
        }
        let promoted = self.transition(ConnectionState::Connecting, ConnectionState::Ready);
        if promoted {
            info!("External cache '{}' ready", name);
        }
        promoted
    }

    /// Force the terminal `Unavailable` state
    pub fn mark_unavailable(&self, reason: &str) {
        let previous = ConnectionState::from_u8(
            self.state
                .swap(ConnectionState::Unavailable as u8, Ordering::AcqRel),
        );
        if previous == ConnectionState::Unavailable {
            return;
        }

        warn!(
            "External cache unavailable ({}), falling back to local store: {}",
            previous, reason
        );
        if previous == ConnectionState::Ready {
            // Entries written before the external store took over were never
            // invalidated while it was authoritative.
            self.local.clear();
        }
    }

    /// Current connection state
    pub fn state(&self) -> ConnectionState {
        ConnectionState::from_u8(self.state.load(Ordering::Acquire))
    }

    /// The backend every operation should use right now. Never blocks.
    pub fn current_backend(&self) -> Arc<dyn CacheBackend> {
        self.route().backend
    }

    /// The process-local store
    pub fn local(&self) -> &Arc<LocalStore> {
        &self.local
    }

    /// Backend errors absorbed so far
    pub fn degraded_ops(&self) -> u64 {
        self.degraded_ops.load(Ordering::Relaxed)
    }

    fn route(&self) -> Route {
        if self.state() == ConnectionState::Ready {
            if let Some(external) = self.external.get().filter(|b| b.is_ready()) {
                return Route {
                    backend: Arc::clone(external),
                    external: true,
                };
            }
        }
        Route {
            backend: self.local.clone(),
            external: false,
        }
    }

    fn transition(&self, from: ConnectionState, to: ConnectionState) -> bool {
        let changed = self
            .state
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok();
        if changed {
            debug!("External cache state {} -> {}", from, to);
        }
        changed
    }

    // ------------------------------------------------------------------
    // Degrade boundary: every backend error stops here.
    // ------------------------------------------------------------------

    fn absorb(&self, route: &Route, op: &str, key: &str, err: CacheError) {
        self.degraded_ops.fetch_add(1, Ordering::Relaxed);
        warn!(
            "Cache {} failed on {} for {}: {}",
            op,
            route.backend.name(),
            key,
            err
        );
        if route.external && err.is_backend() {
            self.mark_unavailable(&err.to_string());
        }
    }

    /// Read a key; any failure is reported as a miss
    pub async fn read(&self, key: &str) -> Option<Vec<u8>> {
        let route = self.route();
        match route.backend.get(key).await {
            Ok(value) => value,
            Err(e) => {
                self.absorb(&route, "get", key, e);
                None
            }
        }
    }

    /// Write a key; returns `false` if the write was dropped
    pub async fn write(&self, key: &str, value: Vec<u8>, ttl_secs: u64) -> bool {
        let route = self.route();
        match route.backend.set(key, value, ttl_secs).await {
            Ok(()) => true,
            Err(e) => {
                self.absorb(&route, "set", key, e);
                false
            }
        }
    }

    /// Delete a key; absent keys count as success
    pub async fn remove(&self, key: &str) -> bool {
        let route = self.route();
        match route.backend.delete(key).await {
            Ok(_) => true,
            Err(e) => {
                self.absorb(&route, "delete", key, e);
                false
            }
        }
    }

    /// Delete keys matching a pattern; `None` if the delete failed
    pub async fn remove_matching(&self, pattern: &str) -> Option<u64> {
        let route = self.route();
        match route.backend.delete_pattern(pattern).await {
            Ok(count) => Some(count),
            Err(e) => {
                self.absorb(&route, "delete_pattern", pattern, e);
                None
            }
        }
    }
}
