//! # Tenant Cache
//!
//! Tenant-aware read-through cache for request handlers sitting in front of a
//! relational store.
//!
//! - 🔑 **Canonical keys**: `<namespace>:<global|center:<id>>[:<qualifier>]`,
//!   never shared between tenants
//! - 💾 **Two backends**: Redis when reachable, an in-process map otherwise
//! - 🛡️ **Best effort**: backend failures degrade to the local store and never
//!   reach the caller; only compute failures do
//! - 🧹 **Pattern invalidation**: drop one tenant's entry or every tenant's
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use tenant_cache::{CacheConfig, CacheService, TenantScope};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let service = CacheService::new(&CacheConfig::from_env());
//!
//!     let genders: Vec<String> = service
//!         .cache_lookup("gender", TenantScope::Tenant(12), || async {
//!             // query the database here
//!             Ok::<_, std::io::Error>(vec!["Female".into(), "Male".into()])
//!         })
//!         .await?;
//!     println!("{genders:?}");
//!
//!     // after editing the table
//!     service.invalidate_lookup("gender", None).await;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod config;
pub mod core;
pub mod logging;
pub mod selector;
pub mod service;

// Re-export commonly used types
pub use backend::{CacheBackend, LocalStore, RedisStore};
pub use config::{CacheConfig, ExternalConfig, LocalConfig, LoggingConfig};
pub use crate::core::{BoxError, CacheError, CacheKey, CacheStats, Result, TenantScope, build_key};
pub use logging::init_tracing;
pub use selector::{BackendSelector, ConnectionState};
pub use service::{
    CacheService, DASHBOARD_NAMESPACE, DASHBOARD_TTL_SECS, Invalidation, LOOKUP_NAMESPACE,
    LOOKUP_TTL_SECS, MAX_TTL_SECS,
};
