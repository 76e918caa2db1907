pub mod error;
pub mod key;
pub mod types;

pub use error::{BoxError, CacheError, Result};
pub use key::{CacheKey, TenantScope, build_key};
pub use types::{CacheStats, StoredEntry};
