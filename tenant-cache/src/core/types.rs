use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

/// Expiry used when a TTL would overflow the clock (about 30 years)
const FAR_FUTURE: Duration = Duration::from_secs(30 * 365 * 86_400);

/// Entry held by the process-local store
#[derive(Debug, Clone)]
pub struct StoredEntry {
    /// Encoded value
    pub data: Vec<u8>,
    /// Absolute expiry
    pub expires_at: Instant,
}

impl StoredEntry {
    /// Create an entry expiring `ttl_secs` from now
    pub fn new(data: Vec<u8>, ttl_secs: u64) -> Self {
        let now = Instant::now();
        let expires_at = now
            .checked_add(Duration::from_secs(ttl_secs))
            .or_else(|| now.checked_add(FAR_FUTURE))
            .unwrap_or(now);
        Self { data, expires_at }
    }

    /// Check if the entry has expired
    pub fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }

    /// Remaining TTL in whole seconds, zero once expired
    pub fn remaining_ttl_secs(&self) -> u64 {
        self.expires_at
            .saturating_duration_since(Instant::now())
            .as_secs()
    }
}

/// Snapshot of cache service counters
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    /// Reads answered from a backend
    pub hits: u64,
    /// Reads that fell through to compute
    pub misses: u64,
    /// Compute invocations
    pub computes: u64,
    /// Compute invocations that returned an error
    pub compute_failures: u64,
    /// Write-backs that were dropped
    pub write_failures: u64,
    /// Backend errors absorbed at the selector
    pub degraded_ops: u64,
    /// Invalidation calls
    pub invalidations: u64,
}

impl CacheStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Lock-free counters behind [`CacheStats`]
#[derive(Debug, Default)]
pub(crate) struct StatsCounters {
    pub hits: AtomicU64,
    pub misses: AtomicU64,
    pub computes: AtomicU64,
    pub compute_failures: AtomicU64,
    pub write_failures: AtomicU64,
    pub invalidations: AtomicU64,
}

impl StatsCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// `degraded_ops` is owned by the selector and passed in
    pub fn snapshot(&self, degraded_ops: u64) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            computes: self.computes.load(Ordering::Relaxed),
            compute_failures: self.compute_failures.load(Ordering::Relaxed),
            write_failures: self.write_failures.load(Ordering::Relaxed),
            degraded_ops,
            invalidations: self.invalidations.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_entry_expiry() {
        let entry = StoredEntry::new(b"v".to_vec(), 60);
        assert!(!entry.is_expired());
        assert!(entry.remaining_ttl_secs() <= 60);

        let stale = StoredEntry {
            data: Vec::new(),
            expires_at: Instant::now() - Duration::from_millis(1),
        };
        assert!(stale.is_expired());
        assert_eq!(stale.remaining_ttl_secs(), 0);
    }

    #[test]
    fn test_huge_ttl_does_not_overflow() {
        let entry = StoredEntry::new(b"v".to_vec(), u64::MAX);
        assert!(!entry.is_expired());
        assert!(entry.remaining_ttl_secs() > 365 * 86_400);
    }

    #[test]
    fn test_hit_rate() {
        assert_eq!(CacheStats::default().hit_rate(), 0.0);
        let stats = CacheStats {
            hits: 3,
            misses: 1,
            ..Default::default()
        };
        assert_eq!(stats.hit_rate(), 0.75);
    }
}
