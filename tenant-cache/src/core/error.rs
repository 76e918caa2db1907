use thiserror::Error;

/// Boxed error returned by caller-supplied compute functions
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Main error type for cache operations
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Backend timeout during {0}")]
    Timeout(&'static str),

    /// The backend answered but rejected the command
    #[error("Backend rejected command: {0}")]
    Rejected(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid cache key: {0}")]
    InvalidKey(String),

    #[error("Compute failed: {0}")]
    Compute(#[source] BoxError),
}

impl CacheError {
    /// Errors that originate in a storage backend and degrade instead of propagating
    pub fn is_backend(&self) -> bool {
        matches!(self, Self::BackendUnavailable(_) | Self::Timeout(_))
    }

    /// Wrap a caller compute failure
    pub fn compute(err: impl Into<BoxError>) -> Self {
        Self::Compute(err.into())
    }
}

impl From<redis::RedisError> for CacheError {
    fn from(err: redis::RedisError) -> Self {
        if err.is_io_error()
            || err.is_connection_dropped()
            || err.is_connection_refusal()
            || err.is_timeout()
        {
            Self::BackendUnavailable(err.to_string())
        } else {
            Self::Rejected(err.to_string())
        }
    }
}

impl From<serde_json::Error> for CacheError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

/// Result type alias for cache operations
pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_classification() {
        assert!(CacheError::BackendUnavailable("down".into()).is_backend());
        assert!(CacheError::Timeout("get").is_backend());
        assert!(!CacheError::Serialization("bad".into()).is_backend());
        assert!(!CacheError::InvalidKey("a:b".into()).is_backend());
        assert!(!CacheError::compute("db gone").is_backend());
        assert!(!CacheError::Rejected("WRONGTYPE".into()).is_backend());
    }

    #[test]
    fn test_redis_error_classification() {
        let refused = redis::RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(CacheError::from(refused).is_backend());

        let reply = redis::RedisError::from((redis::ErrorKind::TypeError, "WRONGTYPE"));
        let err = CacheError::from(reply);
        assert!(matches!(err, CacheError::Rejected(_)));
        assert!(!err.is_backend());

        let expire = redis::RedisError::from((
            redis::ErrorKind::ResponseError,
            "ERR invalid expire time",
        ));
        assert!(!CacheError::from(expire).is_backend());
    }

    #[test]
    fn test_compute_keeps_source() {
        let err = CacheError::compute(std::io::Error::other("connection reset"));
        assert_eq!(err.to_string(), "Compute failed: connection reset");
        assert!(std::error::Error::source(&err).is_some());
    }
}
