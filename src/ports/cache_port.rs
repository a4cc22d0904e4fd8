//! Key/value cache backend port.
//!
//! Keys are strings and payloads are serialized text, the shape of a remote
//! store such as Redis. Backend failures surface as [`CacheError`] and are
//! absorbed by the caller.

use std::time::Duration;

#[derive(Debug, Clone, thiserror::Error)]
pub enum CacheError {
    #[error("cache backend unavailable: {reason}")]
    Unavailable { reason: String },

    #[error("cache payload error for {key}: {reason}")]
    Payload { key: String, reason: String },
}

pub trait MetricCachePort {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError>;

    fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), CacheError>;

    fn delete(&self, key: &str) -> Result<(), CacheError>;
}
