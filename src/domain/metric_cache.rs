//! Read-through, write-invalidated cache of metric values per (security, date).
//!
//! The backend is a plain key/value store; this wrapper owns the policy:
//!
//! - only unbounded single-security, single-date queries without a metric
//!   filter are cacheable, and only while the date is inside the TTL window
//! - backend failures and corrupt payloads read as a miss
//! - invalidation failures are logged and never fail the write that caused them

use crate::domain::error::StratifyrError;
use crate::domain::metric::{ComputedMetricValue, MetricValueFilter};
use crate::ports::cache_port::MetricCachePort;
use crate::ports::clock_port::ClockPort;
use chrono::NaiveDate;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub const DEFAULT_TTL_HOURS: u64 = 972;

pub fn cache_key(security_id: i64, date: NaiveDate) -> String {
    format!(
        "security_metrics:security_id:{}:date:{}",
        security_id,
        date.format("%Y-%m-%d")
    )
}

pub struct DerivedMetricCache {
    backend: Option<Arc<dyn MetricCachePort + Send + Sync>>,
    clock: Arc<dyn ClockPort + Send + Sync>,
    ttl: Duration,
}

impl DerivedMetricCache {
    pub fn new(
        backend: Arc<dyn MetricCachePort + Send + Sync>,
        clock: Arc<dyn ClockPort + Send + Sync>,
        ttl: Duration,
    ) -> Self {
        Self {
            backend: Some(backend),
            clock,
            ttl,
        }
    }

    /// A cache that never stores anything; every read goes to the source.
    pub fn disabled(clock: Arc<dyn ClockPort + Send + Sync>) -> Self {
        Self {
            backend: None,
            clock,
            ttl: Duration::ZERO,
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.backend.is_some()
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// The (security, date) a filter would be cached under, if it is cacheable now.
    pub fn cacheable_key(&self, filter: &MetricValueFilter) -> Option<(i64, NaiveDate)> {
        self.backend.as_ref()?;
        if filter.limit.is_some() || filter.metric_id.is_some() {
            return None;
        }
        let (security_id, date) = (filter.security_id?, filter.date?);

        let ttl = chrono::Duration::from_std(self.ttl).ok()?;
        let age = self
            .clock
            .now()
            .signed_duration_since(date.and_time(chrono::NaiveTime::MIN).and_utc());
        (age <= ttl).then_some((security_id, date))
    }

    pub fn get(&self, security_id: i64, date: NaiveDate) -> Option<Vec<ComputedMetricValue>> {
        let backend = self.backend.as_ref()?;
        let key = cache_key(security_id, date);

        let payload = match backend.get(&key) {
            Ok(Some(payload)) => payload,
            Ok(None) => {
                debug!(%key, "metric cache miss");
                return None;
            }
            Err(e) => {
                warn!(%key, error = %e, "metric cache read failed, falling back to store");
                return None;
            }
        };

        match serde_json::from_str::<Vec<ComputedMetricValue>>(&payload) {
            Ok(values) => {
                debug!(%key, count = values.len(), "metric cache hit");
                Some(values)
            }
            Err(e) => {
                warn!(%key, error = %e, "discarding unreadable metric cache entry");
                None
            }
        }
    }

    pub fn put(
        &self,
        security_id: i64,
        date: NaiveDate,
        values: &[ComputedMetricValue],
        ttl: Duration,
    ) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let key = cache_key(security_id, date);

        let payload = match serde_json::to_string(values) {
            Ok(payload) => payload,
            Err(e) => {
                warn!(%key, error = %e, "failed to serialize metric values for cache");
                return;
            }
        };
        if let Err(e) = backend.set(&key, payload, ttl) {
            warn!(%key, error = %e, "failed to set cache");
        }
    }

    /// Removes the entry for (security, date). Failures are logged only.
    pub fn invalidate(&self, security_id: i64, date: NaiveDate) {
        let Some(backend) = self.backend.as_ref() else {
            return;
        };
        let key = cache_key(security_id, date);
        match backend.delete(&key) {
            Ok(()) => debug!(%key, "metric cache entry cleared"),
            Err(e) => warn!(%key, error = %e, "failed to clear cache"),
        }
    }

    /// Serves `filter` from the cache when cacheable, otherwise from `load`.
    ///
    /// Loaded results for cacheable queries are written back with the
    /// configured TTL. Errors from `load` propagate untouched.
    pub fn read_through<F>(
        &self,
        filter: &MetricValueFilter,
        load: F,
    ) -> Result<Vec<ComputedMetricValue>, StratifyrError>
    where
        F: FnOnce(&MetricValueFilter) -> Result<Vec<ComputedMetricValue>, StratifyrError>,
    {
        let Some((security_id, date)) = self.cacheable_key(filter) else {
            return load(filter);
        };

        if let Some(values) = self.get(security_id, date) {
            return Ok(values);
        }

        let values = load(filter)?;
        self.put(security_id, date, &values, self.ttl);
        Ok(values)
    }
}
