#![allow(dead_code)]

use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use parking_lot::Mutex;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;
use stratifyr::adapters::memory_cache_adapter::MemoryCacheAdapter;
use stratifyr::domain::bar::Bar;
use stratifyr::domain::config::ServiceConfig;
use stratifyr::domain::error::StratifyrError;
use stratifyr::domain::metric::{
    ComputedMetricValue, MetricDefinition, MetricFamily, MetricValueFilter, NewMetricValue,
};
use stratifyr::domain::service::{SecurityMetricsService, ServicePorts};
use stratifyr::ports::bar_port::BarPort;
use stratifyr::ports::cache_port::{CacheError, MetricCachePort};
use stratifyr::ports::clock_port::ClockPort;
use stratifyr::ports::holiday_port::HolidayPort;
use stratifyr::ports::metric_port::MetricDefinitionPort;
use stratifyr::ports::metric_value_port::MetricValuePort;

pub fn date(y: i32, m: u32, d: u32) -> NaiveDate {
    NaiveDate::from_ymd_opt(y, m, d).unwrap()
}

pub fn make_bar(security_id: i64, date: NaiveDate, close: f64) -> Bar {
    Bar {
        security_id,
        date,
        open: close - 1.0,
        high: close + 1.0,
        low: close - 2.0,
        close,
        volume: 1000,
    }
}

/// Bars on consecutive calendar days ending at `last`, closes given oldest first.
pub fn bars_ending(security_id: i64, last: NaiveDate, closes_oldest_first: &[f64]) -> Vec<Bar> {
    let n = closes_oldest_first.len() as i64;
    closes_oldest_first
        .iter()
        .enumerate()
        .map(|(i, &close)| {
            let day = last - chrono::Duration::days(n - 1 - i as i64);
            make_bar(security_id, day, close)
        })
        .collect()
}

#[derive(Default)]
pub struct MockBarPort {
    pub bars: HashMap<i64, Vec<Bar>>,
    pub errors: HashMap<i64, String>,
    pub calls: AtomicUsize,
}

impl MockBarPort {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_bars(mut self, bars: Vec<Bar>) -> Self {
        for bar in bars {
            self.bars.entry(bar.security_id).or_default().push(bar);
        }
        for series in self.bars.values_mut() {
            series.sort_by(|a, b| b.date.cmp(&a.date));
        }
        self
    }

    pub fn with_error(mut self, security_id: i64, reason: &str) -> Self {
        self.errors.insert(security_id, reason.to_string());
        self
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn fail_for(&self, security_id: i64) -> Result<(), StratifyrError> {
        match self.errors.get(&security_id) {
            Some(reason) => Err(StratifyrError::Database {
                reason: reason.clone(),
            }),
            None => Ok(()),
        }
    }
}

impl BarPort for MockBarPort {
    fn bars_ending_at(
        &self,
        security_id: i64,
        cutoff: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Bar>, StratifyrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.fail_for(security_id)?;
        Ok(self
            .bars
            .get(&security_id)
            .map(|s| {
                s.iter()
                    .filter(|b| b.date <= cutoff)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn bars_on(&self, security_ids: &[i64], date: NaiveDate) -> Result<Vec<Bar>, StratifyrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let mut found = Vec::new();
        for id in security_ids {
            self.fail_for(*id)?;
            if let Some(bar) = self
                .bars
                .get(id)
                .and_then(|s| s.iter().find(|b| b.date == date))
            {
                found.push(bar.clone());
            }
        }
        Ok(found)
    }
}

#[derive(Default)]
pub struct MockHolidayPort {
    pub dates: Vec<NaiveDate>,
    pub calls: AtomicUsize,
}

impl MockHolidayPort {
    pub fn new(dates: Vec<NaiveDate>) -> Self {
        Self {
            dates,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl HolidayPort for MockHolidayPort {
    fn holidays_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StratifyrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .dates
            .iter()
            .copied()
            .filter(|d| *d >= start && *d <= end)
            .collect())
    }
}

/// Metric definitions and values in memory, counting value queries.
#[derive(Default)]
pub struct MockMetricStore {
    pub definitions: Mutex<Vec<MetricDefinition>>,
    pub values: Mutex<Vec<ComputedMetricValue>>,
    pub failing_securities: HashSet<i64>,
    pub queries: AtomicUsize,
}

impl MockMetricStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_metric(self, id: i64, family: MetricFamily, period: i64) -> Self {
        let name = format!("{}_{period}", family.as_str());
        self.definitions
            .lock()
            .push(MetricDefinition::new(id, name, family, period).unwrap());
        self
    }

    pub fn with_value(self, security_id: i64, metric_id: i64, date: NaiveDate, value: f64) -> Self {
        {
            let mut values = self.values.lock();
            let id = values.len() as i64 + 1;
            values.push(ComputedMetricValue {
                id,
                security_id,
                metric_id,
                date,
                value,
            });
        }
        self
    }

    pub fn failing_for(mut self, security_id: i64) -> Self {
        self.failing_securities.insert(security_id);
        self
    }

    pub fn query_count(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

impl MetricDefinitionPort for MockMetricStore {
    fn get_metric(&self, id: i64) -> Result<Option<MetricDefinition>, StratifyrError> {
        Ok(self.definitions.lock().iter().find(|m| m.id == id).cloned())
    }

    fn list_metrics(&self) -> Result<Vec<MetricDefinition>, StratifyrError> {
        Ok(self.definitions.lock().clone())
    }
}

impl MetricValuePort for MockMetricStore {
    fn create_value(&self, value: &NewMetricValue) -> Result<ComputedMetricValue, StratifyrError> {
        let mut values = self.values.lock();
        let created = ComputedMetricValue {
            id: values.len() as i64 + 1,
            security_id: value.security_id,
            metric_id: value.metric_id,
            date: value.date,
            value: value.value,
        };
        values.push(created.clone());
        Ok(created)
    }

    fn update_value(&self, id: i64, value: f64) -> Result<ComputedMetricValue, StratifyrError> {
        let mut values = self.values.lock();
        let existing = values
            .iter_mut()
            .find(|v| v.id == id)
            .ok_or(StratifyrError::NotFound {
                entity: "metric value",
                id,
            })?;
        existing.value = value;
        Ok(existing.clone())
    }

    fn retrieve_value(&self, id: i64) -> Result<Option<ComputedMetricValue>, StratifyrError> {
        Ok(self.values.lock().iter().find(|v| v.id == id).cloned())
    }

    fn query_values(
        &self,
        filter: &MetricValueFilter,
    ) -> Result<Vec<ComputedMetricValue>, StratifyrError> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if let Some(id) = filter.security_id {
            if self.failing_securities.contains(&id) {
                return Err(StratifyrError::DatabaseQuery {
                    reason: format!("metric values unavailable for security {id}"),
                });
            }
        }
        let mut found: Vec<ComputedMetricValue> = self
            .values
            .lock()
            .iter()
            .filter(|v| filter.security_id.is_none_or(|id| v.security_id == id))
            .filter(|v| filter.metric_id.is_none_or(|id| v.metric_id == id))
            .filter(|v| filter.date.is_none_or(|d| v.date == d))
            .cloned()
            .collect();
        if let Some(limit) = filter.limit {
            found.truncate(limit);
        }
        Ok(found)
    }
}

pub struct FixedClock(pub DateTime<Utc>);

impl FixedClock {
    /// Noon UTC on `day`.
    pub fn on(day: NaiveDate) -> Self {
        Self(
            Utc.from_utc_datetime(&day.and_hms_opt(12, 0, 0).unwrap()),
        )
    }
}

impl ClockPort for FixedClock {
    fn now(&self) -> DateTime<Utc> {
        self.0
    }
}

/// A cache backend that is always down.
#[derive(Default)]
pub struct FailingCache {
    pub attempts: AtomicUsize,
}

impl FailingCache {
    fn down(&self) -> CacheError {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        CacheError::Unavailable {
            reason: "connection refused".into(),
        }
    }
}

impl MetricCachePort for FailingCache {
    fn get(&self, _key: &str) -> Result<Option<String>, CacheError> {
        Err(self.down())
    }

    fn set(&self, _key: &str, _value: String, _ttl: Duration) -> Result<(), CacheError> {
        Err(self.down())
    }

    fn delete(&self, _key: &str) -> Result<(), CacheError> {
        Err(self.down())
    }
}

/// A service over mocks, with handles kept for assertions.
pub struct Harness {
    pub bars: Arc<MockBarPort>,
    pub holidays: Arc<MockHolidayPort>,
    pub store: Arc<MockMetricStore>,
    pub cache: Arc<dyn MetricCachePort + Send + Sync>,
    pub service: SecurityMetricsService,
}

impl Harness {
    pub fn new(bars: MockBarPort, store: MockMetricStore, today: NaiveDate) -> Self {
        Self::build(
            bars,
            MockHolidayPort::default(),
            store,
            Arc::new(MemoryCacheAdapter::default()),
            today,
            &ServiceConfig::default(),
        )
    }

    pub fn build(
        bars: MockBarPort,
        holidays: MockHolidayPort,
        store: MockMetricStore,
        cache: Arc<dyn MetricCachePort + Send + Sync>,
        today: NaiveDate,
        config: &ServiceConfig,
    ) -> Self {
        let bars = Arc::new(bars);
        let holidays = Arc::new(holidays);
        let store = Arc::new(store);
        let ports = ServicePorts {
            bars: bars.clone(),
            holidays: holidays.clone(),
            metrics: store.clone(),
            values: store.clone(),
            cache: cache.clone(),
            clock: Arc::new(FixedClock::on(today)),
        };
        let service = SecurityMetricsService::new(ports, config).unwrap();
        Self {
            bars,
            holidays,
            store,
            cache,
            service,
        }
    }
}
