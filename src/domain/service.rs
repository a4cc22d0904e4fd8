//! Security metrics service.
//!
//! Wires the trading calendar, indicator engine, normalization, metric cache
//! and aggregator over the store ports. This is the surface the CLI (or any
//! transport) talks to.

use crate::domain::aggregator::ConcurrentAggregator;
use crate::domain::bar::Bar;
use crate::domain::config::ServiceConfig;
use crate::domain::error::StratifyrError;
use crate::domain::indicator;
use crate::domain::metric::{
    ComputedMetricValue, MetricDefinition, MetricValueFilter, NewMetricValue, NormalizedMetric,
};
use crate::domain::metric_cache::DerivedMetricCache;
use crate::domain::normalization::normalize_or_identity;
use crate::domain::trading_calendar::{MarketDayQuery, TradingCalendar};
use crate::ports::bar_port::BarPort;
use crate::ports::cache_port::MetricCachePort;
use crate::ports::clock_port::ClockPort;
use crate::ports::holiday_port::HolidayPort;
use crate::ports::metric_port::MetricDefinitionPort;
use crate::ports::metric_value_port::MetricValuePort;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::debug;

/// The collaborators a [`SecurityMetricsService`] is built from.
#[derive(Clone)]
pub struct ServicePorts {
    pub bars: Arc<dyn BarPort + Send + Sync>,
    pub holidays: Arc<dyn HolidayPort + Send + Sync>,
    pub metrics: Arc<dyn MetricDefinitionPort + Send + Sync>,
    pub values: Arc<dyn MetricValuePort + Send + Sync>,
    pub cache: Arc<dyn MetricCachePort + Send + Sync>,
    pub clock: Arc<dyn ClockPort + Send + Sync>,
}

/// Where a recorded metric value comes from.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ValueSource {
    Given(f64),
    /// Computed from the bar window ending at the value's date.
    Calculate,
}

/// A security's latest trading-day bar and its normalized metrics.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SecurityWithMetrics {
    pub security_id: i64,
    pub trading_day: Option<NaiveDate>,
    pub bar: Option<Bar>,
    pub metrics: Vec<NormalizedMetric>,
}

pub struct SecurityMetricsService {
    bars: Arc<dyn BarPort + Send + Sync>,
    metrics: Arc<dyn MetricDefinitionPort + Send + Sync>,
    values: Arc<dyn MetricValuePort + Send + Sync>,
    clock: Arc<dyn ClockPort + Send + Sync>,
    calendar: TradingCalendar,
    cache: DerivedMetricCache,
    aggregator: ConcurrentAggregator,
}

impl SecurityMetricsService {
    pub fn new(ports: ServicePorts, config: &ServiceConfig) -> Result<Self, StratifyrError> {
        let calendar = TradingCalendar::new(ports.holidays).with_limits(
            config.calendar.lookback_days,
            config.calendar.max_range_days,
        );
        let cache = if config.cache.enabled {
            DerivedMetricCache::new(ports.cache, ports.clock.clone(), config.cache_ttl())
        } else {
            DerivedMetricCache::disabled(ports.clock.clone())
        };
        let aggregator = ConcurrentAggregator::new(config.max_concurrency)?;

        Ok(Self {
            bars: ports.bars,
            metrics: ports.metrics,
            values: ports.values,
            clock: ports.clock,
            calendar,
            cache,
            aggregator,
        })
    }

    pub fn calendar(&self) -> &TradingCalendar {
        &self.calendar
    }

    pub fn cache(&self) -> &DerivedMetricCache {
        &self.cache
    }

    fn metric_definition(&self, metric_id: i64) -> Result<MetricDefinition, StratifyrError> {
        self.metrics
            .get_metric(metric_id)?
            .ok_or(StratifyrError::NotFound {
                entity: "metric",
                id: metric_id,
            })
    }

    /// Computes `metric_id` for `security_id` from the bars ending at `cutoff`.
    pub fn compute_indicator(
        &self,
        security_id: i64,
        metric_id: i64,
        cutoff: NaiveDate,
    ) -> Result<f64, StratifyrError> {
        let metric = self.metric_definition(metric_id)?;
        let window = self
            .bars
            .bars_ending_at(security_id, cutoff, metric.period)?;
        let value = indicator::compute(metric.family, metric.period, &window)?;
        debug!(security_id, %metric, %cutoff, value, "indicator computed");
        Ok(value)
    }

    /// Persists a metric value, then clears the cached set for its (security, date).
    pub fn record_metric_value(
        &self,
        security_id: i64,
        metric_id: i64,
        date: NaiveDate,
        source: ValueSource,
    ) -> Result<ComputedMetricValue, StratifyrError> {
        let value = match source {
            ValueSource::Given(value) => value,
            ValueSource::Calculate => self.compute_indicator(security_id, metric_id, date)?,
        };
        let created = self.values.create_value(&NewMetricValue {
            security_id,
            metric_id,
            date,
            value,
        })?;
        self.cache.invalidate(created.security_id, created.date);
        Ok(created)
    }

    /// Updates a stored value. `None` keeps the current value; the cache entry
    /// is cleared either way.
    pub fn update_metric_value(
        &self,
        id: i64,
        value: Option<f64>,
    ) -> Result<ComputedMetricValue, StratifyrError> {
        let existing = self
            .values
            .retrieve_value(id)?
            .ok_or(StratifyrError::NotFound {
                entity: "metric value",
                id,
            })?;
        let updated = self
            .values
            .update_value(id, value.unwrap_or(existing.value))?;
        self.cache.invalidate(existing.security_id, existing.date);
        Ok(updated)
    }

    pub fn metric_values(
        &self,
        filter: &MetricValueFilter,
    ) -> Result<Vec<ComputedMetricValue>, StratifyrError> {
        self.cache
            .read_through(filter, |f| self.values.query_values(f))
    }

    pub fn metric_values_for(
        &self,
        security_id: i64,
        date: NaiveDate,
    ) -> Result<Vec<ComputedMetricValue>, StratifyrError> {
        self.metric_values(&MetricValueFilter::for_security_on(security_id, date))
    }

    pub fn get_trading_days(&self, query: MarketDayQuery) -> Result<Vec<NaiveDate>, StratifyrError> {
        self.calendar.query(query, self.clock.today())
    }

    pub fn get_security_with_metrics(
        &self,
        security_id: i64,
    ) -> Result<SecurityWithMetrics, StratifyrError> {
        let mut assembled = self.get_securities_with_metrics(&[security_id])?;
        Ok(assembled.pop().unwrap_or(SecurityWithMetrics {
            security_id,
            trading_day: None,
            bar: None,
            metrics: Vec::new(),
        }))
    }

    /// Assembles every security on the aggregator's worker pool.
    ///
    /// Definitions, the latest trading day and that day's bars are loaded once
    /// for the whole batch. Any per-security failure fails the batch.
    pub fn get_securities_with_metrics(
        &self,
        security_ids: &[i64],
    ) -> Result<Vec<SecurityWithMetrics>, StratifyrError> {
        if security_ids.is_empty() {
            return Ok(Vec::new());
        }

        let definitions: HashMap<i64, MetricDefinition> = self
            .metrics
            .list_metrics()?
            .into_iter()
            .map(|m| (m.id, m))
            .collect();
        let trading_day = self.calendar.latest_trading_day(self.clock.today())?;
        let bars: HashMap<i64, Bar> = match trading_day {
            Some(day) => self
                .bars
                .bars_on(security_ids, day)?
                .into_iter()
                .map(|b| (b.security_id, b))
                .collect(),
            None => HashMap::new(),
        };
        debug!(
            securities = security_ids.len(),
            bars = bars.len(),
            ?trading_day,
            "assembling securities"
        );

        self.aggregator.assemble_many(security_ids, |&security_id| {
            self.assemble(
                security_id,
                trading_day,
                bars.get(&security_id).cloned(),
                &definitions,
            )
        })
    }

    fn assemble(
        &self,
        security_id: i64,
        trading_day: Option<NaiveDate>,
        bar: Option<Bar>,
        definitions: &HashMap<i64, MetricDefinition>,
    ) -> Result<SecurityWithMetrics, StratifyrError> {
        let values = match trading_day {
            Some(day) => self.metric_values_for(security_id, day)?,
            None => Vec::new(),
        };

        let metrics = values
            .into_iter()
            .map(|value| {
                let metric = definitions.get(&value.metric_id).cloned();
                let normalized_value = bar.as_ref().and_then(|reference| {
                    normalize_or_identity(metric.as_ref().map(|m| m.family), value.value, reference)
                });
                NormalizedMetric {
                    value,
                    metric,
                    normalized_value,
                }
            })
            .collect();

        Ok(SecurityWithMetrics {
            security_id,
            trading_day,
            bar,
            metrics,
        })
    }
}
