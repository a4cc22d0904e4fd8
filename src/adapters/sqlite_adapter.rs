//! SQLite store adapter.
//!
//! One pooled database holds bars, market holidays, metric definitions,
//! computed metric values and the metric cache. Dates are stored as
//! `YYYY-MM-DD` text so they sort and compare lexically; cache expiry is Unix
//! milliseconds.

use crate::domain::bar::Bar;
use crate::domain::error::StratifyrError;
use crate::domain::metric::{
    ComputedMetricValue, MetricDefinition, MetricFamily, MetricValueFilter, NewMetricValue,
};
use crate::domain::trading_calendar::MarketHoliday;
use crate::ports::bar_port::BarPort;
use crate::ports::cache_port::{CacheError, MetricCachePort};
use crate::ports::config_port::ConfigPort;
use crate::ports::holiday_port::HolidayPort;
use crate::ports::metric_port::MetricDefinitionPort;
use crate::ports::metric_value_port::MetricValuePort;
use crate::ports::store_admin_port::StoreAdminPort;
use chrono::{NaiveDate, Utc};
use r2d2::{Pool, PooledConnection};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::types::Value;
use rusqlite::{OptionalExtension, Row, params, params_from_iter};
use std::time::Duration;

const DATE_FORMAT: &str = "%Y-%m-%d";

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS bars (
        security_id INTEGER NOT NULL,
        date TEXT NOT NULL,
        open REAL NOT NULL,
        high REAL NOT NULL,
        low REAL NOT NULL,
        close REAL NOT NULL,
        volume INTEGER NOT NULL,
        PRIMARY KEY (security_id, date)
    );
    CREATE INDEX IF NOT EXISTS idx_bars_date ON bars(date);
    CREATE TABLE IF NOT EXISTS market_holidays (
        date TEXT PRIMARY KEY,
        description TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS metrics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        family TEXT NOT NULL,
        period INTEGER NOT NULL CHECK (period > 0)
    );
    CREATE TABLE IF NOT EXISTS security_metrics (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        security_id INTEGER NOT NULL,
        metric_id INTEGER NOT NULL,
        date TEXT NOT NULL,
        value REAL NOT NULL,
        created_at TEXT NOT NULL,
        updated_at TEXT NOT NULL,
        UNIQUE (security_id, metric_id, date)
    );
    CREATE INDEX IF NOT EXISTS idx_security_metrics_security_date
        ON security_metrics(security_id, date);
    CREATE TABLE IF NOT EXISTS metric_cache (
        key TEXT PRIMARY KEY,
        payload TEXT NOT NULL,
        expires_at INTEGER NOT NULL
    );";

pub struct SqliteAdapter {
    pool: Pool<SqliteConnectionManager>,
}

fn pool_error(e: r2d2::Error) -> StratifyrError {
    StratifyrError::Database {
        reason: e.to_string(),
    }
}

fn query_error(e: rusqlite::Error) -> StratifyrError {
    StratifyrError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn cache_error(e: impl std::fmt::Display) -> CacheError {
    CacheError::Unavailable {
        reason: e.to_string(),
    }
}

/// Unix milliseconds `ttl` from now.
fn expiry_millis(key: &str, ttl: Duration) -> Result<i64, CacheError> {
    i64::try_from(ttl.as_millis())
        .ok()
        .and_then(|ttl| Utc::now().timestamp_millis().checked_add(ttl))
        .ok_or_else(|| CacheError::Payload {
            key: key.to_string(),
            reason: format!("ttl {ttl:?} overflows the clock"),
        })
}

fn parse_date(idx: usize, raw: String) -> rusqlite::Result<NaiveDate> {
    NaiveDate::parse_from_str(&raw, DATE_FORMAT).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(idx, rusqlite::types::Type::Text, Box::new(e))
    })
}

fn bar_from_row(row: &Row<'_>) -> rusqlite::Result<Bar> {
    Ok(Bar {
        security_id: row.get(0)?,
        date: parse_date(1, row.get(1)?)?,
        open: row.get(2)?,
        high: row.get(3)?,
        low: row.get(4)?,
        close: row.get(5)?,
        volume: row.get(6)?,
    })
}

fn value_from_row(row: &Row<'_>) -> rusqlite::Result<ComputedMetricValue> {
    Ok(ComputedMetricValue {
        id: row.get(0)?,
        security_id: row.get(1)?,
        metric_id: row.get(2)?,
        date: parse_date(3, row.get(3)?)?,
        value: row.get(4)?,
    })
}

fn metric_from_row(row: &Row<'_>) -> rusqlite::Result<(i64, String, String, i64)> {
    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
}

fn into_definition(
    (id, name, family, period): (i64, String, String, i64),
) -> Result<MetricDefinition, StratifyrError> {
    MetricDefinition::new(id, name, family.parse()?, period)
}

impl SqliteAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StratifyrError> {
        let db_path =
            config
                .get_string("sqlite", "path")
                .ok_or_else(|| StratifyrError::ConfigMissing {
                    section: "sqlite".into(),
                    key: "path".into(),
                })?;

        let pool_size = config.get_int("sqlite", "pool_size", 4).max(1) as u32;

        let manager = SqliteConnectionManager::file(&db_path);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    /// A private in-memory database. The pool holds a single connection so
    /// every caller sees the same data.
    pub fn in_memory() -> Result<Self, StratifyrError> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1)
            .build(manager)
            .map_err(pool_error)?;

        Ok(Self { pool })
    }

    fn conn(&self) -> Result<PooledConnection<SqliteConnectionManager>, StratifyrError> {
        self.pool.get().map_err(pool_error)
    }
}

impl StoreAdminPort for SqliteAdapter {
    fn initialize_schema(&self) -> Result<(), StratifyrError> {
        self.conn()?.execute_batch(SCHEMA).map_err(query_error)
    }

    fn insert_bars(&self, bars: &[Bar]) -> Result<usize, StratifyrError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;

        for bar in bars {
            tx.execute(
                "INSERT OR REPLACE INTO bars (security_id, date, open, high, low, close, volume)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    bar.security_id,
                    bar.date.format(DATE_FORMAT).to_string(),
                    bar.open,
                    bar.high,
                    bar.low,
                    bar.close,
                    bar.volume
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)?;
        Ok(bars.len())
    }

    fn insert_holidays(&self, holidays: &[MarketHoliday]) -> Result<usize, StratifyrError> {
        let mut conn = self.conn()?;
        let tx = conn.transaction().map_err(query_error)?;

        for holiday in holidays {
            tx.execute(
                "INSERT OR REPLACE INTO market_holidays (date, description) VALUES (?1, ?2)",
                params![
                    holiday.date.format(DATE_FORMAT).to_string(),
                    holiday.description
                ],
            )
            .map_err(query_error)?;
        }

        tx.commit().map_err(query_error)?;
        Ok(holidays.len())
    }

    fn define_metric(
        &self,
        name: &str,
        family: MetricFamily,
        period: usize,
    ) -> Result<MetricDefinition, StratifyrError> {
        let period = period as i64;
        // Validate before touching the table.
        MetricDefinition::new(0, name, family, period)?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO metrics (name, family, period) VALUES (?1, ?2, ?3)",
            params![name, family.as_str(), period],
        )
        .map_err(query_error)?;
        MetricDefinition::new(conn.last_insert_rowid(), name, family, period)
    }
}

impl BarPort for SqliteAdapter {
    fn bars_ending_at(
        &self,
        security_id: i64,
        cutoff: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Bar>, StratifyrError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare(
                "SELECT security_id, date, open, high, low, close, volume
                 FROM bars
                 WHERE security_id = ?1 AND date <= ?2
                 ORDER BY date DESC
                 LIMIT ?3",
            )
            .map_err(query_error)?;

        let rows = stmt
            .query_map(
                params![
                    security_id,
                    cutoff.format(DATE_FORMAT).to_string(),
                    limit as i64
                ],
                bar_from_row,
            )
            .map_err(query_error)?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_error)
    }

    fn bars_on(&self, security_ids: &[i64], date: NaiveDate) -> Result<Vec<Bar>, StratifyrError> {
        if security_ids.is_empty() {
            return Ok(Vec::new());
        }

        let placeholders = (0..security_ids.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let query = format!(
            "SELECT security_id, date, open, high, low, close, volume
             FROM bars
             WHERE date = ?1 AND security_id IN ({placeholders})
             ORDER BY security_id"
        );

        let mut values = vec![Value::Text(date.format(DATE_FORMAT).to_string())];
        values.extend(security_ids.iter().map(|id| Value::Integer(*id)));

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&query).map_err(query_error)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), bar_from_row)
            .map_err(query_error)?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_error)
    }
}

impl HolidayPort for SqliteAdapter {
    fn holidays_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StratifyrError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT date FROM market_holidays WHERE date >= ?1 AND date <= ?2")
            .map_err(query_error)?;

        let rows = stmt
            .query_map(
                params![
                    start.format(DATE_FORMAT).to_string(),
                    end.format(DATE_FORMAT).to_string()
                ],
                |row| parse_date(0, row.get(0)?),
            )
            .map_err(query_error)?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_error)
    }
}

impl MetricDefinitionPort for SqliteAdapter {
    fn get_metric(&self, id: i64) -> Result<Option<MetricDefinition>, StratifyrError> {
        let conn = self.conn()?;
        let raw = conn
            .query_row(
                "SELECT id, name, family, period FROM metrics WHERE id = ?1",
                params![id],
                metric_from_row,
            )
            .optional()
            .map_err(query_error)?;

        raw.map(into_definition).transpose()
    }

    fn list_metrics(&self) -> Result<Vec<MetricDefinition>, StratifyrError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT id, name, family, period FROM metrics ORDER BY id")
            .map_err(query_error)?;

        let rows = stmt
            .query_map([], metric_from_row)
            .map_err(query_error)?
            .collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_error)?;

        rows.into_iter().map(into_definition).collect()
    }
}

impl MetricValuePort for SqliteAdapter {
    fn create_value(&self, value: &NewMetricValue) -> Result<ComputedMetricValue, StratifyrError> {
        let now = Utc::now().to_rfc3339();
        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO security_metrics (security_id, metric_id, date, value, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![
                value.security_id,
                value.metric_id,
                value.date.format(DATE_FORMAT).to_string(),
                value.value,
                now
            ],
        )
        .map_err(query_error)?;

        Ok(ComputedMetricValue {
            id: conn.last_insert_rowid(),
            security_id: value.security_id,
            metric_id: value.metric_id,
            date: value.date,
            value: value.value,
        })
    }

    fn update_value(&self, id: i64, value: f64) -> Result<ComputedMetricValue, StratifyrError> {
        let changed = self
            .conn()?
            .execute(
                "UPDATE security_metrics SET value = ?1, updated_at = ?2 WHERE id = ?3",
                params![value, Utc::now().to_rfc3339(), id],
            )
            .map_err(query_error)?;
        if changed == 0 {
            return Err(StratifyrError::NotFound {
                entity: "metric value",
                id,
            });
        }

        self.retrieve_value(id)?.ok_or(StratifyrError::NotFound {
            entity: "metric value",
            id,
        })
    }

    fn retrieve_value(&self, id: i64) -> Result<Option<ComputedMetricValue>, StratifyrError> {
        self.conn()?
            .query_row(
                "SELECT id, security_id, metric_id, date, value FROM security_metrics WHERE id = ?1",
                params![id],
                value_from_row,
            )
            .optional()
            .map_err(query_error)
    }

    fn query_values(
        &self,
        filter: &MetricValueFilter,
    ) -> Result<Vec<ComputedMetricValue>, StratifyrError> {
        let mut clauses = Vec::new();
        let mut values = Vec::new();

        if let Some(security_id) = filter.security_id {
            values.push(Value::Integer(security_id));
            clauses.push(format!("security_id = ?{}", values.len()));
        }
        if let Some(metric_id) = filter.metric_id {
            values.push(Value::Integer(metric_id));
            clauses.push(format!("metric_id = ?{}", values.len()));
        }
        if let Some(date) = filter.date {
            values.push(Value::Text(date.format(DATE_FORMAT).to_string()));
            clauses.push(format!("date = ?{}", values.len()));
        }

        let mut query =
            "SELECT id, security_id, metric_id, date, value FROM security_metrics".to_string();
        if !clauses.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&clauses.join(" AND "));
        }
        query.push_str(" ORDER BY metric_id, date DESC, id");
        if let Some(limit) = filter.limit {
            values.push(Value::Integer(limit as i64));
            query.push_str(&format!(" LIMIT ?{}", values.len()));
        }

        let conn = self.conn()?;
        let mut stmt = conn.prepare(&query).map_err(query_error)?;
        let rows = stmt
            .query_map(params_from_iter(values.iter()), value_from_row)
            .map_err(query_error)?;

        rows.collect::<rusqlite::Result<Vec<_>>>()
            .map_err(query_error)
    }
}

impl MetricCachePort for SqliteAdapter {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let conn = self.pool.get().map_err(cache_error)?;
        conn.query_row(
            "SELECT payload FROM metric_cache WHERE key = ?1 AND expires_at > ?2",
            params![key, Utc::now().timestamp_millis()],
            |row| row.get(0),
        )
        .optional()
        .map_err(cache_error)
    }

    /// Writes the entry and sweeps every expired one.
    fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = expiry_millis(key, ttl)?;
        let mut conn = self.pool.get().map_err(cache_error)?;
        let tx = conn.transaction().map_err(cache_error)?;
        tx.execute(
            "DELETE FROM metric_cache WHERE expires_at <= ?1",
            params![Utc::now().timestamp_millis()],
        )
        .map_err(cache_error)?;
        tx.execute(
            "INSERT OR REPLACE INTO metric_cache (key, payload, expires_at) VALUES (?1, ?2, ?3)",
            params![key, payload, expires_at],
        )
        .map_err(cache_error)?;
        tx.commit().map_err(cache_error)
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.pool
            .get()
            .map_err(cache_error)?
            .execute("DELETE FROM metric_cache WHERE key = ?1", params![key])
            .map_err(cache_error)?;
        Ok(())
    }
}
