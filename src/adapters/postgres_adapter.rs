//! PostgreSQL store adapter.

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
use postgres::types::ToSql;
use postgres::{NoTls, Row};
use r2d2::{Pool, PooledConnection};
use r2d2_postgres::PostgresConnectionManager;
use std::time::Duration;

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS bars (
        security_id BIGINT NOT NULL,
        date DATE NOT NULL,
        open DOUBLE PRECISION NOT NULL,
        high DOUBLE PRECISION NOT NULL,
        low DOUBLE PRECISION NOT NULL,
        close DOUBLE PRECISION NOT NULL,
        volume BIGINT NOT NULL,
        PRIMARY KEY (security_id, date)
    );
    CREATE INDEX IF NOT EXISTS idx_bars_date ON bars(date);
    CREATE TABLE IF NOT EXISTS market_holidays (
        date DATE PRIMARY KEY,
        description TEXT NOT NULL DEFAULT ''
    );
    CREATE TABLE IF NOT EXISTS metrics (
        id BIGSERIAL PRIMARY KEY,
        name TEXT NOT NULL,
        family TEXT NOT NULL,
        period BIGINT NOT NULL CHECK (period > 0)
    );
    CREATE TABLE IF NOT EXISTS security_metrics (
        id BIGSERIAL PRIMARY KEY,
        security_id BIGINT NOT NULL,
        metric_id BIGINT NOT NULL,
        date DATE NOT NULL,
        value DOUBLE PRECISION NOT NULL,
        created_at TIMESTAMPTZ NOT NULL,
        updated_at TIMESTAMPTZ NOT NULL,
        UNIQUE (security_id, metric_id, date)
    );
    CREATE TABLE IF NOT EXISTS metric_cache (
        key TEXT PRIMARY KEY,
        payload TEXT NOT NULL,
        expires_at TIMESTAMPTZ NOT NULL
    );";

type PgPool = Pool<PostgresConnectionManager<NoTls>>;

pub struct PostgresAdapter {
    pool: PgPool,
}

fn query_error(e: postgres::Error) -> StratifyrError {
    StratifyrError::DatabaseQuery {
        reason: e.to_string(),
    }
}

fn cache_error(e: impl std::fmt::Display) -> CacheError {
    CacheError::Unavailable {
        reason: e.to_string(),
    }
}

fn bar_from_row(row: &Row) -> Bar {
    Bar {
        security_id: row.get(0),
        date: row.get(1),
        open: row.get(2),
        high: row.get(3),
        low: row.get(4),
        close: row.get(5),
        volume: row.get(6),
    }
}

fn value_from_row(row: &Row) -> ComputedMetricValue {
    ComputedMetricValue {
        id: row.get(0),
        security_id: row.get(1),
        metric_id: row.get(2),
        date: row.get(3),
        value: row.get(4),
    }
}

fn definition_from_row(row: &Row) -> Result<MetricDefinition, StratifyrError> {
    let family: String = row.get(2);
    MetricDefinition::new(row.get(0), row.get::<_, String>(1), family.parse()?, row.get(3))
}

impl PostgresAdapter {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StratifyrError> {
        let connection_string = config
            .get_string("postgres", "connection_string")
            .ok_or_else(|| StratifyrError::ConfigMissing {
                section: "postgres".into(),
                key: "connection_string".into(),
            })?;
        let pool_size = config.get_int("postgres", "pool_size", 4).max(1) as u32;

        let pg_config = connection_string
            .parse::<postgres::Config>()
            .map_err(|e| StratifyrError::ConfigInvalid {
                section: "postgres".into(),
                key: "connection_string".into(),
                reason: e.to_string(),
            })?;
        let manager = PostgresConnectionManager::new(pg_config, NoTls);
        let pool = Pool::builder()
            .max_size(pool_size)
            .build(manager)
            .map_err(|e| StratifyrError::Database {
                reason: e.to_string(),
            })?;

        Ok(Self { pool })
    }

    fn conn(
        &self,
    ) -> Result<PooledConnection<PostgresConnectionManager<NoTls>>, StratifyrError> {
        self.pool.get().map_err(|e| StratifyrError::Database {
            reason: e.to_string(),
        })
    }
}

impl StoreAdminPort for PostgresAdapter {
    fn initialize_schema(&self) -> Result<(), StratifyrError> {
        self.conn()?.batch_execute(SCHEMA).map_err(query_error)
    }

    fn insert_bars(&self, bars: &[Bar]) -> Result<usize, StratifyrError> {
        let mut conn = self.conn()?;
        let mut tx = conn.transaction().map_err(query_error)?;
        for bar in bars {
            tx.execute(
                "INSERT INTO bars (security_id, date, open, high, low, close, volume)
                 VALUES ($1, $2, $3, $4, $5, $6, $7)
                 ON CONFLICT (security_id, date) DO UPDATE
                 SET open = EXCLUDED.open, high = EXCLUDED.high, low = EXCLUDED.low,
                     close = EXCLUDED.close, volume = EXCLUDED.volume",
                &[
                    &bar.security_id,
                    &bar.date,
                    &bar.open,
                    &bar.high,
                    &bar.low,
                    &bar.close,
                    &bar.volume,
                ],
            )
            .map_err(query_error)?;
        }
        tx.commit().map_err(query_error)?;
        Ok(bars.len())
    }

    fn insert_holidays(&self, holidays: &[MarketHoliday]) -> Result<usize, StratifyrError> {
        let mut conn = self.conn()?;
        let mut tx = conn.transaction().map_err(query_error)?;
        for holiday in holidays {
            tx.execute(
                "INSERT INTO market_holidays (date, description) VALUES ($1, $2)
                 ON CONFLICT (date) DO UPDATE SET description = EXCLUDED.description",
                &[&holiday.date, &holiday.description],
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
        MetricDefinition::new(0, name, family, period)?;

        let row = self
            .conn()?
            .query_one(
                "INSERT INTO metrics (name, family, period) VALUES ($1, $2, $3) RETURNING id",
                &[&name, &family.as_str(), &period],
            )
            .map_err(query_error)?;
        MetricDefinition::new(row.get(0), name, family, period)
    }
}

impl BarPort for PostgresAdapter {
    fn bars_ending_at(
        &self,
        security_id: i64,
        cutoff: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Bar>, StratifyrError> {
        let rows = self
            .conn()?
            .query(
                "SELECT security_id, date, open, high, low, close, volume
                 FROM bars
                 WHERE security_id = $1 AND date <= $2
                 ORDER BY date DESC
                 LIMIT $3",
                &[&security_id, &cutoff, &(limit as i64)],
            )
            .map_err(query_error)?;
        Ok(rows.iter().map(bar_from_row).collect())
    }

    fn bars_on(&self, security_ids: &[i64], date: NaiveDate) -> Result<Vec<Bar>, StratifyrError> {
        if security_ids.is_empty() {
            return Ok(Vec::new());
        }
        let ids = security_ids.to_vec();
        let rows = self
            .conn()?
            .query(
                "SELECT security_id, date, open, high, low, close, volume
                 FROM bars
                 WHERE date = $1 AND security_id = ANY($2)
                 ORDER BY security_id",
                &[&date, &ids],
            )
            .map_err(query_error)?;
        Ok(rows.iter().map(bar_from_row).collect())
    }
}

impl HolidayPort for PostgresAdapter {
    fn holidays_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StratifyrError> {
        let rows = self
            .conn()?
            .query(
                "SELECT date FROM market_holidays WHERE date >= $1 AND date <= $2",
                &[&start, &end],
            )
            .map_err(query_error)?;
        Ok(rows.iter().map(|row| row.get(0)).collect())
    }
}

impl MetricDefinitionPort for PostgresAdapter {
    fn get_metric(&self, id: i64) -> Result<Option<MetricDefinition>, StratifyrError> {
        let row = self
            .conn()?
            .query_opt(
                "SELECT id, name, family, period FROM metrics WHERE id = $1",
                &[&id],
            )
            .map_err(query_error)?;
        row.as_ref().map(definition_from_row).transpose()
    }

    fn list_metrics(&self) -> Result<Vec<MetricDefinition>, StratifyrError> {
        let rows = self
            .conn()?
            .query("SELECT id, name, family, period FROM metrics ORDER BY id", &[])
            .map_err(query_error)?;
        rows.iter().map(definition_from_row).collect()
    }
}

impl MetricValuePort for PostgresAdapter {
    fn create_value(&self, value: &NewMetricValue) -> Result<ComputedMetricValue, StratifyrError> {
        let now = Utc::now();
        let row = self
            .conn()?
            .query_one(
                "INSERT INTO security_metrics (security_id, metric_id, date, value, created_at, updated_at)
                 VALUES ($1, $2, $3, $4, $5, $5)
                 RETURNING id, security_id, metric_id, date, value",
                &[
                    &value.security_id,
                    &value.metric_id,
                    &value.date,
                    &value.value,
                    &now,
                ],
            )
            .map_err(query_error)?;
        Ok(value_from_row(&row))
    }

    fn update_value(&self, id: i64, value: f64) -> Result<ComputedMetricValue, StratifyrError> {
        let row = self
            .conn()?
            .query_opt(
                "UPDATE security_metrics SET value = $1, updated_at = $2 WHERE id = $3
                 RETURNING id, security_id, metric_id, date, value",
                &[&value, &Utc::now(), &id],
            )
            .map_err(query_error)?;
        row.as_ref()
            .map(value_from_row)
            .ok_or(StratifyrError::NotFound {
                entity: "metric value",
                id,
            })
    }

    fn retrieve_value(&self, id: i64) -> Result<Option<ComputedMetricValue>, StratifyrError> {
        let row = self
            .conn()?
            .query_opt(
                "SELECT id, security_id, metric_id, date, value FROM security_metrics WHERE id = $1",
                &[&id],
            )
            .map_err(query_error)?;
        Ok(row.as_ref().map(value_from_row))
    }

    fn query_values(
        &self,
        filter: &MetricValueFilter,
    ) -> Result<Vec<ComputedMetricValue>, StratifyrError> {
        let mut clauses = Vec::new();
        let mut values: Vec<Box<dyn ToSql + Sync>> = Vec::new();

        if let Some(security_id) = filter.security_id {
            values.push(Box::new(security_id));
            clauses.push(format!("security_id = ${}", values.len()));
        }
        if let Some(metric_id) = filter.metric_id {
            values.push(Box::new(metric_id));
            clauses.push(format!("metric_id = ${}", values.len()));
        }
        if let Some(date) = filter.date {
            values.push(Box::new(date));
            clauses.push(format!("date = ${}", values.len()));
        }

        let mut query =
            "SELECT id, security_id, metric_id, date, value FROM security_metrics".to_string();
        if !clauses.is_empty() {
            query.push_str(" WHERE ");
            query.push_str(&clauses.join(" AND "));
        }
        query.push_str(" ORDER BY metric_id, date DESC, id");
        if let Some(limit) = filter.limit {
            values.push(Box::new(limit as i64));
            query.push_str(&format!(" LIMIT ${}", values.len()));
        }

        let params: Vec<&(dyn ToSql + Sync)> = values.iter().map(|v| v.as_ref()).collect();
        let rows = self
            .conn()?
            .query(query.as_str(), &params)
            .map_err(query_error)?;
        Ok(rows.iter().map(value_from_row).collect())
    }
}

impl MetricCachePort for PostgresAdapter {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        let row = self
            .pool
            .get()
            .map_err(cache_error)?
            .query_opt(
                "SELECT payload FROM metric_cache WHERE key = $1 AND expires_at > now()",
                &[&key],
            )
            .map_err(cache_error)?;
        Ok(row.map(|row| row.get(0)))
    }

    /// Upserts the entry and sweeps every expired one.
    fn set(&self, key: &str, payload: String, ttl: Duration) -> Result<(), CacheError> {
        let expires_at = chrono::Duration::from_std(ttl)
            .ok()
            .and_then(|ttl| Utc::now().checked_add_signed(ttl))
            .ok_or_else(|| CacheError::Payload {
                key: key.to_string(),
                reason: format!("ttl {ttl:?} overflows the clock"),
            })?;
        let mut conn = self.pool.get().map_err(cache_error)?;
        let mut tx = conn.transaction().map_err(cache_error)?;
        tx.execute("DELETE FROM metric_cache WHERE expires_at <= now()", &[])
            .map_err(cache_error)?;
        tx.execute(
            "INSERT INTO metric_cache (key, payload, expires_at) VALUES ($1, $2, $3)
             ON CONFLICT (key) DO UPDATE
             SET payload = EXCLUDED.payload, expires_at = EXCLUDED.expires_at",
            &[&key, &payload, &expires_at],
        )
        .map_err(cache_error)?;
        tx.commit().map_err(cache_error)
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.pool
            .get()
            .map_err(cache_error)?
            .execute("DELETE FROM metric_cache WHERE key = $1", &[&key])
            .map_err(cache_error)?;
        Ok(())
    }
}
