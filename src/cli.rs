//! CLI definition and dispatch.

use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::Serialize;
use std::fmt::Display;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::adapters::csv_adapter::{self, CsvAdapter};
use crate::adapters::file_config_adapter::FileConfigAdapter;
use crate::adapters::memory_cache_adapter::MemoryCacheAdapter;
use crate::adapters::system_clock_adapter::SystemClock;
use crate::domain::config::{CacheBackend, ServiceConfig};
use crate::domain::error::StratifyrError;
use crate::domain::metric::MetricFamily;
use crate::domain::service::{SecurityMetricsService, SecurityWithMetrics, ServicePorts, ValueSource};
use crate::domain::trading_calendar::MarketDayQuery;
use crate::domain::universe::Universe;
use crate::logging;
use crate::ports::bar_port::BarPort;
use crate::ports::cache_port::{CacheError, MetricCachePort};
use crate::ports::clock_port::ClockPort;
use crate::ports::holiday_port::HolidayPort;
use crate::ports::metric_port::MetricDefinitionPort;
use crate::ports::metric_value_port::MetricValuePort;
use crate::ports::store_admin_port::StoreAdminPort;

#[derive(Parser, Debug)]
#[command(name = "stratifyr", about = "Derived technical metrics for securities")]
pub struct Cli {
    /// INI configuration file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,
    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create the store schema
    InitDb,
    /// Load daily bars from a CSV file
    ImportBars { file: PathBuf },
    /// Load market holidays from a CSV file
    ImportHolidays { file: PathBuf },
    /// Register a metric definition
    DefineMetric {
        name: String,
        /// sma, ema, rsi, roc, atr or vma
        family: String,
        period: i64,
    },
    /// List trading days
    TradingDays {
        #[command(subcommand)]
        query: DaysQuery,
    },
    /// Compute one metric for a security
    Compute {
        security: i64,
        metric: i64,
        /// Cutoff date; defaults to today
        #[arg(long)]
        date: Option<NaiveDate>,
    },
    /// Store a metric value
    Record {
        security: i64,
        metric: i64,
        date: NaiveDate,
        #[arg(long, conflicts_with = "calculate", required_unless_present = "calculate")]
        value: Option<f64>,
        /// Compute the value from stored bars
        #[arg(long)]
        calculate: bool,
    },
    /// Change a stored metric value
    Update {
        id: i64,
        #[arg(long)]
        value: Option<f64>,
    },
    /// Stored metric values for a security on a date
    Values { security: i64, date: NaiveDate },
    /// Latest bar and normalized metrics for a security
    Show { security: i64 },
    /// Same as show, for a comma-separated list of securities
    ShowMany { securities: String },
}

#[derive(Subcommand, Debug)]
pub enum DaysQuery {
    /// The last N trading days
    Last {
        n: usize,
        /// Count back from this date instead of today
        #[arg(long)]
        from: Option<NaiveDate>,
    },
    /// Every trading day in a range, newest first
    Between { start: NaiveDate, end: NaiveDate },
}

impl From<DaysQuery> for MarketDayQuery {
    fn from(query: DaysQuery) -> Self {
        match query {
            DaysQuery::Last { n, from: None } => MarketDayQuery::LastNDays(n),
            DaysQuery::Last {
                n,
                from: Some(reference),
            } => MarketDayQuery::LastNDaysFrom { n, reference },
            DaysQuery::Between { start, end } => MarketDayQuery::Between { start, end },
        }
    }
}

/// Everything a command needs from the backing store.
pub trait Store:
    BarPort
    + HolidayPort
    + MetricDefinitionPort
    + MetricValuePort
    + MetricCachePort
    + StoreAdminPort
    + Send
    + Sync
{
}

impl<T> Store for T where
    T: BarPort
        + HolidayPort
        + MetricDefinitionPort
        + MetricValuePort
        + MetricCachePort
        + StoreAdminPort
        + Send
        + Sync
{
}

pub fn run(cli: Cli) -> ExitCode {
    let config = match load_config(cli.config.as_deref()) {
        Ok(c) => c,
        Err(code) => return code,
    };
    let settings = match ServiceConfig::from_config(&config) {
        Ok(s) => s,
        Err(e) => return report(&e),
    };
    logging::init(&settings.logging);

    match open_store(&config) {
        Ok(store) => execute(store, &settings, cli.command, cli.json),
        Err(e) => report(&e),
    }
}

pub fn load_config(path: Option<&Path>) -> Result<FileConfigAdapter, ExitCode> {
    match path {
        Some(path) => FileConfigAdapter::from_file(path).map_err(|e| {
            eprintln!("error: {e}");
            ExitCode::from(&e)
        }),
        None => Ok(FileConfigAdapter::empty()),
    }
}

/// Picks PostgreSQL when built with it and a connection string is configured,
/// SQLite otherwise.
fn open_store(config: &FileConfigAdapter) -> Result<Arc<dyn Store>, StratifyrError> {
    #[cfg(feature = "postgres")]
    {
        use crate::adapters::postgres_adapter::PostgresAdapter;
        use crate::ports::config_port::ConfigPort;

        if config.get_string("postgres", "connection_string").is_some() {
            info!("opening postgres store");
            return Ok(Arc::new(PostgresAdapter::from_config(config)?));
        }
    }

    #[cfg(feature = "sqlite")]
    {
        use crate::adapters::sqlite_adapter::SqliteAdapter;

        config.require_string("sqlite", "path")?;
        info!("opening sqlite store");
        Ok(Arc::new(SqliteAdapter::from_config(config)?))
    }

    #[cfg(not(feature = "sqlite"))]
    {
        let _ = config;
        Err(StratifyrError::ConfigMissing {
            section: "postgres".into(),
            key: "connection_string".into(),
        })
    }
}

/// Wires the service over `store`.
///
/// Bars and holidays come from the `[csv]` files when configured. Cached metric
/// sets live in the store unless `[cache] backend = memory`.
pub fn build_service(
    store: Arc<dyn Store>,
    settings: &ServiceConfig,
) -> Result<SecurityMetricsService, StratifyrError> {
    let (bars, holidays): (
        Arc<dyn BarPort + Send + Sync>,
        Arc<dyn HolidayPort + Send + Sync>,
    ) = match &settings.csv {
        Some(source) => {
            let csv = Arc::new(CsvAdapter::from_files(
                &source.bars,
                source.holidays.as_deref(),
            )?);
            info!(
                bars = csv.bar_count(),
                holidays = csv.holiday_count(),
                "serving market data from csv"
            );
            let bars: Arc<dyn BarPort + Send + Sync> = csv.clone();
            (bars, csv)
        }
        None => (
            Arc::new(StorePort(store.clone())),
            Arc::new(StorePort(store.clone())),
        ),
    };
    let cache: Arc<dyn MetricCachePort + Send + Sync> = match settings.cache.backend {
        CacheBackend::Store => Arc::new(StorePort(store.clone())),
        CacheBackend::Memory => Arc::new(MemoryCacheAdapter::new(settings.cache.shards)),
    };

    let ports = ServicePorts {
        bars,
        holidays,
        metrics: Arc::new(StorePort(store.clone())),
        values: Arc::new(StorePort(store)),
        cache,
        clock: Arc::new(SystemClock),
    };
    SecurityMetricsService::new(ports, settings)
}

pub fn execute(
    store: Arc<dyn Store>,
    settings: &ServiceConfig,
    command: Command,
    json: bool,
) -> ExitCode {
    match dispatch(store, settings, command, json) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => report(&e),
    }
}

fn dispatch(
    store: Arc<dyn Store>,
    settings: &ServiceConfig,
    command: Command,
    json: bool,
) -> Result<(), StratifyrError> {
    match command {
        Command::InitDb => {
            store.initialize_schema()?;
            info!("schema initialized");
            emit(json, &"ok", |_| println!("schema initialized"))
        }
        Command::ImportBars { file } => {
            info!(file = %file.display(), "importing bars");
            let bars = csv_adapter::read_bars_file(&file)?;
            let written = store.insert_bars(&bars)?;
            info!(rows = written, "bars imported");
            emit(json, &written, |n| println!("imported {n} bars"))
        }
        Command::ImportHolidays { file } => {
            info!(file = %file.display(), "importing holidays");
            let holidays = csv_adapter::read_holidays_file(&file)?;
            let written = store.insert_holidays(&holidays)?;
            info!(rows = written, "holidays imported");
            emit(json, &written, |n| println!("imported {n} holidays"))
        }
        Command::DefineMetric {
            name,
            family,
            period,
        } => {
            let family: MetricFamily = family.parse()?;
            if period <= 0 {
                return Err(StratifyrError::InvalidPeriod { period });
            }
            let metric = store.define_metric(&name, family, period as usize)?;
            info!(id = metric.id, %metric, "metric defined");
            emit(json, &metric, |m| println!("{}\t{}\t{}", m.id, m.name, m))
        }
        Command::TradingDays { query } => {
            let service = build_service(store, settings)?;
            let days = service.get_trading_days(query.into())?;
            emit(json, &days, |days| print_lines(days))
        }
        Command::Compute {
            security,
            metric,
            date,
        } => {
            let service = build_service(store, settings)?;
            let cutoff = date.unwrap_or_else(|| SystemClock.today());
            let value = service.compute_indicator(security, metric, cutoff)?;
            emit(json, &value, |v| println!("{v}"))
        }
        Command::Record {
            security,
            metric,
            date,
            value,
            calculate: _,
        } => {
            let service = build_service(store, settings)?;
            let source = value.map_or(ValueSource::Calculate, ValueSource::Given);
            let stored = service.record_metric_value(security, metric, date, source)?;
            info!(id = stored.id, security, metric, %date, "metric value recorded");
            emit(json, &stored, |v| println!("{}\t{}", v.id, v.value))
        }
        Command::Update { id, value } => {
            let service = build_service(store, settings)?;
            let updated = service.update_metric_value(id, value)?;
            info!(id, "metric value updated");
            emit(json, &updated, |v| println!("{}\t{}", v.id, v.value))
        }
        Command::Values { security, date } => {
            let service = build_service(store, settings)?;
            let values = service.metric_values_for(security, date)?;
            emit(json, &values, |values| {
                for v in values {
                    println!("{}\t{}\t{}\t{}", v.id, v.metric_id, v.date, v.value);
                }
            })
        }
        Command::Show { security } => {
            let service = build_service(store, settings)?;
            let assembled = service.get_security_with_metrics(security)?;
            emit(json, &assembled, print_security)
        }
        Command::ShowMany { securities } => {
            let universe: Universe = securities.parse()?;
            info!(count = universe.count(), "assembling securities");
            let service = build_service(store, settings)?;
            let assembled = service.get_securities_with_metrics(&universe.security_ids)?;
            emit(json, &assembled, |all| all.iter().for_each(print_security))
        }
    }
}

fn emit<T: Serialize>(json: bool, value: &T, text: impl FnOnce(&T)) -> Result<(), StratifyrError> {
    if json {
        let rendered = serde_json::to_string_pretty(value).map_err(|e| StratifyrError::Io(e.into()))?;
        println!("{rendered}");
    } else {
        text(value);
    }
    Ok(())
}

fn print_lines<T: Display>(items: &[T]) {
    for item in items {
        println!("{item}");
    }
}

fn print_security(s: &SecurityWithMetrics) {
    match (&s.trading_day, &s.bar) {
        (Some(day), Some(bar)) => println!(
            "security {} on {day}: close {} volume {}",
            s.security_id, bar.close, bar.volume
        ),
        (Some(day), None) => println!("security {} on {day}: no bar", s.security_id),
        (None, _) => println!("security {}: no trading day", s.security_id),
    }
    for m in &s.metrics {
        let name = m
            .metric
            .as_ref()
            .map_or_else(|| format!("metric {}", m.value.metric_id), |d| d.name.clone());
        match m.normalized_value {
            Some(n) => println!("  {name}\t{}\t{n}", m.value.value),
            None => println!("  {name}\t{}", m.value.value),
        }
    }
}

fn report(err: &StratifyrError) -> ExitCode {
    if err.is_collaborator_failure() {
        error!(error = %err, "store unavailable");
    } else {
        warn!(error = %err, "command rejected");
    }
    eprintln!("error: {err}");
    ExitCode::from(err)
}

/// Exposes one facet of a shared [`Store`] as its own port object.
struct StorePort(Arc<dyn Store>);

impl BarPort for StorePort {
    fn bars_ending_at(
        &self,
        security_id: i64,
        cutoff: NaiveDate,
        limit: usize,
    ) -> Result<Vec<crate::domain::bar::Bar>, StratifyrError> {
        self.0.bars_ending_at(security_id, cutoff, limit)
    }

    fn bars_on(
        &self,
        security_ids: &[i64],
        date: NaiveDate,
    ) -> Result<Vec<crate::domain::bar::Bar>, StratifyrError> {
        self.0.bars_on(security_ids, date)
    }
}

impl HolidayPort for StorePort {
    fn holidays_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StratifyrError> {
        self.0.holidays_between(start, end)
    }
}

impl MetricDefinitionPort for StorePort {
    fn get_metric(
        &self,
        id: i64,
    ) -> Result<Option<crate::domain::metric::MetricDefinition>, StratifyrError> {
        self.0.get_metric(id)
    }

    fn list_metrics(&self) -> Result<Vec<crate::domain::metric::MetricDefinition>, StratifyrError> {
        self.0.list_metrics()
    }
}

impl MetricValuePort for StorePort {
    fn create_value(
        &self,
        value: &crate::domain::metric::NewMetricValue,
    ) -> Result<crate::domain::metric::ComputedMetricValue, StratifyrError> {
        self.0.create_value(value)
    }

    fn update_value(
        &self,
        id: i64,
        value: f64,
    ) -> Result<crate::domain::metric::ComputedMetricValue, StratifyrError> {
        self.0.update_value(id, value)
    }

    fn retrieve_value(
        &self,
        id: i64,
    ) -> Result<Option<crate::domain::metric::ComputedMetricValue>, StratifyrError> {
        self.0.retrieve_value(id)
    }

    fn query_values(
        &self,
        filter: &crate::domain::metric::MetricValueFilter,
    ) -> Result<Vec<crate::domain::metric::ComputedMetricValue>, StratifyrError> {
        self.0.query_values(filter)
    }
}

impl MetricCachePort for StorePort {
    fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        self.0.get(key)
    }

    fn set(&self, key: &str, payload: String, ttl: std::time::Duration) -> Result<(), CacheError> {
        self.0.set(key, payload, ttl)
    }

    fn delete(&self, key: &str) -> Result<(), CacheError> {
        self.0.delete(key)
    }
}
