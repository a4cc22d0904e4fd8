//! Pipeline settings read from the `[cache]`, `[calendar]`, `[aggregator]`,
//! `[csv]` and `[logging]` config sections.
//!
//! Missing keys take their defaults; present but invalid or out-of-range values
//! are rejected with `ConfigInvalid` before anything is wired up.

use crate::domain::aggregator::DEFAULT_MAX_CONCURRENCY;
use crate::domain::error::StratifyrError;
use crate::domain::metric_cache::DEFAULT_TTL_HOURS;
use crate::domain::trading_calendar::{DEFAULT_LOOKBACK_DAYS, DEFAULT_MAX_RANGE_DAYS};
use crate::ports::config_port::ConfigPort;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_CACHE_SHARDS: i64 = 16;

pub const MAX_TTL_HOURS: i64 = 24 * 366 * 10;
pub const MAX_CACHE_SHARDS: i64 = 1024;
pub const MAX_CALENDAR_DAYS: i64 = 366 * 10;
pub const MAX_CONCURRENCY: i64 = 256;

/// Where cached metric sets live.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheBackend {
    /// A table in the configured database, shared by every process using it.
    #[default]
    Store,
    /// A map owned by the running process.
    Memory,
}

impl FromStr for CacheBackend {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "store" => Ok(CacheBackend::Store),
            "memory" => Ok(CacheBackend::Memory),
            other => Err(format!("unknown cache backend '{other}', expected store or memory")),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl FromStr for LogFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "text" => Ok(LogFormat::Text),
            "json" => Ok(LogFormat::Json),
            other => Err(format!("unknown log format '{other}', expected text or json")),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct CacheSettings {
    pub enabled: bool,
    pub backend: CacheBackend,
    pub ttl_hours: u64,
    pub shards: usize,
}

#[derive(Debug, Clone, PartialEq)]
pub struct CalendarSettings {
    pub lookback_days: i64,
    pub max_range_days: i64,
}

/// CSV files served as the bar and holiday source instead of the store.
#[derive(Debug, Clone, PartialEq)]
pub struct CsvSource {
    pub bars: PathBuf,
    pub holidays: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LoggingSettings {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ServiceConfig {
    pub cache: CacheSettings,
    pub calendar: CalendarSettings,
    pub max_concurrency: usize,
    pub csv: Option<CsvSource>,
    pub logging: LoggingSettings,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            cache: CacheSettings {
                enabled: true,
                backend: CacheBackend::Store,
                ttl_hours: DEFAULT_TTL_HOURS,
                shards: DEFAULT_CACHE_SHARDS as usize,
            },
            calendar: CalendarSettings {
                lookback_days: DEFAULT_LOOKBACK_DAYS,
                max_range_days: DEFAULT_MAX_RANGE_DAYS,
            },
            max_concurrency: DEFAULT_MAX_CONCURRENCY,
            csv: None,
            logging: LoggingSettings {
                level: "info".to_string(),
                format: LogFormat::Text,
            },
        }
    }
}

impl ServiceConfig {
    pub fn from_config(config: &dyn ConfigPort) -> Result<Self, StratifyrError> {
        let ttl_hours = bounded_int(
            config,
            "cache",
            "ttl_hours",
            DEFAULT_TTL_HOURS as i64,
            MAX_TTL_HOURS,
        )?;
        let shards = bounded_int(
            config,
            "cache",
            "shards",
            DEFAULT_CACHE_SHARDS,
            MAX_CACHE_SHARDS,
        )?;
        let lookback_days = bounded_int(
            config,
            "calendar",
            "lookback_days",
            DEFAULT_LOOKBACK_DAYS,
            MAX_CALENDAR_DAYS,
        )?;
        let max_range_days = bounded_int(
            config,
            "calendar",
            "max_range_days",
            DEFAULT_MAX_RANGE_DAYS,
            MAX_CALENDAR_DAYS,
        )?;
        let max_concurrency = bounded_int(
            config,
            "aggregator",
            "max_concurrency",
            DEFAULT_MAX_CONCURRENCY as i64,
            MAX_CONCURRENCY,
        )?;
        let backend = match config.get_string("cache", "backend") {
            Some(raw) => raw
                .parse::<CacheBackend>()
                .map_err(|reason| StratifyrError::ConfigInvalid {
                    section: "cache".to_string(),
                    key: "backend".to_string(),
                    reason,
                })?,
            None => CacheBackend::Store,
        };

        Ok(Self {
            cache: CacheSettings {
                enabled: config.get_bool("cache", "enabled", true),
                backend,
                ttl_hours: ttl_hours as u64,
                shards: shards as usize,
            },
            calendar: CalendarSettings {
                lookback_days,
                max_range_days,
            },
            max_concurrency: max_concurrency as usize,
            csv: csv_source(config)?,
            logging: logging_settings(config)?,
        })
    }

    pub fn cache_ttl(&self) -> Duration {
        Duration::from_secs(self.cache.ttl_hours.saturating_mul(3600))
    }
}

fn bounded_int(
    config: &dyn ConfigPort,
    section: &str,
    key: &str,
    default: i64,
    max: i64,
) -> Result<i64, StratifyrError> {
    let invalid = |reason: String| StratifyrError::ConfigInvalid {
        section: section.to_string(),
        key: key.to_string(),
        reason,
    };
    let value = match config.get_string(section, key) {
        Some(raw) => raw
            .trim()
            .parse::<i64>()
            .map_err(|_| invalid(format!("'{raw}' is not an integer")))?,
        None => default,
    };
    if value <= 0 {
        return Err(invalid(format!("{key} must be positive")));
    }
    if value > max {
        return Err(invalid(format!("{key} must be at most {max}")));
    }
    Ok(value)
}

fn csv_source(config: &dyn ConfigPort) -> Result<Option<CsvSource>, StratifyrError> {
    let bars = config.get_string("csv", "bars_path");
    let holidays = config.get_string("csv", "holidays_path").map(PathBuf::from);
    match bars {
        Some(bars) => Ok(Some(CsvSource {
            bars: PathBuf::from(bars),
            holidays,
        })),
        None if holidays.is_some() => Err(StratifyrError::ConfigMissing {
            section: "csv".to_string(),
            key: "bars_path".to_string(),
        }),
        None => Ok(None),
    }
}

fn logging_settings(config: &dyn ConfigPort) -> Result<LoggingSettings, StratifyrError> {
    let level = config
        .get_string("logging", "level")
        .map(|l| l.trim().to_lowercase())
        .unwrap_or_else(|| "info".to_string());
    if !matches!(
        level.as_str(),
        "trace" | "debug" | "info" | "warn" | "error" | "off"
    ) {
        return Err(StratifyrError::ConfigInvalid {
            section: "logging".to_string(),
            key: "level".to_string(),
            reason: format!("unknown level '{level}'"),
        });
    }

    let format = match config.get_string("logging", "format") {
        Some(raw) => raw
            .parse::<LogFormat>()
            .map_err(|reason| StratifyrError::ConfigInvalid {
                section: "logging".to_string(),
                key: "format".to_string(),
                reason,
            })?,
        None => LogFormat::Text,
    };

    Ok(LoggingSettings { level, format })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapConfig(HashMap<(String, String), String>);

    impl MapConfig {
        fn new(entries: &[(&str, &str, &str)]) -> Self {
            Self(
                entries
                    .iter()
                    .map(|(s, k, v)| ((s.to_string(), k.to_string()), v.to_string()))
                    .collect(),
            )
        }
    }

    impl ConfigPort for MapConfig {
        fn get_string(&self, section: &str, key: &str) -> Option<String> {
            self.0.get(&(section.to_string(), key.to_string())).cloned()
        }

        fn get_int(&self, section: &str, key: &str, default: i64) -> i64 {
            self.get_string(section, key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        }

        fn get_double(&self, section: &str, key: &str, default: f64) -> f64 {
            self.get_string(section, key)
                .and_then(|v| v.trim().parse().ok())
                .unwrap_or(default)
        }

        fn get_bool(&self, section: &str, key: &str, default: bool) -> bool {
            match self.get_string(section, key).as_deref() {
                Some("true") => true,
                Some("false") => false,
                _ => default,
            }
        }
    }

    #[test]
    fn empty_config_uses_defaults() {
        let cfg = ServiceConfig::from_config(&MapConfig::new(&[])).unwrap();
        assert_eq!(cfg, ServiceConfig::default());
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(972 * 3600));
    }

    #[test]
    fn overrides_are_read() {
        let cfg = ServiceConfig::from_config(&MapConfig::new(&[
            ("cache", "enabled", "false"),
            ("cache", "ttl_hours", "24"),
            ("cache", "shards", "4"),
            ("calendar", "lookback_days", "30"),
            ("calendar", "max_range_days", "31"),
            ("aggregator", "max_concurrency", "8"),
            ("logging", "level", "DEBUG"),
            ("logging", "format", "json"),
        ]))
        .unwrap();
        assert!(!cfg.cache.enabled);
        assert_eq!(cfg.cache.ttl_hours, 24);
        assert_eq!(cfg.cache.shards, 4);
        assert_eq!(cfg.calendar.lookback_days, 30);
        assert_eq!(cfg.calendar.max_range_days, 31);
        assert_eq!(cfg.max_concurrency, 8);
        assert_eq!(cfg.logging.level, "debug");
        assert_eq!(cfg.logging.format, LogFormat::Json);
    }

    #[test]
    fn non_positive_rejected() {
        let err = ServiceConfig::from_config(&MapConfig::new(&[(
            "aggregator",
            "max_concurrency",
            "0",
        )]))
        .unwrap_err();
        assert!(matches!(
            err,
            StratifyrError::ConfigInvalid { ref key, .. } if key == "max_concurrency"
        ));
    }

    #[test]
    fn non_numeric_rejected() {
        let err =
            ServiceConfig::from_config(&MapConfig::new(&[("cache", "ttl_hours", "three years")]))
                .unwrap_err();
        assert!(matches!(
            err,
            StratifyrError::ConfigInvalid { ref key, .. } if key == "ttl_hours"
        ));
    }

    #[test]
    fn huge_lookback_rejected() {
        let err = ServiceConfig::from_config(&MapConfig::new(&[(
            "calendar",
            "lookback_days",
            "200000000",
        )]))
        .unwrap_err();
        assert!(matches!(
            err,
            StratifyrError::ConfigInvalid { ref section, ref key, .. }
                if section == "calendar" && key == "lookback_days"
        ));
    }

    #[test]
    fn huge_ttl_rejected() {
        let err = ServiceConfig::from_config(&MapConfig::new(&[(
            "cache",
            "ttl_hours",
            "6000000000000000",
        )]))
        .unwrap_err();
        assert!(matches!(
            err,
            StratifyrError::ConfigInvalid { ref key, .. } if key == "ttl_hours"
        ));
    }

    #[test]
    fn upper_bounds_are_inclusive() {
        let (ttl, shards, days, workers) = (
            MAX_TTL_HOURS.to_string(),
            MAX_CACHE_SHARDS.to_string(),
            MAX_CALENDAR_DAYS.to_string(),
            MAX_CONCURRENCY.to_string(),
        );
        let cfg = ServiceConfig::from_config(&MapConfig::new(&[
            ("cache", "ttl_hours", ttl.as_str()),
            ("cache", "shards", shards.as_str()),
            ("calendar", "lookback_days", days.as_str()),
            ("calendar", "max_range_days", days.as_str()),
            ("aggregator", "max_concurrency", workers.as_str()),
        ]))
        .unwrap();
        assert_eq!(
            cfg.cache_ttl(),
            Duration::from_secs(MAX_TTL_HOURS as u64 * 3600)
        );

        for (section, key, over) in [
            ("cache", "shards", MAX_CACHE_SHARDS + 1),
            ("calendar", "max_range_days", MAX_CALENDAR_DAYS + 1),
            ("aggregator", "max_concurrency", MAX_CONCURRENCY + 1),
        ] {
            let over = over.to_string();
            let err = ServiceConfig::from_config(&MapConfig::new(&[(section, key, over.as_str())]))
                .unwrap_err();
            assert!(matches!(err, StratifyrError::ConfigInvalid { .. }), "{key}");
        }
    }

    #[test]
    fn oversized_ttl_saturates() {
        let mut cfg = ServiceConfig::default();
        cfg.cache.ttl_hours = u64::MAX;
        assert_eq!(cfg.cache_ttl(), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn cache_backend_parsed() {
        let cfg =
            ServiceConfig::from_config(&MapConfig::new(&[("cache", "backend", "Memory")])).unwrap();
        assert_eq!(cfg.cache.backend, CacheBackend::Memory);

        let err = ServiceConfig::from_config(&MapConfig::new(&[("cache", "backend", "redis")]))
            .unwrap_err();
        assert!(matches!(
            err,
            StratifyrError::ConfigInvalid { ref key, .. } if key == "backend"
        ));
    }

    #[test]
    fn csv_source_needs_bars_path() {
        let cfg = ServiceConfig::from_config(&MapConfig::new(&[
            ("csv", "bars_path", "/data/bars.csv"),
            ("csv", "holidays_path", "/data/holidays.csv"),
        ]))
        .unwrap();
        assert_eq!(
            cfg.csv,
            Some(CsvSource {
                bars: PathBuf::from("/data/bars.csv"),
                holidays: Some(PathBuf::from("/data/holidays.csv")),
            })
        );

        let err = ServiceConfig::from_config(&MapConfig::new(&[(
            "csv",
            "holidays_path",
            "/data/holidays.csv",
        )]))
        .unwrap_err();
        assert!(matches!(
            err,
            StratifyrError::ConfigMissing { ref key, .. } if key == "bars_path"
        ));
    }

    #[test]
    fn unknown_log_format_rejected() {
        let err = ServiceConfig::from_config(&MapConfig::new(&[("logging", "format", "xml")]))
            .unwrap_err();
        assert!(matches!(
            err,
            StratifyrError::ConfigInvalid { ref key, .. } if key == "format"
        ));
    }

    #[test]
    fn unknown_log_level_rejected() {
        let err = ServiceConfig::from_config(&MapConfig::new(&[("logging", "level", "loud")]))
            .unwrap_err();
        assert!(matches!(err, StratifyrError::ConfigInvalid { .. }));
    }
}
