//! Domain error types.

use crate::domain::universe::UniverseError;
use chrono::NaiveDate;

/// Rejection reasons for trading-day range queries.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RangeError {
    #[error("date range is too long: {days} days requested, at most {max} allowed")]
    TooLong { days: i64, max: i64 },

    #[error("date range ends before it starts: {start} to {end}")]
    Reversed { start: NaiveDate, end: NaiveDate },
}

/// Top-level error type for stratifyr.
#[derive(Debug, thiserror::Error)]
pub enum StratifyrError {
    #[error("database error: {reason}")]
    Database { reason: String },

    #[error("database query error: {reason}")]
    DatabaseQuery { reason: String },

    #[error("config parse error in {file}: {reason}")]
    ConfigParse { file: String, reason: String },

    #[error("missing config key [{section}] {key}")]
    ConfigMissing { section: String, key: String },

    #[error("invalid config value [{section}] {key}: {reason}")]
    ConfigInvalid {
        section: String,
        key: String,
        reason: String,
    },

    #[error("invalid range: {0}")]
    InvalidRange(#[from] RangeError),

    #[error("invalid universe: {0}")]
    InvalidUniverse(#[from] UniverseError),

    #[error("insufficient data: need {required} bars, have {available}")]
    InsufficientData { required: usize, available: usize },

    #[error("{family} is undefined: {reason}")]
    UndefinedValue {
        family: &'static str,
        reason: &'static str,
    },

    #[error("unsupported metric family: {family}")]
    UnsupportedMetricFamily { family: String },

    #[error("invalid metric period: {period}")]
    InvalidPeriod { period: i64 },

    #[error("{entity} {id} not found")]
    NotFound { entity: &'static str, id: i64 },

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl StratifyrError {
    /// True when the failure came from a store collaborator rather than the input.
    pub fn is_collaborator_failure(&self) -> bool {
        matches!(
            self,
            StratifyrError::Database { .. } | StratifyrError::DatabaseQuery { .. }
        )
    }
}

impl From<&StratifyrError> for std::process::ExitCode {
    fn from(err: &StratifyrError) -> Self {
        let code: u8 = match err {
            StratifyrError::Io(_) => 1,
            StratifyrError::ConfigParse { .. }
            | StratifyrError::ConfigMissing { .. }
            | StratifyrError::ConfigInvalid { .. } => 2,
            StratifyrError::Database { .. } | StratifyrError::DatabaseQuery { .. } => 3,
            StratifyrError::InvalidRange(_)
            | StratifyrError::InvalidUniverse(_)
            | StratifyrError::UnsupportedMetricFamily { .. }
            | StratifyrError::InvalidPeriod { .. } => 4,
            StratifyrError::InsufficientData { .. } | StratifyrError::UndefinedValue { .. } => 5,
            StratifyrError::NotFound { .. } => 6,
        };
        std::process::ExitCode::from(code)
    }
}
