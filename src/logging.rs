//! tracing subscriber setup.

use crate::domain::config::{LogFormat, LoggingSettings};
use std::sync::Once;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// Builds the filter for `level`. A set `RUST_LOG` takes precedence.
pub fn env_filter(level: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level))
}

/// Installs the global subscriber. Later calls are no-ops, as is a call made
/// after some other subscriber has already been set.
pub fn init(settings: &LoggingSettings) {
    INIT.call_once(|| {
        let filter = env_filter(&settings.level);
        let installed = match settings.format {
            LogFormat::Json => tracing_subscriber::fmt()
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .try_init(),
            LogFormat::Text => tracing_subscriber::fmt()
                .with_target(true)
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .try_init(),
        };

        if installed.is_ok() {
            tracing::debug!(
                level = %settings.level,
                format = ?settings.format,
                "logging initialized"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_twice_is_harmless() {
        let settings = LoggingSettings {
            level: "warn".to_string(),
            format: LogFormat::Text,
        };
        init(&settings);
        init(&LoggingSettings {
            level: "debug".to_string(),
            format: LogFormat::Json,
        });
    }

    #[test]
    fn filter_accepts_configured_levels() {
        for level in ["trace", "debug", "info", "warn", "error", "off"] {
            let filter = env_filter(level);
            assert!(!filter.to_string().is_empty());
        }
    }
}
