//! Metric definitions and computed metric values.
//!
//! - `MetricFamily`: the closed set of indicator formulas
//! - `IndicatorCategory`: what a family measures, fixed per family
//! - `MetricDefinition`: a named (family, period) pair owned by the metric store
//! - `ComputedMetricValue`: one indicator value for one security on one trading day
//! - `NormalizedMetric`: a value joined with its definition and normalized score

use crate::domain::error::StratifyrError;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum MetricFamily {
    Sma,
    Ema,
    Rsi,
    Roc,
    Atr,
    Vma,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum IndicatorCategory {
    Trend,
    Momentum,
    Volatility,
    Volume,
}

impl MetricFamily {
    pub const ALL: [MetricFamily; 6] = [
        MetricFamily::Sma,
        MetricFamily::Ema,
        MetricFamily::Rsi,
        MetricFamily::Roc,
        MetricFamily::Atr,
        MetricFamily::Vma,
    ];

    pub fn category(self) -> IndicatorCategory {
        match self {
            MetricFamily::Sma | MetricFamily::Ema => IndicatorCategory::Trend,
            MetricFamily::Rsi | MetricFamily::Roc => IndicatorCategory::Momentum,
            MetricFamily::Atr => IndicatorCategory::Volatility,
            MetricFamily::Vma => IndicatorCategory::Volume,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MetricFamily::Sma => "SMA",
            MetricFamily::Ema => "EMA",
            MetricFamily::Rsi => "RSI",
            MetricFamily::Roc => "ROC",
            MetricFamily::Atr => "ATR",
            MetricFamily::Vma => "VMA",
        }
    }
}

impl fmt::Display for MetricFamily {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MetricFamily {
    type Err = StratifyrError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_uppercase().as_str() {
            "SMA" => Ok(MetricFamily::Sma),
            "EMA" => Ok(MetricFamily::Ema),
            "RSI" => Ok(MetricFamily::Rsi),
            "ROC" => Ok(MetricFamily::Roc),
            "ATR" => Ok(MetricFamily::Atr),
            "VMA" => Ok(MetricFamily::Vma),
            _ => Err(StratifyrError::UnsupportedMetricFamily {
                family: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for IndicatorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            IndicatorCategory::Trend => "Trend",
            IndicatorCategory::Momentum => "Momentum",
            IndicatorCategory::Volatility => "Volatility",
            IndicatorCategory::Volume => "Volume",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDefinition {
    pub id: i64,
    pub name: String,
    pub family: MetricFamily,
    pub period: usize,
}

impl MetricDefinition {
    /// Builds a definition, rejecting non-positive periods.
    pub fn new(
        id: i64,
        name: impl Into<String>,
        family: MetricFamily,
        period: i64,
    ) -> Result<Self, StratifyrError> {
        if period <= 0 {
            return Err(StratifyrError::InvalidPeriod { period });
        }
        Ok(Self {
            id,
            name: name.into(),
            family,
            period: period as usize,
        })
    }

    pub fn category(&self) -> IndicatorCategory {
        self.family.category()
    }
}

impl fmt::Display for MetricDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({})", self.family, self.period)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ComputedMetricValue {
    pub id: i64,
    pub security_id: i64,
    pub metric_id: i64,
    pub date: NaiveDate,
    pub value: f64,
}

/// A value about to be persisted; the store assigns the id.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMetricValue {
    pub security_id: i64,
    pub metric_id: i64,
    pub date: NaiveDate,
    pub value: f64,
}

/// Filter for metric value queries. `limit: None` means unbounded.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct MetricValueFilter {
    pub security_id: Option<i64>,
    pub metric_id: Option<i64>,
    pub date: Option<NaiveDate>,
    pub limit: Option<usize>,
}

impl MetricValueFilter {
    pub fn for_security_on(security_id: i64, date: NaiveDate) -> Self {
        Self {
            security_id: Some(security_id),
            date: Some(date),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct NormalizedMetric {
    pub value: ComputedMetricValue,
    pub metric: Option<MetricDefinition>,
    pub normalized_value: Option<f64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn category_mapping_is_fixed() {
        assert_eq!(MetricFamily::Sma.category(), IndicatorCategory::Trend);
        assert_eq!(MetricFamily::Ema.category(), IndicatorCategory::Trend);
        assert_eq!(MetricFamily::Rsi.category(), IndicatorCategory::Momentum);
        assert_eq!(MetricFamily::Roc.category(), IndicatorCategory::Momentum);
        assert_eq!(MetricFamily::Atr.category(), IndicatorCategory::Volatility);
        assert_eq!(MetricFamily::Vma.category(), IndicatorCategory::Volume);
    }

    #[test]
    fn family_round_trips_through_display() {
        for family in MetricFamily::ALL {
            assert_eq!(family.to_string().parse::<MetricFamily>().unwrap(), family);
        }
    }

    #[test]
    fn family_parse_is_case_insensitive() {
        assert_eq!("rsi".parse::<MetricFamily>().unwrap(), MetricFamily::Rsi);
        assert_eq!(" Vma ".parse::<MetricFamily>().unwrap(), MetricFamily::Vma);
    }

    #[test]
    fn unknown_family_is_unsupported() {
        match "MACD".parse::<MetricFamily>() {
            Err(StratifyrError::UnsupportedMetricFamily { family }) => assert_eq!(family, "MACD"),
            other => panic!("expected UnsupportedMetricFamily, got {other:?}"),
        }
    }

    #[test]
    fn definition_rejects_non_positive_period() {
        assert!(matches!(
            MetricDefinition::new(1, "bad", MetricFamily::Sma, 0),
            Err(StratifyrError::InvalidPeriod { period: 0 })
        ));
        assert!(matches!(
            MetricDefinition::new(1, "bad", MetricFamily::Sma, -3),
            Err(StratifyrError::InvalidPeriod { period: -3 })
        ));
    }

    #[test]
    fn definition_display() {
        let def = MetricDefinition::new(4, "RSI 14", MetricFamily::Rsi, 14).unwrap();
        assert_eq!(def.to_string(), "RSI(14)");
        assert_eq!(def.category(), IndicatorCategory::Momentum);
    }

    #[test]
    fn filter_for_security_on_is_unbounded() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let filter = MetricValueFilter::for_security_on(9, date);
        assert_eq!(filter.security_id, Some(9));
        assert_eq!(filter.date, Some(date));
        assert_eq!(filter.metric_id, None);
        assert_eq!(filter.limit, None);
    }
}
