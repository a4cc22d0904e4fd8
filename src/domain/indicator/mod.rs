//! Point-in-time technical indicators.
//!
//! Every calculator takes a window of bars ordered newest first (index 0 is the
//! cutoff day) and returns a single value. [`compute`] is the entry point: it
//! enforces the window length and dispatches on [`MetricFamily`].

pub mod atr;
pub mod ema;
pub mod roc;
pub mod rsi;
pub mod sma;
pub mod vma;

use crate::domain::bar::Bar;
use crate::domain::error::StratifyrError;
use crate::domain::metric::MetricFamily;

/// Computes `family(period)` over `bars_newest_first`.
///
/// Fails with `InsufficientData` when fewer than `period` bars are supplied; a
/// short window is never computed on. Extra bars beyond `period` are ignored.
/// A ROC over a zero base close fails with `UndefinedValue`.
pub fn compute(
    family: MetricFamily,
    period: usize,
    bars_newest_first: &[Bar],
) -> Result<f64, StratifyrError> {
    if period == 0 {
        return Err(StratifyrError::InvalidPeriod { period: 0 });
    }
    if bars_newest_first.len() < period {
        return Err(StratifyrError::InsufficientData {
            required: period,
            available: bars_newest_first.len(),
        });
    }

    let window = &bars_newest_first[..period];
    debug_assert!(
        window.windows(2).all(|w| w[0].date > w[1].date),
        "window must be strictly date-descending"
    );

    let value = match family {
        MetricFamily::Sma => sma::calculate_sma(window),
        MetricFamily::Ema => ema::calculate_ema(window, period),
        MetricFamily::Rsi => rsi::calculate_rsi(window),
        MetricFamily::Roc => {
            roc::calculate_roc(window).ok_or(StratifyrError::UndefinedValue {
                family: family.as_str(),
                reason: "oldest close in the window is zero",
            })?
        }
        MetricFamily::Atr => atr::calculate_atr(window),
        MetricFamily::Vma => vma::calculate_vma(window),
    };
    Ok(value)
}

#[cfg(test)]
pub(crate) mod test_support {
    use crate::domain::bar::Bar;
    use chrono::NaiveDate;

    /// Builds a newest-first window from closes given oldest first.
    pub fn window_from_closes(closes_oldest_first: &[f64]) -> Vec<Bar> {
        let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        let mut bars: Vec<Bar> = closes_oldest_first
            .iter()
            .enumerate()
            .map(|(i, &close)| Bar {
                security_id: 42,
                date: start + chrono::Duration::days(i as i64),
                open: close,
                high: close,
                low: close,
                close,
                volume: 1000,
            })
            .collect();
        bars.reverse();
        bars
    }
}
