//! Maps raw indicator values onto a comparable score using the reference bar.
//!
//! Scores are transient: they depend on the reference bar of the day being
//! served, so they are recomputed on every read and never stored.

use crate::domain::bar::Bar;
use crate::domain::metric::MetricFamily;

const RSI_OVERBOUGHT: f64 = 70.0;
const RSI_OVERSOLD: f64 = 30.0;

/// Normalizes `raw` for `family` against `reference`.
///
/// Returns `None` when the reference bar has a zero close or volume and the
/// family divides by it.
pub fn normalize(family: MetricFamily, raw: f64, reference: &Bar) -> Option<f64> {
    match family {
        MetricFamily::Sma | MetricFamily::Ema => relative_distance(reference.close, raw),
        MetricFamily::Rsi => {
            let base = raw / 100.0;
            let score = if raw > RSI_OVERBOUGHT {
                RSI_OVERBOUGHT / 100.0 - base
            } else if raw < RSI_OVERSOLD {
                base - RSI_OVERSOLD / 100.0
            } else {
                base
            };
            Some(score)
        }
        MetricFamily::Roc => Some(raw / 100.0),
        MetricFamily::Atr => (reference.close != 0.0).then(|| raw / reference.close),
        MetricFamily::Vma => relative_distance(reference.volume as f64, raw),
    }
}

/// Normalizes when the family is known; values without a definition pass through.
pub fn normalize_or_identity(
    family: Option<MetricFamily>,
    raw: f64,
    reference: &Bar,
) -> Option<f64> {
    match family {
        Some(family) => normalize(family, raw, reference),
        None => Some(raw),
    }
}

fn relative_distance(reference: f64, raw: f64) -> Option<f64> {
    (reference != 0.0).then(|| (reference - raw) / reference)
}
