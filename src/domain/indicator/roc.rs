//! ROC (Rate of Change) over a single window.
//!
//! ROC = (C[0] - C[n-1]) / C[n-1], a fraction rather than a percentage.
//! A zero base close has no rate of change and yields `None`.

use crate::domain::bar::Bar;

pub fn calculate_roc(window: &[Bar]) -> Option<f64> {
    let (newest, oldest) = (window.first()?, window.last()?);

    if oldest.close == 0.0 {
        return None;
    }

    Some((newest.close - oldest.close) / oldest.close)
}
