//! Exponential Moving Average.
//!
//! k = 2/(n+1). Seed with the SMA of the oldest n closes, then walk forward to
//! the newest bar: EMA = C*k + EMA*(1-k). A window of exactly n bars has no bar
//! after the seed, so its EMA equals its SMA.

use crate::domain::bar::Bar;

/// `window` is newest first and holds at least `period` bars.
pub fn calculate_ema(window: &[Bar], period: usize) -> f64 {
    if period == 0 || window.len() < period {
        return 0.0;
    }

    let k = 2.0 / (period as f64 + 1.0);
    let oldest_first: Vec<f64> = window.iter().rev().map(|b| b.close).collect();

    let seed = oldest_first[..period].iter().sum::<f64>() / period as f64;

    oldest_first[period..]
        .iter()
        .fold(seed, |ema, &close| close * k + ema * (1.0 - k))
}
