//! RSI (Relative Strength Index) over a single window.
//!
//! Walks the window oldest to newest summing positive close-to-close changes
//! into total gain and the magnitude of negative changes into total loss.
//!
//! Formula: RSI = 100 - (100 / (1 + total_gain / total_loss))
//! If total_loss == 0: RSI = 100

use crate::domain::bar::Bar;

pub fn calculate_rsi(window: &[Bar]) -> f64 {
    let mut total_gain = 0.0;
    let mut total_loss = 0.0;

    // Newest first, so pair[1] is the earlier day.
    for pair in window.windows(2) {
        let change = pair[0].close - pair[1].close;
        if change > 0.0 {
            total_gain += change;
        } else {
            total_loss += -change;
        }
    }

    if total_loss == 0.0 {
        return 100.0;
    }

    100.0 - (100.0 / (1.0 + total_gain / total_loss))
}
