//! ATR (Average True Range) over a single window.
//!
//! Sums the true range of each bar against the previous bar's close for the
//! n-1 consecutive pairs in the window, then divides by n. The divisor is the
//! period, not the pair count; stored values depend on it.

use crate::domain::bar::Bar;

pub fn calculate_atr(window: &[Bar]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }

    // Newest first, so pair[1] is the previous day.
    let total: f64 = window
        .windows(2)
        .map(|pair| pair[0].true_range(pair[1].close))
        .sum();

    total / window.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn make_bar(day: u32, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            security_id: 1,
            date: NaiveDate::from_ymd_opt(2024, 1, day).unwrap(),
            open: close,
            high,
            low,
            close,
            volume: 1000,
        }
    }

    #[test]
    fn atr_divides_by_period_not_pairs() {
        let window = vec![
            make_bar(3, 120.0, 110.0, 115.0),
            make_bar(2, 115.0, 105.0, 110.0),
            make_bar(1, 110.0, 100.0, 105.0),
        ];
        // Two pairs, each with true range 10; divided by 3 bars.
        let expected = (10.0 + 10.0) / 3.0;
        assert!((calculate_atr(&window) - expected).abs() < 1e-9);
    }

    #[test]
    fn atr_handles_gaps() {
        let window = vec![
            make_bar(3, 120.0, 110.0, 115.0),
            make_bar(2, 130.0, 120.0, 125.0),
            make_bar(1, 110.0, 100.0, 105.0),
        ];
        // Day 2 vs close 105: max(10, 25, 15) = 25. Day 3 vs close 125: max(10, 5, 15) = 15.
        let expected = (25.0 + 15.0) / 3.0;
        assert!((calculate_atr(&window) - expected).abs() < 1e-9);
    }

    #[test]
    fn atr_single_bar_is_zero() {
        let window = vec![make_bar(1, 110.0, 90.0, 100.0)];
        assert_eq!(calculate_atr(&window), 0.0);
    }

    #[test]
    fn atr_empty_window() {
        assert_eq!(calculate_atr(&[]), 0.0);
    }
}
