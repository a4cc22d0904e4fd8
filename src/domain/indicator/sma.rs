//! Simple Moving Average: arithmetic mean of close over the window.

use crate::domain::bar::Bar;

pub fn calculate_sma(window: &[Bar]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    window.iter().map(|b| b.close).sum::<f64>() / window.len() as f64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::indicator::test_support::window_from_closes;

    #[test]
    fn sma_mean_of_closes() {
        let window = window_from_closes(&[10.0, 20.0, 30.0]);
        assert!((calculate_sma(&window) - 20.0).abs() < f64::EPSILON);
    }

    #[test]
    fn sma_single_bar() {
        let window = window_from_closes(&[42.5]);
        assert!((calculate_sma(&window) - 42.5).abs() < f64::EPSILON);
    }

    #[test]
    fn sma_empty_window() {
        assert_eq!(calculate_sma(&[]), 0.0);
    }
}
