//! Volume Moving Average: arithmetic mean of volume over the window.

use crate::domain::bar::Bar;

pub fn calculate_vma(window: &[Bar]) -> f64 {
    if window.is_empty() {
        return 0.0;
    }
    window.iter().map(|b| b.volume as f64).sum::<f64>() / window.len() as f64
}
