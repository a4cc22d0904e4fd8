//! Write-side store operations used by imports and metric definition.

use crate::domain::bar::Bar;
use crate::domain::error::StratifyrError;
use crate::domain::metric::{MetricDefinition, MetricFamily};
use crate::domain::trading_calendar::MarketHoliday;

pub trait StoreAdminPort {
    fn initialize_schema(&self) -> Result<(), StratifyrError>;

    /// Inserts or replaces bars keyed by (security, date). Returns rows written.
    fn insert_bars(&self, bars: &[Bar]) -> Result<usize, StratifyrError>;

    fn insert_holidays(&self, holidays: &[MarketHoliday]) -> Result<usize, StratifyrError>;

    fn define_metric(
        &self,
        name: &str,
        family: MetricFamily,
        period: usize,
    ) -> Result<MetricDefinition, StratifyrError>;
}
