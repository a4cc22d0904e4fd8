//! Daily bar access port.

use crate::domain::bar::Bar;
use crate::domain::error::StratifyrError;
use chrono::NaiveDate;

pub trait BarPort {
    /// The most recent `limit` bars dated on or before `cutoff`, newest first.
    fn bars_ending_at(
        &self,
        security_id: i64,
        cutoff: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Bar>, StratifyrError>;

    /// Bars dated exactly `date` for each of `security_ids` that has one.
    fn bars_on(&self, security_ids: &[i64], date: NaiveDate) -> Result<Vec<Bar>, StratifyrError>;
}
