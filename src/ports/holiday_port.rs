//! Market holiday access port.

use crate::domain::error::StratifyrError;
use chrono::NaiveDate;

pub trait HolidayPort {
    /// Holiday dates within `[start, end]`, in any order.
    fn holidays_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StratifyrError>;
}
