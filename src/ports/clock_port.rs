//! Wall-clock port.

use chrono::{DateTime, NaiveDate, Utc};

pub trait ClockPort {
    fn now(&self) -> DateTime<Utc>;

    fn today(&self) -> NaiveDate {
        self.now().date_naive()
    }
}
