//! Trading-day calendar.
//!
//! A date is a trading day when it is a weekday and not a market holiday.
//! Every query walks backward from its upper bound one calendar day at a time
//! and fetches holidays once for the whole scan window.

use crate::domain::error::{RangeError, StratifyrError};
use crate::ports::holiday_port::HolidayPort;
use chrono::{Datelike, Days, NaiveDate, Weekday};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::sync::Arc;

pub const DEFAULT_LOOKBACK_DAYS: i64 = 365;
pub const DEFAULT_MAX_RANGE_DAYS: i64 = 366;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketHoliday {
    pub date: NaiveDate,
    pub description: String,
}

/// The forms a trading-day request can take.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MarketDayQuery {
    /// The `n` most recent trading days up to today.
    LastNDays(usize),
    /// The `n` most recent trading days up to `reference`.
    LastNDaysFrom { n: usize, reference: NaiveDate },
    /// Every trading day in `[start, end]`.
    Between { start: NaiveDate, end: NaiveDate },
}

pub fn is_weekend(date: NaiveDate) -> bool {
    matches!(date.weekday(), Weekday::Sat | Weekday::Sun)
}

pub struct TradingCalendar {
    holidays: Arc<dyn HolidayPort + Send + Sync>,
    lookback_days: i64,
    max_range_days: i64,
}

impl TradingCalendar {
    pub fn new(holidays: Arc<dyn HolidayPort + Send + Sync>) -> Self {
        Self {
            holidays,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            max_range_days: DEFAULT_MAX_RANGE_DAYS,
        }
    }

    pub fn with_limits(mut self, lookback_days: i64, max_range_days: i64) -> Self {
        self.lookback_days = lookback_days;
        self.max_range_days = max_range_days;
        self
    }

    pub fn lookback_days(&self) -> i64 {
        self.lookback_days
    }

    pub fn max_range_days(&self) -> i64 {
        self.max_range_days
    }

    /// Up to `n` trading days on or before `reference`, most recent first.
    ///
    /// The walk stops at the lookback backstop, so fewer than `n` days may come
    /// back; callers must check the length.
    pub fn trading_days_ending_at(
        &self,
        reference: NaiveDate,
        n: usize,
    ) -> Result<Vec<NaiveDate>, StratifyrError> {
        if n as i64 > self.max_range_days {
            return Err(RangeError::TooLong {
                days: n as i64,
                max: self.max_range_days,
            }
            .into());
        }
        if n == 0 {
            return Ok(Vec::new());
        }
        let start = reference
            .checked_sub_days(Days::new(self.lookback_days.max(0) as u64))
            .unwrap_or(NaiveDate::MIN);
        self.walk_back(start, reference, n)
    }

    /// Every trading day in `[start, end]`, most recent first.
    pub fn trading_days_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StratifyrError> {
        if end < start {
            return Err(RangeError::Reversed { start, end }.into());
        }
        let days = (end - start).num_days() + 1;
        if days > self.max_range_days {
            return Err(RangeError::TooLong {
                days,
                max: self.max_range_days,
            }
            .into());
        }
        self.walk_back(start, end, days as usize)
    }

    /// Every trading day in `[start, end]`, oldest first.
    pub fn trading_days_between_ascending(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StratifyrError> {
        let mut days = self.trading_days_between(start, end)?;
        days.reverse();
        Ok(days)
    }

    /// The most recent trading day on or before `today`, if any within the lookback.
    pub fn latest_trading_day(&self, today: NaiveDate) -> Result<Option<NaiveDate>, StratifyrError> {
        Ok(self.trading_days_ending_at(today, 1)?.into_iter().next())
    }

    pub fn query(
        &self,
        query: MarketDayQuery,
        today: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StratifyrError> {
        match query {
            MarketDayQuery::LastNDays(n) => self.trading_days_ending_at(today, n),
            MarketDayQuery::LastNDaysFrom { n, reference } => {
                self.trading_days_ending_at(reference, n)
            }
            MarketDayQuery::Between { start, end } => self.trading_days_between(start, end),
        }
    }

    fn walk_back(
        &self,
        start: NaiveDate,
        end: NaiveDate,
        n: usize,
    ) -> Result<Vec<NaiveDate>, StratifyrError> {
        let holidays: HashSet<NaiveDate> = self
            .holidays
            .holidays_between(start, end)?
            .into_iter()
            .collect();

        let mut days = Vec::with_capacity(n.min(256));
        let mut date = end;
        while days.len() < n && date >= start {
            if !is_weekend(date) && !holidays.contains(&date) {
                days.push(date);
            }
            match date.pred_opt() {
                Some(prev) => date = prev,
                None => break,
            }
        }
        Ok(days)
    }
}
