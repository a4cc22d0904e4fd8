//! CSV file adapter for bars and market holidays.
//!
//! Bars files have the header `security_id,date,open,high,low,close,volume`;
//! holiday files have `date,description`. The import commands read them into
//! the store; configured under `[csv]`, the same files are read whole and
//! served from memory as the bar and holiday source.

use crate::domain::bar::Bar;
use crate::domain::error::StratifyrError;
use crate::domain::trading_calendar::MarketHoliday;
use crate::ports::bar_port::BarPort;
use crate::ports::holiday_port::HolidayPort;
use chrono::NaiveDate;
use std::collections::HashMap;
use std::fmt::Display;
use std::fs;
use std::io::Read;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Default)]
pub struct CsvAdapter {
    /// Per security, newest first.
    bars: HashMap<i64, Vec<Bar>>,
    holidays: Vec<MarketHoliday>,
}

fn parse_error(line: u64, reason: impl Display) -> StratifyrError {
    StratifyrError::Database {
        reason: format!("CSV parse error on line {line}: {reason}"),
    }
}

fn field<T>(record: &csv::StringRecord, idx: usize, name: &str) -> Result<T, StratifyrError>
where
    T: FromStr,
    T::Err: Display,
{
    let line = record.position().map(|p| p.line()).unwrap_or(0);
    record
        .get(idx)
        .ok_or_else(|| parse_error(line, format!("missing {name} column")))?
        .trim()
        .parse()
        .map_err(|e| parse_error(line, format!("invalid {name} value: {e}")))
}

fn date_field(record: &csv::StringRecord, idx: usize) -> Result<NaiveDate, StratifyrError> {
    let raw: String = field(record, idx, "date")?;
    NaiveDate::parse_from_str(&raw, "%Y-%m-%d").map_err(|e| {
        let line = record.position().map(|p| p.line()).unwrap_or(0);
        parse_error(line, format!("invalid date format: {e}"))
    })
}

pub fn read_bars<R: Read>(reader: R) -> Result<Vec<Bar>, StratifyrError> {
    let mut rdr = csv::Reader::from_reader(reader);
    let mut bars = Vec::new();

    for result in rdr.records() {
        let record = result.map_err(|e| parse_error(0, e))?;
        bars.push(Bar {
            security_id: field(&record, 0, "security_id")?,
            date: date_field(&record, 1)?,
            open: field(&record, 2, "open")?,
            high: field(&record, 3, "high")?,
            low: field(&record, 4, "low")?,
            close: field(&record, 5, "close")?,
            volume: field(&record, 6, "volume")?,
        });
    }

    Ok(bars)
}

pub fn read_holidays<R: Read>(reader: R) -> Result<Vec<MarketHoliday>, StratifyrError> {
    let mut rdr = csv::ReaderBuilder::new().flexible(true).from_reader(reader);
    let mut holidays = Vec::new();

    for result in rdr.records() {
        let record = result.map_err(|e| parse_error(0, e))?;
        holidays.push(MarketHoliday {
            date: date_field(&record, 0)?,
            description: record.get(1).unwrap_or("").trim().to_string(),
        });
    }

    Ok(holidays)
}

pub fn read_bars_file(path: &Path) -> Result<Vec<Bar>, StratifyrError> {
    read_bars(fs::File::open(path)?)
}

pub fn read_holidays_file(path: &Path) -> Result<Vec<MarketHoliday>, StratifyrError> {
    read_holidays(fs::File::open(path)?)
}

impl CsvAdapter {
    /// Indexes bars by security. A later row for the same (security, date) wins.
    pub fn new(bars: Vec<Bar>, holidays: Vec<MarketHoliday>) -> Self {
        let mut by_security: HashMap<i64, HashMap<NaiveDate, Bar>> = HashMap::new();
        for bar in bars {
            by_security
                .entry(bar.security_id)
                .or_default()
                .insert(bar.date, bar);
        }

        let bars = by_security
            .into_iter()
            .map(|(security_id, by_date)| {
                let mut series: Vec<Bar> = by_date.into_values().collect();
                series.sort_by(|a, b| b.date.cmp(&a.date));
                (security_id, series)
            })
            .collect();

        Self { bars, holidays }
    }

    pub fn from_files(
        bars_path: &Path,
        holidays_path: Option<&Path>,
    ) -> Result<Self, StratifyrError> {
        let bars = read_bars_file(bars_path)?;
        let holidays = match holidays_path {
            Some(path) => read_holidays_file(path)?,
            None => Vec::new(),
        };
        Ok(Self::new(bars, holidays))
    }

    pub fn bar_count(&self) -> usize {
        self.bars.values().map(Vec::len).sum()
    }

    pub fn holiday_count(&self) -> usize {
        self.holidays.len()
    }
}

impl BarPort for CsvAdapter {
    fn bars_ending_at(
        &self,
        security_id: i64,
        cutoff: NaiveDate,
        limit: usize,
    ) -> Result<Vec<Bar>, StratifyrError> {
        Ok(self
            .bars
            .get(&security_id)
            .map(|series| {
                series
                    .iter()
                    .filter(|b| b.date <= cutoff)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    fn bars_on(&self, security_ids: &[i64], date: NaiveDate) -> Result<Vec<Bar>, StratifyrError> {
        Ok(security_ids
            .iter()
            .filter_map(|id| self.bars.get(id))
            .filter_map(|series| series.iter().find(|b| b.date == date))
            .cloned()
            .collect())
    }
}

impl HolidayPort for CsvAdapter {
    fn holidays_between(
        &self,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<Vec<NaiveDate>, StratifyrError> {
        Ok(self
            .holidays
            .iter()
            .map(|h| h.date)
            .filter(|d| *d >= start && *d <= end)
            .collect())
    }
}
