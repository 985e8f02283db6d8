use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use super::{AccountId, Cents, TransferRecord};

/// Inclusive calendar-date range, evaluated against UTC dates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Result<Self, DateRangeError> {
        if start > end {
            return Err(DateRangeError::StartAfterEnd { start, end });
        }
        // The exclusive upper bound is the day after `end`, which must exist.
        if end.succ_opt().is_none() {
            return Err(DateRangeError::EndOutOfRange(end));
        }
        Ok(Self { start, end })
    }

    /// Parse a `YYYY-MM-DD` pair.
    pub fn parse(start: &str, end: &str) -> Result<Self, DateRangeError> {
        let parse = |s: &str| {
            NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d")
                .map_err(|_| DateRangeError::InvalidDate(s.to_string()))
        };
        Self::new(parse(start)?, parse(end)?)
    }

    pub fn contains(&self, timestamp: DateTime<Utc>) -> bool {
        let date = timestamp.date_naive();
        self.start <= date && date <= self.end
    }

    /// Half-open `[start 00:00, day after end 00:00)` instant bounds.
    pub fn bounds(&self) -> (DateTime<Utc>, DateTime<Utc>) {
        let lower = self.start.and_time(chrono::NaiveTime::MIN).and_utc();
        let upper = self
            .end
            .checked_add_days(Days::new(1))
            .unwrap_or(NaiveDate::MAX)
            .and_time(chrono::NaiveTime::MIN)
            .and_utc();
        (lower, upper)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DateRangeError {
    InvalidDate(String),
    StartAfterEnd { start: NaiveDate, end: NaiveDate },
    EndOutOfRange(NaiveDate),
}

impl std::fmt::Display for DateRangeError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            DateRangeError::InvalidDate(s) => {
                write!(f, "invalid date '{}', expected YYYY-MM-DD", s)
            }
            DateRangeError::StartAfterEnd { start, end } => {
                write!(f, "start date {} is after end date {}", start, end)
            }
            DateRangeError::EndOutOfRange(end) => {
                write!(f, "end date {} is out of range", end)
            }
        }
    }
}

impl std::error::Error for DateRangeError {}

/// Net effect of a list of transfers on one account.
/// Incoming transfers add, outgoing transfers subtract, unrelated ones are ignored.
pub fn net_transfer_flow(account: AccountId, transfers: &[TransferRecord]) -> Cents {
    transfers.iter().map(|t| t.effect_on(account)).sum()
}
