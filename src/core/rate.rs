//! Exchange rate abstractions and core types

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use std::collections::BTreeSet;
use std::fmt::Display;

use super::error::{PartialFetchFailure, RateError};

/// Upper bound on the number of days a single query may look back.
pub const MAX_WINDOW_DAYS: u32 = 10;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeRateRecord {
    pub date: NaiveDate,
    pub currency: String,
    pub rate: Decimal,
}

impl Display for ExchangeRateRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}\t{}\t{}", self.date, self.currency, self.rate)
    }
}

/// A validated request for `window_days + 1` days of rates ending today.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExchangeQuery {
    currencies: BTreeSet<String>,
    window_days: u32,
}

impl ExchangeQuery {
    /// Normalizes the codes (trimmed, uppercased, blanks dropped) and checks
    /// the window against `max_days`, which itself may never exceed
    /// [`MAX_WINDOW_DAYS`].
    pub fn new<I, S>(currencies: I, window_days: u32, max_days: u32) -> Result<Self, RateError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let currencies: BTreeSet<String> = currencies
            .into_iter()
            .map(|c| c.as_ref().trim().to_uppercase())
            .filter(|c| !c.is_empty())
            .collect();

        if currencies.is_empty() {
            return Err(RateError::InvalidQuery(
                "at least one currency code is required".to_string(),
            ));
        }

        let limit = max_days.min(MAX_WINDOW_DAYS);
        if window_days > limit {
            return Err(RateError::InvalidQuery(format!(
                "window of {window_days} days exceeds the maximum of {limit}"
            )));
        }

        Ok(Self {
            currencies,
            window_days,
        })
    }

    /// Parses a comma separated list such as `eur, usd`.
    pub fn parse_codes(codes: &str) -> Vec<String> {
        codes.split(',').map(|c| c.trim().to_uppercase()).collect()
    }

    pub fn currencies(&self) -> &BTreeSet<String> {
        &self.currencies
    }

    pub fn window_days(&self) -> u32 {
        self.window_days
    }

    /// Inclusive, ascending list of dates ending at `today`.
    pub fn dates_ending(&self, today: NaiveDate) -> Vec<NaiveDate> {
        let start = today - chrono::Duration::days(i64::from(self.window_days));
        start.iter_days().take(self.window_days as usize + 1).collect()
    }
}

/// Records gathered for a window, along with the dates that could not be fetched.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowFetch {
    pub records: Vec<ExchangeRateRecord>,
    pub failed_dates: Vec<NaiveDate>,
}

impl WindowFetch {
    pub fn partial_failure(&self) -> Option<PartialFetchFailure> {
        if self.failed_dates.is_empty() {
            None
        } else {
            Some(PartialFetchFailure {
                failed_count: self.failed_dates.len(),
            })
        }
    }

    /// One `<date>\t<currency>\t<rate>` line per record.
    pub fn format_lines(&self) -> String {
        self.records
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join("\n")
    }
}

#[async_trait]
pub trait RateProvider: Send + Sync {
    async fn fetch(
        &self,
        date: NaiveDate,
        currencies: &BTreeSet<String>,
    ) -> Result<Vec<ExchangeRateRecord>, RateError>;
}
