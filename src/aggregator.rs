//! Concurrent retrieval of a window of daily exchange rates.

use crate::core::{ExchangeQuery, ExchangeRateRecord, RateError, RateProvider, WindowFetch};
use crate::providers::util::with_retry;
use chrono::{Local, NaiveDate};
use futures::future::join_all;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

const RETRY_DELAY_MS: u64 = 500;

pub struct RateAggregator {
    provider: Arc<dyn RateProvider>,
    fetch_timeout: Duration,
    retries: usize,
}

impl RateAggregator {
    pub fn new(provider: Arc<dyn RateProvider>, fetch_timeout: Duration) -> Self {
        Self {
            provider,
            fetch_timeout,
            retries: 0,
        }
    }

    pub fn with_retries(mut self, retries: usize) -> Self {
        self.retries = retries;
        self
    }

    /// Fetches `[today - window_days, today]` using the local calendar date.
    pub async fn fetch_window(&self, query: &ExchangeQuery) -> Result<WindowFetch, RateError> {
        self.fetch_window_ending(query, Local::now().date_naive())
            .await
    }

    /// Fetches every date of the window concurrently. Records come back in
    /// ascending date order whatever order the requests finish in. Dates that
    /// fail are listed in [`WindowFetch::failed_dates`]; only a window where
    /// every date failed is an error.
    pub async fn fetch_window_ending(
        &self,
        query: &ExchangeQuery,
        today: NaiveDate,
    ) -> Result<WindowFetch, RateError> {
        let dates = query.dates_ending(today);
        debug!(
            dates = dates.len(),
            currencies = ?query.currencies(),
            "Fetching exchange rate window"
        );

        let futures = dates.iter().map(|&date| async move {
            let result = with_retry(|| self.fetch_one(date, query), self.retries, RETRY_DELAY_MS).await;
            (date, result)
        });
        // join_all yields results in input order
        let results = join_all(futures).await;

        let mut fetch = WindowFetch::default();
        let mut last_error = None;
        for (date, result) in results {
            match result {
                Ok(records) => fetch.records.extend(records),
                Err(e) => {
                    warn!(%date, error = %e, "Skipping date after failed fetch");
                    fetch.failed_dates.push(date);
                    last_error = Some(e);
                }
            }
        }

        if fetch.failed_dates.len() == dates.len() {
            let reason = last_error.map_or_else(|| "no dates fetched".to_string(), |e| e.to_string());
            return Err(RateError::unavailable(today, format!("every date failed, last error: {reason}")));
        }

        info!(
            records = fetch.records.len(),
            failed = fetch.failed_dates.len(),
            "Fetched exchange rate window"
        );
        Ok(fetch)
    }

    async fn fetch_one(
        &self,
        date: NaiveDate,
        query: &ExchangeQuery,
    ) -> Result<Vec<ExchangeRateRecord>, RateError> {
        match tokio::time::timeout(self.fetch_timeout, self.provider.fetch(date, query.currencies()))
            .await
        {
            Ok(result) => result,
            Err(_) => Err(RateError::unavailable(
                date,
                format!("timed out after {:?}", self.fetch_timeout),
            )),
        }
    }
}
