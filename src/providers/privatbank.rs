use crate::core::{ExchangeRateRecord, RateError, RateProvider};
use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::time::Duration;
use tracing::{debug, error, instrument};

const DATE_FORMAT: &str = "%d.%m.%Y";

#[derive(Debug, Deserialize)]
struct ArchiveResponse {
    date: String,
    #[serde(rename = "exchangeRate", default)]
    exchange_rate: Vec<ArchiveRate>,
}

#[derive(Debug, Deserialize)]
struct ArchiveRate {
    // Some rows only carry the base currency and no `currency` field.
    currency: Option<String>,
    #[serde(rename = "saleRate")]
    sale_rate: Option<Decimal>,
    #[serde(rename = "saleRateNB")]
    sale_rate_nb: Option<Decimal>,
}

/// Daily rates from the PrivatBank public exchange rate archive.
pub struct PrivatBankProvider {
    base_url: String,
    client: reqwest::Client,
}

impl PrivatBankProvider {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .user_agent("ratecast/1.0")
            .timeout(timeout)
            .build()?;
        Ok(PrivatBankProvider {
            base_url: base_url.trim_end_matches('/').to_string(),
            client,
        })
    }

    fn parse_response(
        requested: NaiveDate,
        body: &str,
        currencies: &BTreeSet<String>,
    ) -> Result<Vec<ExchangeRateRecord>, RateError> {
        let data: ArchiveResponse = serde_json::from_str(body).map_err(|e| {
            error!(error = ?e, response = %body, "Failed to parse exchange rate response");
            RateError::malformed(requested, e)
        })?;

        let date = NaiveDate::parse_from_str(&data.date, DATE_FORMAT)
            .map_err(|e| RateError::malformed(requested, format!("bad date '{}': {e}", data.date)))?;

        let records = data
            .exchange_rate
            .into_iter()
            .filter_map(|entry| {
                let currency = entry.currency?;
                if !currencies.contains(&currency) {
                    return None;
                }
                match entry.sale_rate.or(entry.sale_rate_nb) {
                    Some(rate) => Some(ExchangeRateRecord {
                        date,
                        currency,
                        rate,
                    }),
                    None => {
                        debug!(%currency, %date, "No sale rate published, skipping");
                        None
                    }
                }
            })
            .collect();

        Ok(records)
    }
}

#[async_trait]
impl RateProvider for PrivatBankProvider {
    #[instrument(name = "PrivatBankFetch", skip(self, currencies))]
    async fn fetch(
        &self,
        date: NaiveDate,
        currencies: &BTreeSet<String>,
    ) -> Result<Vec<ExchangeRateRecord>, RateError> {
        let url = format!(
            "{}/exchange_rates?json&date={}",
            self.base_url,
            date.format(DATE_FORMAT)
        );
        debug!("Requesting exchange rates from {}", url);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|e| RateError::unavailable(date, format!("request error: {e}")))?;

        if !response.status().is_success() {
            return Err(RateError::unavailable(
                date,
                format!("HTTP error: {}", response.status()),
            ));
        }

        let body = response
            .text()
            .await
            .map_err(|e| RateError::unavailable(date, format!("failed to read body: {e}")))?;

        let records = Self::parse_response(date, &body, currencies)?;
        debug!(count = records.len(), "Parsed exchange rates");
        Ok(records)
    }
}
