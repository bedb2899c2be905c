//! Error taxonomy for rate retrieval and client delivery

use chrono::NaiveDate;
use thiserror::Error;

use super::client::ClientId;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RateError {
    /// Rejected before any network call is made.
    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("provider unavailable for {date}: {reason}")]
    ProviderUnavailable { date: NaiveDate, reason: String },

    #[error("malformed provider response for {date}: {reason}")]
    ProviderMalformed { date: NaiveDate, reason: String },
}

impl RateError {
    pub fn unavailable(date: NaiveDate, reason: impl ToString) -> Self {
        RateError::ProviderUnavailable {
            date,
            reason: reason.to_string(),
        }
    }

    pub fn malformed(date: NaiveDate, reason: impl ToString) -> Self {
        RateError::ProviderMalformed {
            date,
            reason: reason.to_string(),
        }
    }
}

/// Non-fatal outcome of a window fetch where some dates could not be retrieved.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PartialFetchFailure {
    pub failed_count: usize,
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    #[error("connection lost for client {0}")]
    ConnectionLost(ClientId),
}
