//! Core business logic abstractions

pub mod client;
pub mod config;
pub mod error;
pub mod log;
pub mod rate;

// Re-export main types for cleaner imports
pub use client::{ClientHandle, ClientId, Outbox};
pub use error::{ClientError, PartialFetchFailure, RateError};
pub use rate::{ExchangeQuery, ExchangeRateRecord, MAX_WINDOW_DAYS, RateProvider, WindowFetch};
