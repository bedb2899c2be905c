//! Command parsing and execution for messages received from clients.

use crate::aggregator::RateAggregator;
use crate::command_log::CommandLog;
use crate::core::{ClientHandle, ExchangeQuery, RateError, WindowFetch};
use crate::registry::{BroadcastReport, ClientRegistry};
use std::sync::Arc;
use tracing::{debug, info, warn};

pub const EXCHANGE_COMMAND: &str = "exchange";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// `exchange`, optionally followed by `<days> [CODES]` overriding the
    /// server's default query.
    Exchange {
        days: Option<u32>,
        currencies: Option<Vec<String>>,
    },
    Unrecognized(String),
}

impl Command {
    pub fn parse(text: &str) -> Result<Self, RateError> {
        let mut parts = text.split_whitespace();
        if parts.next() != Some(EXCHANGE_COMMAND) {
            return Ok(Command::Unrecognized(text.to_string()));
        }

        let days = parts
            .next()
            .map(|d| {
                d.parse::<u32>()
                    .map_err(|_| RateError::InvalidQuery(format!("'{d}' is not a number of days")))
            })
            .transpose()?;
        let currencies = parts.next().map(ExchangeQuery::parse_codes);

        if parts.next().is_some() {
            return Err(RateError::InvalidQuery(
                "usage: exchange [days] [CODE,CODE,...]".to_string(),
            ));
        }

        Ok(Command::Exchange { days, currencies })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// The exchange result was logged and the log pushed to every client.
    Broadcast(BroadcastReport),
    /// Logged without a broadcast.
    Logged,
    /// Failed; the sender was told why.
    Rejected(String),
}

/// Executes client commands against the shared log and registry.
pub struct CommandDispatcher {
    aggregator: RateAggregator,
    log: Arc<CommandLog>,
    registry: Arc<ClientRegistry>,
    default_query: ExchangeQuery,
    max_days: u32,
}

impl CommandDispatcher {
    pub fn new(
        aggregator: RateAggregator,
        log: Arc<CommandLog>,
        registry: Arc<ClientRegistry>,
        default_query: ExchangeQuery,
        max_days: u32,
    ) -> Self {
        Self {
            aggregator,
            log,
            registry,
            default_query,
            max_days,
        }
    }

    pub fn registry(&self) -> Arc<ClientRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn log(&self) -> Arc<CommandLog> {
        Arc::clone(&self.log)
    }

    pub async fn handle(&self, sender: &ClientHandle, text: &str) -> DispatchOutcome {
        let outcome = match Command::parse(text) {
            Ok(Command::Exchange { days, currencies }) => {
                self.exchange(sender, days, currencies).await
            }
            Ok(Command::Unrecognized(message)) => self.record(&message).await,
            Err(e) => Err(e.to_string()),
        };

        match outcome {
            Ok(outcome) => outcome,
            Err(reason) => {
                warn!(client = %sender.id(), %reason, "Command failed");
                // The sender may already be gone; nothing else to do then
                let _ = sender.deliver(&format!("error: {reason}"));
                DispatchOutcome::Rejected(reason)
            }
        }
    }

    fn build_query(
        &self,
        days: Option<u32>,
        currencies: Option<Vec<String>>,
    ) -> Result<ExchangeQuery, RateError> {
        if days.is_none() && currencies.is_none() {
            return Ok(self.default_query.clone());
        }
        let days = days.unwrap_or_else(|| self.default_query.window_days());
        match currencies {
            Some(codes) => ExchangeQuery::new(codes, days, self.max_days),
            None => ExchangeQuery::new(self.default_query.currencies(), days, self.max_days),
        }
    }

    async fn exchange(
        &self,
        sender: &ClientHandle,
        days: Option<u32>,
        currencies: Option<Vec<String>>,
    ) -> Result<DispatchOutcome, String> {
        let query = self.build_query(days, currencies).map_err(|e| e.to_string())?;
        let fetch = self
            .aggregator
            .fetch_window(&query)
            .await
            .map_err(|e| e.to_string())?;

        let lines = fetch.format_lines();
        let payload = if lines.is_empty() {
            EXCHANGE_COMMAND.to_string()
        } else {
            format!("{EXCHANGE_COMMAND}\n{lines}")
        };

        // Only the fetch above is cancelled when the sender goes away. Once
        // results are in they are logged and broadcast to everyone.
        let task = tokio::spawn(publish(
            Arc::clone(&self.log),
            Arc::clone(&self.registry),
            sender.clone(),
            payload,
            fetch,
            query.window_days() + 1,
        ));
        task.await
            .map_err(|e| format!("broadcast task failed: {e}"))?
    }

    async fn record(&self, message: &str) -> Result<DispatchOutcome, String> {
        self.log
            .append(message)
            .await
            .map_err(|e| format!("{e:#}"))?;
        debug!("Logged unrecognized command");
        Ok(DispatchOutcome::Logged)
    }
}

async fn publish(
    log: Arc<CommandLog>,
    registry: Arc<ClientRegistry>,
    sender: ClientHandle,
    payload: String,
    fetch: WindowFetch,
    window_len: u32,
) -> Result<DispatchOutcome, String> {
    log.append(&payload).await.map_err(|e| format!("{e:#}"))?;

    let snapshot = log.snapshot_all().await;
    let report = registry.broadcast(&snapshot).await;
    info!(
        client = %sender.id(),
        records = fetch.records.len(),
        delivered = report.delivered,
        "Exchange command broadcast"
    );

    if let Some(partial) = fetch.partial_failure() {
        let _ = sender.deliver(&format!(
            "warning: {} of {} dates could not be fetched",
            partial.failed_count, window_len
        ));
    }

    Ok(DispatchOutcome::Broadcast(report))
}
