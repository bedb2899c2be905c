use super::ui;
use crate::aggregator::RateAggregator;
use crate::core::config::AppConfig;
use crate::core::{ExchangeQuery, WindowFetch};
use crate::providers::PrivatBankProvider;
use anyhow::Result;
use comfy_table::Cell;
use std::sync::Arc;

impl WindowFetch {
    pub fn display_as_table(&self) -> String {
        let mut table = ui::new_styled_table();
        table.set_header(vec![
            ui::header_cell("Date"),
            ui::header_cell("Currency"),
            ui::header_cell("Rate"),
        ]);

        for record in &self.records {
            table.add_row(vec![
                Cell::new(record.date.to_string()),
                Cell::new(&record.currency),
                ui::rate_cell(record.rate),
            ]);
        }

        let mut output = table.to_string();
        if !self.failed_dates.is_empty() {
            let failed: Vec<String> = self.failed_dates.iter().map(ToString::to_string).collect();
            output.push_str(&format!(
                "\n\n{} {}",
                ui::style_text("Could not fetch:", ui::StyleType::Error),
                ui::style_text(&failed.join(", "), ui::StyleType::Subtle)
            ));
        }
        output
    }
}

/// Fetches a window once and prints it, without starting the server.
pub async fn run(config: &AppConfig, query: &ExchangeQuery) -> Result<()> {
    let provider_config = &config.providers.privatbank;
    let provider = PrivatBankProvider::new(&provider_config.base_url, provider_config.timeout())?;
    let aggregator = RateAggregator::new(Arc::new(provider), provider_config.timeout())
        .with_retries(provider_config.retries);

    let pb = ui::new_spinner(&format!(
        "Fetching {} day(s) of rates",
        query.window_days() + 1
    ));
    let result = aggregator.fetch_window(query).await;
    pb.finish_and_clear();

    let fetch = result?;
    println!(
        "{}\n\n{}",
        ui::style_text("Exchange rates", ui::StyleType::Title),
        fetch.display_as_table()
    );
    Ok(())
}
