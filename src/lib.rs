pub mod aggregator;
pub mod cli;
pub mod command_log;
pub mod core;
pub mod providers;
pub mod registry;
pub mod server;

use crate::core::ExchangeQuery;
use crate::core::config::AppConfig;
use anyhow::Result;
use tracing::{debug, info};

/// Command line overrides for the default exchange query.
#[derive(Debug, Clone, Default)]
pub struct QueryOverrides {
    pub currencies: Option<String>,
    pub days: Option<u32>,
}

#[derive(Debug, Clone)]
pub enum AppCommand {
    Serve {
        host: Option<String>,
        port: Option<u16>,
        query: QueryOverrides,
    },
    Rates(QueryOverrides),
    Send {
        url: Option<String>,
        message: String,
    },
}

fn load_config(config_path: Option<&str>) -> Result<AppConfig> {
    let config = match config_path {
        Some(path) => AppConfig::load_from_path(path)?,
        None => AppConfig::load()?,
    };
    debug!("Loaded config: {config:#?}");
    Ok(config)
}

fn apply_overrides(config: &mut AppConfig, overrides: QueryOverrides) -> Result<()> {
    if let Some(codes) = overrides.currencies {
        config.exchange.currencies = ExchangeQuery::parse_codes(&codes);
    }
    if let Some(days) = overrides.days {
        config.exchange.days = days;
    }
    config.validate()
}

pub async fn run_command(command: AppCommand, config_path: Option<&str>) -> Result<()> {
    let mut config = load_config(config_path)?;

    match command {
        AppCommand::Serve { host, port, query } => {
            if let Some(host) = host {
                config.server.host = host;
            }
            if let Some(port) = port {
                config.server.port = port;
            }
            apply_overrides(&mut config, query)?;

            let server = server::BroadcastServer::from_config(&config).await?;
            info!("Ratecast starting...");
            server
                .run_until(async {
                    let _ = tokio::signal::ctrl_c().await;
                })
                .await
        }
        AppCommand::Rates(query) => {
            apply_overrides(&mut config, query)?;
            let query = config.exchange.default_query()?;
            cli::rates::run(&config, &query).await
        }
        AppCommand::Send { url, message } => {
            let url = url.unwrap_or_else(|| format!("ws://{}", config.server.bind_addr()));
            cli::client::run(&url, &message).await
        }
    }
}
