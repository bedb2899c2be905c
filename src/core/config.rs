use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use std::{fs, path::PathBuf};
use tracing::debug;

use super::rate::{ExchangeQuery, MAX_WINDOW_DAYS};

pub const DEFAULT_PRIVATBANK_URL: &str = "https://api.privatbank.ua/p24api";

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            host: "localhost".to_string(),
            port: 5678,
        }
    }
}

impl ServerConfig {
    pub fn bind_addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct PrivatBankProviderConfig {
    pub base_url: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default)]
    pub retries: usize,
}

fn default_timeout_secs() -> u64 {
    10
}

impl Default for PrivatBankProviderConfig {
    fn default() -> Self {
        PrivatBankProviderConfig {
            base_url: DEFAULT_PRIVATBANK_URL.to_string(),
            timeout_secs: default_timeout_secs(),
            retries: 0,
        }
    }
}

impl PrivatBankProviderConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq, Default)]
pub struct ProvidersConfig {
    #[serde(default)]
    pub privatbank: PrivatBankProviderConfig,
}

/// Query used when a client sends a bare `exchange` command.
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct ExchangeConfig {
    pub currencies: Vec<String>,
    pub days: u32,
    #[serde(default = "default_max_days")]
    pub max_days: u32,
}

fn default_max_days() -> u32 {
    MAX_WINDOW_DAYS
}

impl Default for ExchangeConfig {
    fn default() -> Self {
        ExchangeConfig {
            currencies: vec!["EUR".to_string(), "USD".to_string()],
            days: 2,
            max_days: default_max_days(),
        }
    }
}

impl ExchangeConfig {
    pub fn default_query(&self) -> Result<ExchangeQuery> {
        ExchangeQuery::new(&self.currencies, self.days, self.max_days)
            .context("Invalid default exchange query")
    }
}

#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub providers: ProvidersConfig,
    #[serde(default)]
    pub exchange: ExchangeConfig,
    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,
}

fn default_log_path() -> PathBuf {
    PathBuf::from("exchange.log")
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            server: ServerConfig::default(),
            providers: ProvidersConfig::default(),
            exchange: ExchangeConfig::default(),
            log_path: default_log_path(),
        }
    }
}

impl AppConfig {
    /// Loads the config from the default location, falling back to built-in
    /// defaults when no file has been set up yet.
    pub fn load() -> Result<Self> {
        debug!("Loading default config");
        let config_path = Self::default_config_path()?;
        if !config_path.exists() {
            debug!(path = %config_path.display(), "No config file found, using defaults");
            return Ok(Self::default());
        }
        Self::load_from_path(&config_path)
    }

    pub fn default_config_path() -> Result<PathBuf> {
        let proj_dirs = ProjectDirs::from("io", "ratecast", "ratecast")
            .context("Could not determine project directories")?;
        Ok(proj_dirs.config_dir().join("config.yaml"))
    }

    pub fn load_from_path<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let config_str = fs::read_to_string(path.as_ref())
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Self = serde_yaml::from_str(&config_str)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;
        config.validate()?;
        debug!("Successfully loaded config");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.exchange.max_days > MAX_WINDOW_DAYS {
            bail!(
                "exchange.max_days is {} but may not exceed {}",
                self.exchange.max_days,
                MAX_WINDOW_DAYS
            );
        }
        if self.providers.privatbank.timeout_secs == 0 {
            bail!("providers.privatbank.timeout_secs must be positive");
        }
        self.exchange.default_query()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_deserialization() {
        let yaml_str = r#"
server:
  host: "0.0.0.0"
  port: 1234
providers:
  privatbank:
    base_url: "http://example.com/p24api"
    timeout_secs: 3
    retries: 2
exchange:
  currencies: ["EUR", "PLN"]
  days: 5
log_path: "/tmp/rates.log"
"#;

        let config: AppConfig = serde_yaml::from_str(yaml_str).expect("Failed to deserialize");
        assert_eq!(config.server.bind_addr(), "0.0.0.0:1234");
        assert_eq!(
            config.providers.privatbank.base_url,
            "http://example.com/p24api"
        );
        assert_eq!(config.providers.privatbank.timeout(), Duration::from_secs(3));
        assert_eq!(config.providers.privatbank.retries, 2);
        assert_eq!(config.exchange.currencies, vec!["EUR", "PLN"]);
        assert_eq!(config.exchange.days, 5);
        assert_eq!(config.exchange.max_days, MAX_WINDOW_DAYS);
        assert_eq!(config.log_path, PathBuf::from("/tmp/rates.log"));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_config_uses_defaults() {
        let config: AppConfig = serde_yaml::from_str("{}").expect("Failed to deserialize");
        assert_eq!(config, AppConfig::default());
        assert_eq!(config.providers.privatbank.base_url, DEFAULT_PRIVATBANK_URL);
        assert_eq!(config.providers.privatbank.timeout_secs, 10);
        assert_eq!(config.log_path, PathBuf::from("exchange.log"));
    }

    #[test]
    fn test_validate_rejects_max_days_above_policy() {
        let yaml_str = r#"
exchange:
  currencies: ["EUR"]
  days: 1
  max_days: 30
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("max_days"));
    }

    #[test]
    fn test_validate_rejects_invalid_default_query() {
        let yaml_str = r#"
exchange:
  currencies: []
  days: 1
"#;
        let config: AppConfig = serde_yaml::from_str(yaml_str).unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_load_from_path() -> Result<()> {
        let file = tempfile::NamedTempFile::new()?;
        fs::write(file.path(), "server:\n  host: 127.0.0.1\n  port: 9000\n")?;
        let config = AppConfig::load_from_path(file.path())?;
        assert_eq!(config.server.port, 9000);
        assert_eq!(config.exchange, ExchangeConfig::default());
        Ok(())
    }
}
