//! Configuration for the market engine

use crate::engine::EngineParams;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Market configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Data directory for the event log (RocksDB)
    pub data_dir: PathBuf,

    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Metrics listen address
    pub metrics_listen_addr: String,

    /// Economic parameters
    pub economy: EconomyConfig,

    /// RocksDB configuration
    pub rocksdb: RocksDbConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("./data/market"),
            service_name: "market-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            metrics_listen_addr: "0.0.0.0:9090".to_string(),
            economy: EconomyConfig::default(),
            rocksdb: RocksDbConfig::default(),
        }
    }
}

/// Fixed economic parameters
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EconomyConfig {
    /// One-time credit grant per account
    pub grant_amount: u64,

    /// Fixed ticket price
    pub ticket_price: u64,
}

impl Default for EconomyConfig {
    fn default() -> Self {
        Self {
            grant_amount: 1000,
            ticket_price: 100,
        }
    }
}

/// RocksDB configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RocksDbConfig {
    /// Write buffer size (MB)
    pub write_buffer_size_mb: usize,

    /// Max write buffers
    pub max_write_buffer_number: i32,

    /// Max background jobs (compaction + flush)
    pub max_background_jobs: i32,

    /// Enable statistics
    pub enable_statistics: bool,
}

impl Default for RocksDbConfig {
    fn default() -> Self {
        Self {
            write_buffer_size_mb: 64,
            max_write_buffer_number: 4,
            max_background_jobs: 2,
            enable_statistics: false,
        }
    }
}

impl Config {
    /// Engine parameters derived from the economy section
    pub fn engine_params(&self) -> EngineParams {
        EngineParams {
            grant_amount: self.economy.grant_amount,
            ticket_price: self.economy.ticket_price,
        }
    }

    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        Ok(config)
    }

    /// Load defaults with environment variable overrides
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();

        if let Ok(data_dir) = std::env::var("MARKET_DATA_DIR") {
            config.data_dir = PathBuf::from(data_dir);
        }

        if let Ok(addr) = std::env::var("MARKET_METRICS_ADDR") {
            config.metrics_listen_addr = addr;
        }

        if let Ok(amount) = std::env::var("MARKET_GRANT_AMOUNT") {
            config.economy.grant_amount = amount
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid grant amount: {}", e)))?;
        }

        if let Ok(price) = std::env::var("MARKET_TICKET_PRICE") {
            config.economy.ticket_price = price
                .parse()
                .map_err(|e| crate::Error::Config(format!("Invalid ticket price: {}", e)))?;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.service_name, "market-core");
        assert_eq!(config.economy.grant_amount, 1000);
        assert_eq!(config.economy.ticket_price, 100);
    }

    #[test]
    fn test_engine_params_follow_economy() {
        let mut config = Config::default();
        config.economy.ticket_price = 7;
        assert_eq!(config.engine_params().ticket_price, 7);
    }

    #[test]
    fn test_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("market.toml");
        std::fs::write(
            &path,
            r#"
data_dir = "/tmp/market"
service_name = "market-core"
service_version = "0.1.0"
metrics_listen_addr = "0.0.0.0:9191"

[economy]
grant_amount = 500
ticket_price = 5

[rocksdb]
write_buffer_size_mb = 32
max_write_buffer_number = 2
max_background_jobs = 1
enable_statistics = false
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.economy.grant_amount, 500);
        assert_eq!(config.metrics_listen_addr, "0.0.0.0:9191");
    }
}
