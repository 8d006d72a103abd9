//! Service configuration
//!
//! Layered as defaults, then an optional `config/price-history` file, then
//! `PRICE_HISTORY__*` environment variables. Credentials are read once here
//! and handed to the source clients explicitly.

use crate::types::{PriceHistoryError, Result};
use ::config::builder::DefaultState;
use ::config::{Config, ConfigBuilder, Environment, File};
use serde::Deserialize;

/// Legacy variable names still honoured for the two API keys
pub const COVALENT_KEY_VAR: &str = "COVALENT_KEY";
pub const GRAPH_API_KEY_VAR: &str = "GRAPH_API";

#[derive(Debug, Clone, Deserialize)]
pub struct PriceHistoryConfig {
    pub port: u16,
    pub covalent: CovalentConfig,
    pub gate_io: RestSourceConfig,
    pub kraken: RestSourceConfig,
    pub subgraph: SubgraphConfig,
    #[serde(default)]
    pub local: LocalConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CovalentConfig {
    pub api_key: Option<String>,
    pub base_url: String,
    pub chain_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RestSourceConfig {
    pub base_url: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SubgraphConfig {
    pub api_key: Option<String>,
    pub gateway_url: String,
    pub max_retries: u32,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LocalConfig {
    /// Directory holding exported `timestamp,close,volume` files
    pub data_dir: Option<String>,
}

impl PriceHistoryConfig {
    /// Load from `.env`, config file and environment, then validate
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();

        let mut config = Self::from_builder(
            Config::builder()
                .add_source(File::with_name("config/price-history").required(false))
                .add_source(
                    Environment::with_prefix("PRICE_HISTORY")
                        .separator("__")
                        .try_parsing(true),
                ),
        )?;

        config.apply_legacy_env(
            std::env::var(COVALENT_KEY_VAR).ok(),
            std::env::var(GRAPH_API_KEY_VAR).ok(),
        );
        config.validate()?;

        Ok(config)
    }

    fn from_builder(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        builder
            .set_default("port", 8080)
            .and_then(|b| b.set_default("covalent.base_url", "https://api.covalenthq.com/v1"))
            .and_then(|b| b.set_default("covalent.chain_id", 1))
            .and_then(|b| b.set_default("gate_io.base_url", "https://api.gateio.ws/api/v4"))
            .and_then(|b| b.set_default("kraken.base_url", "https://api.kraken.com/0/public"))
            .and_then(|b| b.set_default("subgraph.gateway_url", "https://gateway.thegraph.com"))
            .and_then(|b| b.set_default("subgraph.max_retries", 2))
            .and_then(|b| b.build())
            .and_then(|c| c.try_deserialize())
            .map_err(|e| PriceHistoryError::Config(e.to_string()))
    }

    fn apply_legacy_env(&mut self, covalent_key: Option<String>, graph_key: Option<String>) {
        if self.covalent.api_key.is_none() {
            self.covalent.api_key = covalent_key;
        }
        if self.subgraph.api_key.is_none() {
            self.subgraph.api_key = graph_key;
        }
    }

    pub fn validate(&self) -> Result<()> {
        for (name, base) in [
            ("covalent.base_url", &self.covalent.base_url),
            ("gate_io.base_url", &self.gate_io.base_url),
            ("kraken.base_url", &self.kraken.base_url),
            ("subgraph.gateway_url", &self.subgraph.gateway_url),
        ] {
            url::Url::parse(base)
                .map_err(|e| PriceHistoryError::Config(format!("{} ({}): {}", name, base, e)))?;
        }

        for (name, key) in [
            ("covalent.api_key", &self.covalent.api_key),
            ("subgraph.api_key", &self.subgraph.api_key),
        ] {
            if matches!(key, Some(k) if k.trim().is_empty()) {
                return Err(PriceHistoryError::Config(format!("{} is set but empty", name)));
            }
        }

        if self.covalent.chain_id == 0 {
            return Err(PriceHistoryError::Config(
                "covalent.chain_id must be positive".to_string(),
            ));
        }

        Ok(())
    }
}
