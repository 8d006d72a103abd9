pub mod types;
pub mod config;
pub mod sources {
    pub mod http;
    pub mod covalent;
    pub mod gate_io;
    pub mod kraken;
    pub mod subgraph;
    pub mod local_csv;
}
pub mod normalizers;
pub mod aggregators;

pub use types::*;
pub use aggregators::{
    calculate_twap, calculate_twap_interday, calculate_twap_ohlc, calculate_twap_with, TwapMethod,
};
pub use crate::config::PriceHistoryConfig;
pub use sources::covalent::CovalentClient;
pub use sources::gate_io::GateIoClient;
pub use sources::kraken::KrakenClient;
pub use sources::local_csv::{LocalCsvSource, PriceTable};
pub use sources::subgraph::{DexSubgraph, SubgraphClient};

use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::{info, warn};

/// Registry of configured historical sources, routed by [`SourceKind`]
#[derive(Default)]
pub struct PriceHistoryService {
    sources: BTreeMap<SourceKind, Arc<dyn PriceSeriesProvider>>,
}

impl PriceHistoryService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_source(&mut self, kind: SourceKind, source: Arc<dyn PriceSeriesProvider>) {
        self.sources.insert(kind, source);
    }

    /// Build every source the configuration has credentials for
    pub fn from_config(config: &PriceHistoryConfig) -> Result<Self> {
        let mut service = Self::new();

        match &config.covalent.api_key {
            Some(key) => {
                let client = CovalentClient::with_base_url(key.clone(), &config.covalent.base_url)?
                    .with_chain_id(config.covalent.chain_id);
                service.add_source(SourceKind::Covalent, Arc::new(client));
                info!("✓ Covalent source enabled (chain {})", config.covalent.chain_id);
            }
            None => warn!("⚠ No Covalent API key configured, covalent source disabled"),
        }

        service.add_source(
            SourceKind::GateIo,
            Arc::new(GateIoClient::with_base_url(&config.gate_io.base_url)?),
        );
        service.add_source(
            SourceKind::Kraken,
            Arc::new(KrakenClient::with_base_url(&config.kraken.base_url)?),
        );
        info!("✓ Gate.io and Kraken sources enabled");

        match &config.subgraph.api_key {
            Some(key) => {
                for (kind, dex) in [
                    (SourceKind::Uniswap, DexSubgraph::Uniswap),
                    (SourceKind::Sushiswap, DexSubgraph::Sushiswap),
                ] {
                    let client = SubgraphClient::with_gateway(dex, key, &config.subgraph.gateway_url)?
                        .with_max_retries(config.subgraph.max_retries);
                    service.add_source(kind, Arc::new(client));
                }
                info!("✓ Uniswap and Sushiswap subgraph sources enabled");
            }
            None => warn!("⚠ No subgraph gateway API key configured, DEX sources disabled"),
        }

        if let Some(dir) = &config.local.data_dir {
            service.add_source(SourceKind::LocalCsv, Arc::new(LocalCsvSource::new(dir)));
            info!("✓ Local CSV source enabled ({})", dir);
        }

        Ok(service)
    }

    fn source(&self, kind: SourceKind) -> Result<&Arc<dyn PriceSeriesProvider>> {
        self.sources.get(&kind).ok_or_else(|| {
            PriceHistoryError::UnknownSource(format!("{} is not configured", kind))
        })
    }

    /// Normalized daily series for `asset` from one source
    pub async fn get_historical_prices(
        &self,
        kind: SourceKind,
        asset: &str,
        window: DateWindow,
    ) -> Result<Vec<PriceRecord>> {
        self.source(kind)?.historical_prices(asset, window).await
    }

    /// Fetch a series and reduce it to a TWAP over `days`
    pub async fn get_twap(
        &self,
        kind: SourceKind,
        asset: &str,
        window: DateWindow,
        days: u32,
        method: TwapMethod,
    ) -> Result<TwapSummary> {
        let records = self.get_historical_prices(kind, asset, window).await?;
        let twap = calculate_twap_with(method, &records, days)?;

        Ok(TwapSummary {
            source: kind,
            asset: asset.to_string(),
            days,
            method,
            twap,
            points: records.len(),
        })
    }

    /// Names of the configured sources
    pub fn configured_sources(&self) -> Vec<SourceKind> {
        self.sources.keys().copied().collect()
    }
}

/// TWAP result with the inputs that produced it
#[derive(Debug, Clone, PartialEq, serde::Serialize)]
pub struct TwapSummary {
    pub source: SourceKind,
    pub asset: String,
    pub days: u32,
    pub method: TwapMethod,
    pub twap: f64,
    pub points: usize,
}
