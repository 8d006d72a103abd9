use crate::normalizers::format_raw_covalent_entry;
use crate::sources::http;
use crate::types::*;
use chrono::{DateTime, Utc};
use reqwest::header::{HeaderMap, HeaderValue, USER_AGENT};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};

const COVALENT_URI: &str = "https://api.covalenthq.com/v1";

const BROWSER_USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) \
    AppleWebKit/537.36 (KHTML, like Gecko) \
    Chrome/100.0.4896.127 Safari/537.36 Edg/100.0.1185.50";

/// Placeholder address wallets and routers use for the chain's native asset
pub const NATIVE_ASSET_PLACEHOLDER: &str = "0xeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeeee";

/// Wrapped native token per chain id. Covalent does not price the placeholder.
pub static WRAPPED_NATIVE_ADDRESSES: phf::Map<u64, &'static str> = phf::phf_map! {
    1u64 => "0xc02aaa39b223fe8d0a0e5c4f27ead9083c756cc2",     // WETH
    56u64 => "0xbb4cdb9cbd36b01bd1cbaebf2de08d9173bc095c",    // WBNB
    137u64 => "0x0d500b1d8e8ef31e21c99d1db9a6444d3adf1270",   // WMATIC
    43114u64 => "0xb31f66aa3c1e785363f0875a1b74e27b85fd66c7", // WAVAX
};

/// One `{date, price}` entry of `data[0].prices`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CovalentPriceEntry {
    pub date: String,
    pub price: Option<f64>,
}

#[derive(Debug, Deserialize)]
struct CovalentResponse {
    data: Vec<CovalentPriceItem>,
}

#[derive(Debug, Deserialize)]
struct CovalentPriceItem {
    prices: Vec<CovalentPriceEntry>,
}

/// Covalent historical pricing client
pub struct CovalentClient {
    client: Client,
    base_url: String,
    api_key: String,
    chain_id: u64,
}

impl CovalentClient {
    const CONNECT_TIMEOUT_SECS: u64 = 30;
    const REQUEST_TIMEOUT_SECS: u64 = 45;

    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        Self::with_base_url(api_key, COVALENT_URI)
    }

    pub fn with_base_url(api_key: impl Into<String>, base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(USER_AGENT, HeaderValue::from_static(BROWSER_USER_AGENT));

        let client = http::build_client(
            headers,
            Duration::from_secs(Self::REQUEST_TIMEOUT_SECS),
            Some(Duration::from_secs(Self::CONNECT_TIMEOUT_SECS)),
        )?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.into(),
            chain_id: 1,
        })
    }

    /// Query a chain other than Ethereum mainnet
    pub fn with_chain_id(mut self, chain_id: u64) -> Self {
        self.chain_id = chain_id;
        self
    }

    /// Swap the native-asset placeholder for the chain's wrapped token
    pub fn resolve_contract_address(&self, contract_address: &str) -> String {
        if contract_address.eq_ignore_ascii_case(NATIVE_ASSET_PLACEHOLDER) {
            if let Some(wrapped) = WRAPPED_NATIVE_ADDRESSES.get(&self.chain_id) {
                return wrapped.to_string();
            }
        }
        contract_address.to_string()
    }

    fn query_key(&self) -> String {
        if self.api_key.starts_with("ckey_") || self.api_key.starts_with("cqt_") {
            self.api_key.clone()
        } else {
            format!("ckey_{}", self.api_key)
        }
    }

    /// Daily USD prices for `contract_address` between two dates (inclusive)
    pub async fn get_raw_historical_token_spot_prices(
        &self,
        contract_address: &str,
        start_date: DateTime<Utc>,
        end_date: DateTime<Utc>,
    ) -> Result<Vec<CovalentPriceEntry>> {
        let contract_address = self.resolve_contract_address(contract_address);
        let from = start_date.format("%Y-%m-%d").to_string();
        let to = end_date.format("%Y-%m-%d").to_string();

        let url = format!(
            "{}/pricing/historical_by_addresses_v2/{}/USD/{}/",
            self.base_url, self.chain_id, contract_address
        );

        debug!("Fetching Covalent prices from {}?from={}&to={} (key redacted)", url, from, to);

        let request = self.client.get(&url).query(&[
            ("quote-currency", "USD"),
            ("format", "JSON"),
            ("from", from.as_str()),
            ("to", to.as_str()),
            ("key", self.query_key().as_str()),
        ]);

        let response: CovalentResponse = http::send_json(request, self.name()).await?;

        let item = response.data.into_iter().next().ok_or_else(|| {
            PriceHistoryError::InvalidResponse(format!(
                "Covalent returned no pricing data for {}",
                contract_address
            ))
        })?;

        info!(
            "Covalent returned {} prices for {} on chain {}",
            item.prices.len(),
            contract_address,
            self.chain_id
        );

        Ok(item.prices)
    }

    /// Normalized daily prices for a window given in Unix seconds
    pub async fn get_historical_token_spot_prices(
        &self,
        contract_address: &str,
        start_date: i64,
        end_date: i64,
    ) -> Result<Vec<PriceRecord>> {
        let window = DateWindow::new(start_date, end_date)?;
        self.get_historical_prices(contract_address, window).await
    }
}

#[async_trait::async_trait]
impl HistoricalPriceSource for CovalentClient {
    type RawEntry = CovalentPriceEntry;

    fn name(&self) -> &'static str {
        "covalent"
    }

    async fn fetch_raw(&self, asset: &str, window: DateWindow) -> Result<Vec<CovalentPriceEntry>> {
        self.get_raw_historical_token_spot_prices(
            asset,
            window.start_datetime()?,
            window.end_datetime()?,
        )
        .await
    }

    fn normalize(entry: &CovalentPriceEntry) -> Result<PriceRecord> {
        format_raw_covalent_entry(entry)
    }
}
