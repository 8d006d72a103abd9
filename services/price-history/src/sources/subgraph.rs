use crate::normalizers::format_raw_subgraph_entry;
use crate::sources::http;
use crate::types::*;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

const GRAPH_GATEWAY_URL: &str = "https://gateway.thegraph.com";

/// Largest page the gateway serves for one entity query
pub const PAGE_SIZE: usize = 1000;

const UNISWAP_TOKEN_DAY_DATAS: &str = r#"
query TokenDayDatas($token: String!, $start: Int!, $end: Int!, $first: Int!, $skip: Int!) {
  tokenDayDatas(
    first: $first
    skip: $skip
    orderBy: date
    orderDirection: asc
    where: { token: $token, date_gte: $start, date_lte: $end }
  ) {
    id
    priceUSD
    date
  }
}
"#;

const SUSHISWAP_TOKEN_DAY_DATAS: &str = r#"
query TokenDayDatas($token: String!, $start: Int!, $end: Int!, $first: Int!, $skip: Int!) {
  tokenDayDatas(
    first: $first
    skip: $skip
    orderBy: date
    orderDirection: asc
    where: { token_contains_nocase: $token, date_gte: $start, date_lte: $end }
  ) {
    id
    priceUSD
    date
  }
}
"#;

/// Which DEX subgraph to query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DexSubgraph {
    /// Exact token id match
    Uniswap,
    /// Case-insensitive token id match
    Sushiswap,
}

impl DexSubgraph {
    pub fn subgraph_id(&self) -> &'static str {
        match self {
            DexSubgraph::Uniswap => "2szAn45skWZFLPUbxFEtjiEzT1FMW8Ff5ReUPbZbQxtt",
            DexSubgraph::Sushiswap => "D7azkFFPFT5H8i32ApXLr34UQyBfxDAfKoCEK4M832M6",
        }
    }

    pub fn query(&self) -> &'static str {
        match self {
            DexSubgraph::Uniswap => UNISWAP_TOKEN_DAY_DATAS,
            DexSubgraph::Sushiswap => SUSHISWAP_TOKEN_DAY_DATAS,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            DexSubgraph::Uniswap => "uniswap",
            DexSubgraph::Sushiswap => "sushiswap",
        }
    }
}

/// One `tokenDayDatas` entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenDayData {
    pub id: String,
    #[serde(rename = "priceUSD")]
    pub price_usd: String,
    pub date: i64,
}

#[derive(Debug, Serialize)]
struct GraphQlRequest<'a> {
    query: &'a str,
    variables: TokenDayVariables<'a>,
}

#[derive(Debug, Serialize)]
struct TokenDayVariables<'a> {
    token: &'a str,
    start: i64,
    end: i64,
    first: usize,
    skip: usize,
}

#[derive(Debug, Deserialize)]
struct GraphQlResponse {
    #[serde(default)]
    data: Option<Map<String, Value>>,
    #[serde(default)]
    errors: Vec<GraphQlError>,
}

#[derive(Debug, Deserialize)]
struct GraphQlError {
    message: String,
}

/// Client for a hosted DEX subgraph behind The Graph gateway
pub struct SubgraphClient {
    client: Client,
    endpoint: String,
    dex: DexSubgraph,
    max_retries: u32,
}

impl SubgraphClient {
    /// Transport-level retries, matching the gateway client defaults
    pub const DEFAULT_MAX_RETRIES: u32 = 2;
    const RETRY_BACKOFF_MS: u64 = 100;

    pub fn new(dex: DexSubgraph, api_key: &str) -> Result<Self> {
        Self::with_gateway(dex, api_key, GRAPH_GATEWAY_URL)
    }

    pub fn with_gateway(dex: DexSubgraph, api_key: &str, gateway_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let endpoint = format!(
            "{}/api/{}/subgraphs/id/{}",
            gateway_url.trim_end_matches('/'),
            api_key,
            dex.subgraph_id()
        );

        Ok(Self {
            client: http::build_client(
                headers,
                Duration::from_secs(http::DEFAULT_TIMEOUT_SECS),
                None,
            )?,
            endpoint,
            dex,
            max_retries: Self::DEFAULT_MAX_RETRIES,
        })
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// POST the query, retrying transport failures and 5xx responses
    async fn execute(&self, body: &GraphQlRequest<'_>) -> Result<GraphQlResponse> {
        let mut attempt = 0;
        loop {
            let outcome = self.client.post(&self.endpoint).json(body).send().await;

            let retry_reason = match &outcome {
                Err(e) if e.is_timeout() => Some("timeout".to_string()),
                Err(_) => Some("transport error".to_string()),
                Ok(resp) if resp.status().is_server_error() => Some(format!("status {}", resp.status())),
                Ok(_) => None,
            };

            if let Some(reason) = retry_reason {
                if attempt < self.max_retries {
                    attempt += 1;
                    warn!(
                        "{} subgraph request failed (attempt {}/{}): {}",
                        self.dex.name(),
                        attempt,
                        self.max_retries + 1,
                        reason
                    );
                    tokio::time::sleep(Duration::from_millis(
                        Self::RETRY_BACKOFF_MS * u64::from(attempt),
                    ))
                    .await;
                    continue;
                }
            }

            let response = outcome.map_err(|e| {
                PriceHistoryError::ApiError(format!(
                    "{} request failed: {}",
                    self.dex.name(),
                    e.without_url()
                ))
            })?;
            let response = http::check_status(response, self.dex.name()).await?;
            return http::decode_json(response, self.dex.name()).await;
        }
    }

    /// One page of `tokenDayDatas`, `skip` rows into the window
    async fn fetch_page(
        &self,
        token_contract_address: &str,
        start_date: i64,
        end_date: i64,
        skip: usize,
    ) -> Result<Vec<TokenDayData>> {
        let body = GraphQlRequest {
            query: self.dex.query(),
            variables: TokenDayVariables {
                token: token_contract_address,
                start: start_date,
                end: end_date,
                first: PAGE_SIZE,
                skip,
            },
        };

        let response = self.execute(&body).await?;

        let entries = match response.data.and_then(|mut data| data.remove("tokenDayDatas")) {
            Some(entries) => entries,
            None => {
                let errors: Vec<&str> = response.errors.iter().map(|e| e.message.as_str()).collect();
                warn!(
                    "The graph node(s) indexing this data is most likely out of sync ({} subgraph, errors: {:?})",
                    self.dex.name(),
                    errors
                );
                return Err(PriceHistoryError::MissingField {
                    source_name: self.dex.name().to_string(),
                    field: "tokenDayDatas".to_string(),
                });
            }
        };

        serde_json::from_value(entries).map_err(|e| {
            PriceHistoryError::InvalidResponse(format!("{} tokenDayDatas: {}", self.dex.name(), e))
        })
    }

    /// Daily `tokenDayDatas` for a token within `[start_date, end_date]`, all pages
    pub async fn get_raw_historical_token_spot_prices(
        &self,
        token_contract_address: &str,
        start_date: i64,
        end_date: i64,
    ) -> Result<Vec<TokenDayData>> {
        debug!(
            "Querying {} subgraph {} for {} between {} and {}",
            self.dex.name(),
            self.dex.subgraph_id(),
            token_contract_address,
            start_date,
            end_date
        );

        let mut days: Vec<TokenDayData> = Vec::new();
        loop {
            let page = self
                .fetch_page(token_contract_address, start_date, end_date, days.len())
                .await?;
            let full = page.len() >= PAGE_SIZE;
            days.extend(page);
            if !full {
                break;
            }
            debug!("{} subgraph page full, fetching from {}", self.dex.name(), days.len());
        }

        info!(
            "{} subgraph returned {} days for {}",
            self.dex.name(),
            days.len(),
            token_contract_address
        );

        Ok(days)
    }

    pub async fn get_historical_token_spot_prices(
        &self,
        token_contract_address: &str,
        start_date: i64,
        end_date: i64,
    ) -> Result<Vec<PriceRecord>> {
        let window = DateWindow::new(start_date, end_date)?;
        self.get_historical_prices(token_contract_address, window).await
    }
}

#[async_trait::async_trait]
impl HistoricalPriceSource for SubgraphClient {
    type RawEntry = TokenDayData;

    fn name(&self) -> &'static str {
        self.dex.name()
    }

    async fn fetch_raw(&self, asset: &str, window: DateWindow) -> Result<Vec<TokenDayData>> {
        self.get_raw_historical_token_spot_prices(asset, window.start, window.end)
            .await
    }

    fn normalize(entry: &TokenDayData) -> Result<PriceRecord> {
        format_raw_subgraph_entry(entry)
    }
}
