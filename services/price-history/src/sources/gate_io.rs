use crate::normalizers::format_raw_gate_io_entry;
use crate::sources::http;
use crate::types::*;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, CONTENT_TYPE};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, info};

const GATE_IO_BASE_URL: &str = "https://api.gateio.ws/api/v4";

/// Candlestick row: `[t, quote_volume, close, high, low, open, base_volume, closed]`
pub type GateIoCandle = Vec<Value>;

/// Error body returned by the v4 API
#[derive(Debug, Deserialize)]
struct GateIoErrorBody {
    label: String,
    #[serde(default)]
    message: String,
}

/// Gate.io spot market client
pub struct GateIoClient {
    client: Client,
    base_url: String,
}

impl GateIoClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(GATE_IO_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        Ok(Self {
            client: http::build_client(
                headers,
                Duration::from_secs(http::DEFAULT_TIMEOUT_SECS),
                None,
            )?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Daily candles for `pair` (e.g. `ETH_USDT`) between two Unix timestamps
    pub async fn get_raw_historical_token_spot_prices(
        &self,
        pair: &str,
        start_date: i64,
        end_date: i64,
    ) -> Result<Vec<GateIoCandle>> {
        let url = format!("{}/spot/candlesticks", self.base_url);
        let from = start_date.to_string();
        let to = end_date.to_string();

        debug!("Fetching Gate.io candles for {} from {} to {}", pair, from, to);

        let request = self.client.get(&url).query(&[
            ("currency_pair", pair),
            ("from", from.as_str()),
            ("to", to.as_str()),
            ("interval", "1d"),
        ]);

        let response = http::dispatch(request, self.name()).await?;
        if let Some(err) = http::rate_limit_error(&response, self.name()) {
            return Err(err);
        }

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            let detail = match serde_json::from_str::<GateIoErrorBody>(&text) {
                Ok(body) => format!("{}: {}", body.label, body.message),
                Err(_) => text,
            };
            return Err(PriceHistoryError::ApiError(format!(
                "Gate.io API error ({}): {}",
                status, detail
            )));
        }

        let candles: Vec<GateIoCandle> = http::decode_json(response, self.name()).await?;
        info!("Gate.io returned {} candles for {}", candles.len(), pair);

        Ok(candles)
    }

    pub async fn get_historical_token_spot_prices(
        &self,
        pair: &str,
        start_date: i64,
        end_date: i64,
    ) -> Result<Vec<PriceRecord>> {
        let window = DateWindow::new(start_date, end_date)?;
        self.get_historical_prices(pair, window).await
    }
}

#[async_trait::async_trait]
impl HistoricalPriceSource for GateIoClient {
    type RawEntry = GateIoCandle;

    fn name(&self) -> &'static str {
        "gate_io"
    }

    async fn fetch_raw(&self, asset: &str, window: DateWindow) -> Result<Vec<GateIoCandle>> {
        self.get_raw_historical_token_spot_prices(asset, window.start, window.end)
            .await
    }

    fn normalize(entry: &GateIoCandle) -> Result<PriceRecord> {
        format_raw_gate_io_entry(entry)
    }
}
