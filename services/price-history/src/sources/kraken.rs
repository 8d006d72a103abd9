use crate::normalizers::format_raw_kraken_entry;
use crate::sources::http;
use crate::types::*;
use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, CONTENT_TYPE, USER_AGENT};
use reqwest::Client;
use serde::Deserialize;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

const KRAKEN_BASE_URL: &str = "https://api.kraken.com/0/public";

/// Kraken serves at most this many candles back from "now" per interval
const MAX_DAILY_CANDLES: i64 = 720;
const DAILY_INTERVAL_MINUTES: &str = "1440";

/// OHLC row: `[time, open, high, low, close, vwap, volume, count]`
pub type KrakenCandle = Vec<Value>;

#[derive(Debug, Deserialize)]
struct KrakenResponse {
    #[serde(default)]
    error: Vec<String>,
    #[serde(default)]
    result: Option<Map<String, Value>>,
}

/// Kraken public market data client
pub struct KrakenClient {
    client: Client,
    base_url: String,
}

impl KrakenClient {
    pub fn new() -> Result<Self> {
        Self::with_base_url(KRAKEN_BASE_URL)
    }

    pub fn with_base_url(base_url: &str) -> Result<Self> {
        let mut headers = HeaderMap::new();
        headers.insert(
            CONTENT_TYPE,
            HeaderValue::from_static("application/x-www-form-urlencoded"),
        );
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (X11; U; Linux i686; en-US; rv:1.1b) Gecko/20020722",
            ),
        );

        Ok(Self {
            client: http::build_client(
                headers,
                Duration::from_secs(http::DEFAULT_TIMEOUT_SECS),
                None,
            )?,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    /// Daily OHLC candles for `pair` since `start_date` (Unix seconds).
    ///
    /// Only the last 720 days before now are served; older starts are
    /// clamped by Kraken and this client does not backfill them.
    pub async fn get_raw_historical_ohlc_token_spot_prices(
        &self,
        pair: &str,
        start_date: i64,
    ) -> Result<Vec<KrakenCandle>> {
        let oldest_available = Utc::now().timestamp() - MAX_DAILY_CANDLES * 86_400;
        if start_date < oldest_available {
            warn!(
                "Kraken only serves {} daily candles; data for {} before {} will be missing",
                MAX_DAILY_CANDLES, pair, oldest_available
            );
        }

        let url = format!("{}/OHLC", self.base_url);
        let since = start_date.to_string();

        debug!("Fetching Kraken OHLC for {} since {}", pair, since);

        let request = self.client.get(&url).query(&[
            ("pair", pair),
            ("interval", DAILY_INTERVAL_MINUTES),
            ("since", since.as_str()),
        ]);

        let response: KrakenResponse = http::send_json(request, self.name()).await?;

        if !response.error.is_empty() {
            return Err(PriceHistoryError::ApiError(format!(
                "Kraken API error: {}",
                response.error.join(", ")
            )));
        }

        let result = response.result.ok_or_else(|| PriceHistoryError::MissingField {
            source_name: self.name().to_string(),
            field: "result".to_string(),
        })?;

        let candles = Self::take_pair_entries(result, pair)?;
        info!("Kraken returned {} candles for {}", candles.len(), pair);

        Ok(candles)
    }

    /// Entries listed under `pair`, or under Kraken's canonical name for it
    /// (`XBTUSD` is answered as `XXBTZUSD`) when that is the only series.
    fn take_pair_entries(mut result: Map<String, Value>, pair: &str) -> Result<Vec<KrakenCandle>> {
        let entries = match result.remove(pair) {
            Some(entries) => entries,
            None => {
                let mut series = result
                    .into_iter()
                    .filter(|(key, value)| key != "last" && value.is_array());
                match (series.next(), series.next()) {
                    (Some((canonical, entries)), None) => {
                        debug!("Kraken answered {} as {}", pair, canonical);
                        entries
                    }
                    _ => {
                        return Err(PriceHistoryError::MissingField {
                            source_name: "kraken".to_string(),
                            field: format!("result.{}", pair),
                        })
                    }
                }
            }
        };

        serde_json::from_value(entries)
            .map_err(|e| PriceHistoryError::InvalidResponse(format!("kraken OHLC rows: {}", e)))
    }

    pub async fn get_historical_ohlc_token_spot_prices(
        &self,
        pair: &str,
        start_date: i64,
    ) -> Result<Vec<PriceRecord>> {
        // Kraken has no upper bound, so the window end is left open
        let window = DateWindow::new(start_date, i64::MAX)?;
        self.get_historical_prices(pair, window).await
    }
}

#[async_trait::async_trait]
impl HistoricalPriceSource for KrakenClient {
    type RawEntry = KrakenCandle;

    fn name(&self) -> &'static str {
        "kraken"
    }

    /// Ignores `window.end`: Kraken returns everything since the start.
    async fn fetch_raw(&self, asset: &str, window: DateWindow) -> Result<Vec<KrakenCandle>> {
        self.get_raw_historical_ohlc_token_spot_prices(asset, window.start)
            .await
    }

    fn normalize(entry: &KrakenCandle) -> Result<PriceRecord> {
        format_raw_kraken_entry(entry)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn ohlc_body(key: &str) -> Value {
        let mut result = Map::new();
        result.insert(
            key.to_string(),
            json!([
                [1_646_092_800, "43160.0", "44949.0", "42809.9", "44421.2", "99999.9", "3120.5", 41234],
                [1_646_179_200, "44421.2", "45400.0", "43330.0", "43912.3", "99999.9", "2877.1", 38211]
            ]),
        );
        result.insert("last".to_string(), json!(1_646_179_200));

        json!({ "error": [], "result": result })
    }

    #[tokio::test]
    async fn test_ohlc_requested_daily_since_start() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/OHLC"))
            .and(query_param("pair", "XXBTZUSD"))
            .and(query_param("interval", "1440"))
            .and(query_param("since", "1646092800"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ohlc_body("XXBTZUSD")))
            .expect(1)
            .mount(&server)
            .await;

        let client = KrakenClient::with_base_url(&server.uri()).unwrap();
        let records = client
            .get_historical_ohlc_token_spot_prices("XXBTZUSD", 1_646_092_800)
            .await
            .unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(
            records[0],
            PriceRecord::ohlcv(1_646_092_800, 43160.0, 44949.0, 42809.9, 44421.2, 3120.5)
        );
    }

    #[tokio::test]
    async fn test_canonical_pair_name_is_accepted() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/OHLC"))
            .respond_with(ResponseTemplate::new(200).set_body_json(ohlc_body("XXBTZUSD")))
            .mount(&server)
            .await;

        let client = KrakenClient::with_base_url(&server.uri()).unwrap();
        let candles = client
            .get_raw_historical_ohlc_token_spot_prices("XBTUSD", 1_646_092_800)
            .await
            .unwrap();

        assert_eq!(candles.len(), 2);
    }

    #[tokio::test]
    async fn test_kraken_error_array_is_an_error() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "error": ["EQuery:Unknown asset pair"]
            })))
            .mount(&server)
            .await;

        let client = KrakenClient::with_base_url(&server.uri()).unwrap();
        let err = client
            .get_raw_historical_ohlc_token_spot_prices("NOPE", 1_646_092_800)
            .await
            .unwrap_err();

        assert!(matches!(err, PriceHistoryError::ApiError(msg) if msg.contains("Unknown asset pair")));
    }

    #[test]
    fn test_ambiguous_result_without_requested_pair_fails() {
        let result = json!({"AAA": [], "BBB": [], "last": 0});
        let Value::Object(map) = result else { unreachable!() };

        let err = KrakenClient::take_pair_entries(map, "CCC").unwrap_err();
        assert!(matches!(err, PriceHistoryError::MissingField { .. }));
    }
}
