use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

const SECONDS_PER_DAY: i64 = 86_400;

/// Normalized daily price record produced by every source
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceRecord {
    pub timestamp: i64,          // epoch seconds, day granularity
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub high: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub low: Option<f64>,
    pub close: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub volume: Option<f64>,
}

impl PriceRecord {
    /// Record for sources that only report a closing/spot price
    pub fn close_only(timestamp: i64, close: f64) -> Self {
        Self {
            timestamp,
            open: None,
            high: None,
            low: None,
            close,
            volume: None,
        }
    }

    /// Full daily candle
    pub fn ohlcv(timestamp: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            timestamp,
            open: Some(open),
            high: Some(high),
            low: Some(low),
            close,
            volume: Some(volume),
        }
    }
}

/// Inclusive `[start, end]` window in Unix seconds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DateWindow {
    pub start: i64,
    pub end: i64,
}

impl DateWindow {
    pub fn new(start: i64, end: i64) -> Result<Self> {
        if start > end {
            return Err(PriceHistoryError::InvalidWindow(format!(
                "start {} is after end {}",
                start, end
            )));
        }
        Ok(Self { start, end })
    }

    pub fn start_datetime(&self) -> Result<DateTime<Utc>> {
        to_datetime(self.start)
    }

    pub fn end_datetime(&self) -> Result<DateTime<Utc>> {
        to_datetime(self.end)
    }

    /// Number of calendar days covered, counting both ends
    pub fn days(&self) -> u32 {
        let start_day = self.start.div_euclid(SECONDS_PER_DAY);
        let end_day = self.end.div_euclid(SECONDS_PER_DAY);
        u32::try_from(end_day - start_day + 1).unwrap_or(u32::MAX)
    }

    pub fn contains(&self, timestamp: i64) -> bool {
        self.start <= timestamp && timestamp <= self.end
    }
}

fn to_datetime(timestamp: i64) -> Result<DateTime<Utc>> {
    DateTime::from_timestamp(timestamp, 0).ok_or_else(|| {
        PriceHistoryError::InvalidWindow(format!("timestamp {} is out of range", timestamp))
    })
}

/// Upstream sources known to the service
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Covalent,
    GateIo,
    Kraken,
    Uniswap,
    Sushiswap,
    LocalCsv,
}

impl SourceKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceKind::Covalent => "covalent",
            SourceKind::GateIo => "gate_io",
            SourceKind::Kraken => "kraken",
            SourceKind::Uniswap => "uniswap",
            SourceKind::Sushiswap => "sushiswap",
            SourceKind::LocalCsv => "local_csv",
        }
    }
}

impl fmt::Display for SourceKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SourceKind {
    type Err = PriceHistoryError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "covalent" => Ok(SourceKind::Covalent),
            "gate_io" | "gateio" => Ok(SourceKind::GateIo),
            "kraken" => Ok(SourceKind::Kraken),
            "uniswap" => Ok(SourceKind::Uniswap),
            "sushiswap" | "sushi" => Ok(SourceKind::Sushiswap),
            "local_csv" | "local" => Ok(SourceKind::LocalCsv),
            other => Err(PriceHistoryError::UnknownSource(other.to_string())),
        }
    }
}

/// Error types for price history retrieval
#[derive(Debug, thiserror::Error)]
pub enum PriceHistoryError {
    #[error("API request failed: {0}")]
    ApiError(String),

    #[error("Rate limit exceeded for {source_name}")]
    RateLimit { source_name: String, retry_after: Option<u64> },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),

    #[error("Missing field `{field}` in {source_name} data")]
    MissingField { source_name: String, field: String },

    #[error("Local data error: {0}")]
    LocalData(String),

    #[error("Invalid asset: {0}")]
    InvalidAsset(String),

    #[error("No data for asset: {0}")]
    AssetNotFound(String),

    #[error("Invalid window: {0}")]
    InvalidWindow(String),

    #[error("Unknown source: {0}")]
    UnknownSource(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type for price history operations
pub type Result<T> = std::result::Result<T, PriceHistoryError>;

/// A historical price source: one raw fetch plus a per-entry normalizer.
///
/// `asset` is whatever identifies the series upstream: a contract address,
/// a trading pair, a token address, or a file name for local data.
#[async_trait::async_trait]
pub trait HistoricalPriceSource: Send + Sync {
    /// Entry type as decoded from the upstream response
    type RawEntry: Send + Sync;

    /// Source name
    fn name(&self) -> &'static str;

    /// Issue the upstream request and return its decoded entries
    async fn fetch_raw(&self, asset: &str, window: DateWindow) -> Result<Vec<Self::RawEntry>>;

    /// Map one raw entry onto the common record
    fn normalize(entry: &Self::RawEntry) -> Result<PriceRecord>;

    /// Fetch and normalize, ascending by timestamp
    async fn get_historical_prices(
        &self,
        asset: &str,
        window: DateWindow,
    ) -> Result<Vec<PriceRecord>> {
        let raw = self.fetch_raw(asset, window).await?;
        let mut records = raw
            .iter()
            .map(Self::normalize)
            .collect::<Result<Vec<_>>>()?;
        records.sort_by_key(|r| r.timestamp);
        Ok(records)
    }
}

/// Object-safe view of a [`HistoricalPriceSource`] for routing by name
#[async_trait::async_trait]
pub trait PriceSeriesProvider: Send + Sync {
    fn source_name(&self) -> &'static str;

    async fn historical_prices(&self, asset: &str, window: DateWindow) -> Result<Vec<PriceRecord>>;
}

#[async_trait::async_trait]
impl<T: HistoricalPriceSource> PriceSeriesProvider for T {
    fn source_name(&self) -> &'static str {
        self.name()
    }

    async fn historical_prices(&self, asset: &str, window: DateWindow) -> Result<Vec<PriceRecord>> {
        self.get_historical_prices(asset, window).await
    }
}
