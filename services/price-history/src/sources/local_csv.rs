use crate::normalizers::format_csv_row;
use crate::types::*;
use csv::ReaderBuilder;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use tracing::{debug, info};

/// Row of a headerless `timestamp,close,volume` file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct CsvPriceRow {
    pub timestamp: i64,
    pub close: f64,
    pub volume: f64,
}

/// Rows indexed by timestamp, ascending
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PriceTable {
    rows: Vec<CsvPriceRow>,
}

impl PriceTable {
    pub fn from_rows(mut rows: Vec<CsvPriceRow>) -> Self {
        // stable, so duplicate timestamps keep file order
        rows.sort_by_key(|r| r.timestamp);
        Self { rows }
    }

    /// First row stored under `timestamp`
    pub fn get(&self, timestamp: i64) -> Option<&CsvPriceRow> {
        let idx = self.rows.partition_point(|r| r.timestamp < timestamp);
        self.rows.get(idx).filter(|r| r.timestamp == timestamp)
    }

    /// Rows with `window.start <= timestamp <= window.end`
    pub fn range(&self, window: DateWindow) -> PriceTable {
        let lo = self.rows.partition_point(|r| r.timestamp < window.start);
        let hi = self.rows.partition_point(|r| r.timestamp <= window.end);
        PriceTable {
            rows: self.rows[lo..hi.max(lo)].to_vec(),
        }
    }

    pub fn into_rows(self) -> Vec<CsvPriceRow> {
        self.rows
    }

    pub fn timestamps(&self) -> Vec<i64> {
        self.rows.iter().map(|r| r.timestamp).collect()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Load a whole file into a table
pub fn read_price_table(path: &Path) -> Result<PriceTable> {
    let mut reader = ReaderBuilder::new()
        .has_headers(false)
        .trim(csv::Trim::All)
        .from_path(path)
        .map_err(|e| match e.kind() {
            csv::ErrorKind::Io(io) if io.kind() == std::io::ErrorKind::NotFound => {
                PriceHistoryError::AssetNotFound(path.display().to_string())
            }
            _ => PriceHistoryError::LocalData(format!("{}: {}", path.display(), e)),
        })?;

    let rows = reader
        .deserialize::<CsvPriceRow>()
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| PriceHistoryError::LocalData(format!("{}: {}", path.display(), e)))?;

    debug!("Read {} rows from {}", rows.len(), path.display());

    Ok(PriceTable::from_rows(rows))
}

/// Rows of `path` whose timestamp falls in `[start_date, end_date]`
pub fn get_historical_token_spot_prices(
    path: impl AsRef<Path>,
    start_date: i64,
    end_date: i64,
) -> Result<PriceTable> {
    let window = DateWindow::new(start_date, end_date)?;
    Ok(read_price_table(path.as_ref())?.range(window))
}

/// Directory of exported CSV files served as a price source.
///
/// The asset is a file name relative to the directory.
pub struct LocalCsvSource {
    data_dir: PathBuf,
}

impl LocalCsvSource {
    pub fn new(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
        }
    }

    fn resolve(&self, asset: &str) -> Result<PathBuf> {
        let relative = Path::new(asset);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));

        if asset.is_empty() || escapes {
            return Err(PriceHistoryError::InvalidAsset(format!(
                "{} is not a file inside {}",
                asset,
                self.data_dir.display()
            )));
        }

        Ok(self.data_dir.join(relative))
    }
}

#[async_trait::async_trait]
impl HistoricalPriceSource for LocalCsvSource {
    type RawEntry = CsvPriceRow;

    fn name(&self) -> &'static str {
        "local_csv"
    }

    async fn fetch_raw(&self, asset: &str, window: DateWindow) -> Result<Vec<CsvPriceRow>> {
        let path = self.resolve(asset)?;

        let table = tokio::task::spawn_blocking(move || read_price_table(&path))
            .await
            .map_err(|e| PriceHistoryError::LocalData(format!("CSV reader task failed: {}", e)))??
            .range(window);

        info!("Loaded {} local rows for {}", table.len(), asset);

        Ok(table.into_rows())
    }

    fn normalize(entry: &CsvPriceRow) -> Result<PriceRecord> {
        Ok(format_csv_row(entry))
    }
}
