// Normalization of each source's raw entries into the common PriceRecord
use crate::sources::covalent::CovalentPriceEntry;
use crate::sources::local_csv::CsvPriceRow;
use crate::sources::subgraph::TokenDayData;
use crate::types::*;
use chrono::NaiveDate;
use serde_json::Value;

/// Covalent: `date → timestamp` (UTC midnight), `price → close`
pub fn format_raw_covalent_entry(entry: &CovalentPriceEntry) -> Result<PriceRecord> {
    let day = NaiveDate::parse_from_str(&entry.date, "%Y-%m-%d").map_err(|e| {
        PriceHistoryError::InvalidResponse(format!("covalent date {:?}: {}", entry.date, e))
    })?;
    let timestamp = day
        .and_hms_opt(0, 0, 0)
        .map(|midnight| midnight.and_utc().timestamp())
        .ok_or_else(|| {
            PriceHistoryError::InvalidResponse(format!("covalent date {:?}", entry.date))
        })?;

    let close = entry.price.ok_or_else(|| {
        PriceHistoryError::InvalidResponse(format!("covalent has no price for {}", entry.date))
    })?;

    Ok(PriceRecord::close_only(timestamp, close))
}

/// Gate.io: `[t, volume, close, high, low, open, ..]`
pub fn format_raw_gate_io_entry(entry: &[Value]) -> Result<PriceRecord> {
    const SOURCE: &str = "gate_io";
    Ok(PriceRecord {
        timestamp: integer_cell(entry, 0, SOURCE)?,
        volume: Some(numeric_cell(entry, 1, SOURCE)?),
        close: numeric_cell(entry, 2, SOURCE)?,
        high: Some(numeric_cell(entry, 3, SOURCE)?),
        low: Some(numeric_cell(entry, 4, SOURCE)?),
        open: Some(numeric_cell(entry, 5, SOURCE)?),
    })
}

/// Kraken: `[time, open, high, low, close, vwap, volume, count]`.
/// The VWAP column (5) is not part of the record.
pub fn format_raw_kraken_entry(entry: &[Value]) -> Result<PriceRecord> {
    const SOURCE: &str = "kraken";
    Ok(PriceRecord {
        timestamp: integer_cell(entry, 0, SOURCE)?,
        open: Some(numeric_cell(entry, 1, SOURCE)?),
        high: Some(numeric_cell(entry, 2, SOURCE)?),
        low: Some(numeric_cell(entry, 3, SOURCE)?),
        close: numeric_cell(entry, 4, SOURCE)?,
        volume: Some(numeric_cell(entry, 6, SOURCE)?),
    })
}

/// Uniswap/Sushiswap: `date → timestamp`, `priceUSD → close`
pub fn format_raw_subgraph_entry(entry: &TokenDayData) -> Result<PriceRecord> {
    let close = entry.price_usd.trim().parse::<f64>().map_err(|e| {
        PriceHistoryError::InvalidResponse(format!(
            "priceUSD {:?} of {}: {}",
            entry.price_usd, entry.id, e
        ))
    })?;

    Ok(PriceRecord::close_only(entry.date, close))
}

/// Local CSV rows already carry close and volume
pub fn format_csv_row(row: &CsvPriceRow) -> PriceRecord {
    PriceRecord {
        volume: Some(row.volume),
        ..PriceRecord::close_only(row.timestamp, row.close)
    }
}

fn cell<'a>(entry: &'a [Value], idx: usize, source: &str) -> Result<&'a Value> {
    entry.get(idx).ok_or_else(|| {
        PriceHistoryError::InvalidResponse(format!(
            "{} row has {} columns, expected at least {}",
            source,
            entry.len(),
            idx + 1
        ))
    })
}

/// Exchanges send prices as JSON strings or numbers
fn numeric_cell(entry: &[Value], idx: usize, source: &str) -> Result<f64> {
    let value = cell(entry, idx, source)?;
    let parsed = match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| {
        PriceHistoryError::InvalidResponse(format!(
            "{} column {} is not numeric: {}",
            source, idx, value
        ))
    })
}

fn integer_cell(entry: &[Value], idx: usize, source: &str) -> Result<i64> {
    let value = cell(entry, idx, source)?;
    let parsed = match value {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    parsed.ok_or_else(|| {
        PriceHistoryError::InvalidResponse(format!(
            "{} column {} is not a timestamp: {}",
            source, idx, value
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Vec<Value> {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn test_covalent_entry() {
        let entry = CovalentPriceEntry {
            date: "2022-03-01".to_string(),
            price: Some(2920.25),
        };

        let record = format_raw_covalent_entry(&entry).unwrap();

        assert_eq!(record, PriceRecord::close_only(1_646_092_800, 2920.25));
        assert_eq!(record.open, None);
        assert_eq!(record.volume, None);
    }

    #[test]
    fn test_covalent_entry_without_price_fails() {
        let entry = CovalentPriceEntry {
            date: "2022-03-01".to_string(),
            price: None,
        };
        assert!(format_raw_covalent_entry(&entry).is_err());
    }

    #[test]
    fn test_gate_io_entry_positions() {
        let entry = row(json!(["1646092800", "1000.5", "12.5", "13", "11", "12", "80", "true"]));

        let record = format_raw_gate_io_entry(&entry).unwrap();

        assert_eq!(record.timestamp, 1_646_092_800);
        assert_eq!(record.volume, Some(1000.5));
        assert_eq!(record.close, 12.5);
        assert_eq!(record.high, Some(13.0));
        assert_eq!(record.low, Some(11.0));
        assert_eq!(record.open, Some(12.0));
    }

    #[test]
    fn test_gate_io_entry_accepts_numbers() {
        let entry = row(json!([1_646_092_800, 1000.5, 12.5, 13, 11, 12]));
        let record = format_raw_gate_io_entry(&entry).unwrap();
        assert_eq!(record.open, Some(12.0));
    }

    #[test]
    fn test_kraken_entry_skips_vwap() {
        let vwap = 777.777;
        let entry = row(json!([1_646_092_800, "10.0", "20.0", "5.0", "15.0", vwap.to_string(), "42.0", 99]));

        let record = format_raw_kraken_entry(&entry).unwrap();

        assert_eq!(
            record,
            PriceRecord::ohlcv(1_646_092_800, 10.0, 20.0, 5.0, 15.0, 42.0)
        );
        let fields = [record.open, record.high, record.low, Some(record.close), record.volume];
        assert!(fields.iter().all(|f| *f != Some(vwap)));
    }

    #[test]
    fn test_short_kraken_row_is_invalid() {
        let entry = row(json!([1_646_092_800, "10.0", "20.0", "5.0", "15.0", "12.0"]));
        assert!(matches!(
            format_raw_kraken_entry(&entry),
            Err(PriceHistoryError::InvalidResponse(_))
        ));
    }

    #[test]
    fn test_subgraph_entry() {
        let entry = TokenDayData {
            id: "0xabc-19052".to_string(),
            price_usd: "1.000123".to_string(),
            date: 1_646_092_800,
        };

        let record = format_raw_subgraph_entry(&entry).unwrap();

        assert_eq!(record, PriceRecord::close_only(1_646_092_800, 1.000123));
    }

    #[test]
    fn test_csv_row() {
        let record = format_csv_row(&CsvPriceRow {
            timestamp: 7,
            close: 3.5,
            volume: 9.0,
        });
        assert_eq!(record.close, 3.5);
        assert_eq!(record.volume, Some(9.0));
        assert_eq!(record.high, None);
    }
}
