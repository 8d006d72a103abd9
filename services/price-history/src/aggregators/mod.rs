// Time-weighted average price over normalized daily series
use crate::types::*;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which per-day value feeds the average
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TwapMethod {
    /// Mean of open/high/low/close per day
    Ohlc,
    /// Close per day
    #[default]
    Interday,
}

impl TwapMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            TwapMethod::Ohlc => "ohlc",
            TwapMethod::Interday => "interday",
        }
    }
}

impl fmt::Display for TwapMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Sum of `series` divided by `days`.
///
/// The day count is not checked against the series length; a shorter
/// series simply averages in zeros for the missing days.
pub fn calculate_twap(series: &[f64], days: u32) -> Result<f64> {
    if days == 0 {
        return Err(PriceHistoryError::InvalidWindow(
            "TWAP needs at least one day".to_string(),
        ));
    }

    Ok(series.iter().sum::<f64>() / f64::from(days))
}

/// TWAP of the per-day mean of open, high, low and close
pub fn calculate_twap_ohlc(records: &[PriceRecord], days: u32) -> Result<f64> {
    let daily = records
        .iter()
        .map(ohlc_mean)
        .collect::<Result<Vec<_>>>()?;

    calculate_twap(&daily, days)
}

/// TWAP of daily closes
pub fn calculate_twap_interday(records: &[PriceRecord], days: u32) -> Result<f64> {
    let closes: Vec<f64> = records.iter().map(|r| r.close).collect();
    calculate_twap(&closes, days)
}

pub fn calculate_twap_with(method: TwapMethod, records: &[PriceRecord], days: u32) -> Result<f64> {
    match method {
        TwapMethod::Ohlc => calculate_twap_ohlc(records, days),
        TwapMethod::Interday => calculate_twap_interday(records, days),
    }
}

fn ohlc_mean(record: &PriceRecord) -> Result<f64> {
    let field = |value: Option<f64>, name: &str| {
        value.ok_or_else(|| PriceHistoryError::MissingField {
            source_name: format!("record {}", record.timestamp),
            field: name.to_string(),
        })
    };

    let open = field(record.open, "open")?;
    let high = field(record.high, "high")?;
    let low = field(record.low, "low")?;

    Ok((open + high + low + record.close) / 4.0)
}
