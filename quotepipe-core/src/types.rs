//! Quote pipeline data types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use crate::errors::PipelineError;

/// Normalize a ticker into its canonical form: trimmed and uppercased.
pub fn canonical_symbol(symbol: &str) -> String {
    symbol.trim().to_uppercase()
}

/// Raw provider quote before enrichment.
///
/// `raw` carries provider-specific extras (52-week range, previous close,
/// average volume, ...) as strings; nested provider objects are stored as
/// JSON strings so downstream stages can parse them without knowing the
/// provider schema.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct RawQuote {
    pub symbol: String,
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    /// Epoch seconds at fetch time.
    pub timestamp: i64,
    /// Provider tag, e.g. "twelvedata".
    pub source: String,
    pub raw: HashMap<String, String>,
}

/// Trading signal derived from the enrichment indicators.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Bullish,
    Bearish,
    Neutral,
}

impl Default for Signal {
    fn default() -> Self {
        Signal::Neutral
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Bullish => write!(f, "bullish"),
            Signal::Bearish => write!(f, "bearish"),
            Signal::Neutral => write!(f, "neutral"),
        }
    }
}

/// Enriched quote: the shared value type read and written by every stage,
/// the persistence store, and gateway-facing code.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TransformedQuote {
    pub symbol: String,
    pub name: String,
    pub exchange: String,
    pub currency: String,
    pub price: f64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub volume: f64,
    pub change: f64,
    pub change_percent: f64,
    pub previous_close: f64,
    pub is_market_open: bool,
    pub average_volume: f64,
    pub fifty_two_week_low: f64,
    pub fifty_two_week_high: f64,
    pub day_range_pct: f64,
    pub fifty_two_week_pct: f64,
    pub gap_pct: f64,
    pub volume_ratio: f64,
    pub intraday_range_pct: f64,
    pub signal: Signal,
    pub timestamp: i64,
}

/// Outcome of one persistence attempt.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PersistResult {
    pub symbol: String,
    pub success: bool,
    pub message: String,
}

/// Last-persisted quote plus its persistence time, owned by the store.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct CachedRecord {
    pub quote: TransformedQuote,
    pub updated_at: DateTime<Utc>,
}

/// Single historical bar.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Bar {
    /// Epoch seconds of the bar open.
    pub timestamp: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub vwap: f64,
    pub trade_count: u64,
}

/// Time-ordered bar sequence for one symbol and timeframe.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct BarSeries {
    pub symbol: String,
    pub timeframe: String,
    pub source: String,
    pub bars: Vec<Bar>,
}

/// Supported historical-bar timeframes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Timeframe {
    #[serde(rename = "1Min")]
    OneMinute,
    #[serde(rename = "30Min")]
    ThirtyMinutes,
    #[serde(rename = "1Hour")]
    OneHour,
    #[serde(rename = "1Day")]
    OneDay,
    #[serde(rename = "1Month")]
    OneMonth,
}

impl Timeframe {
    pub const ALL: [Timeframe; 5] = [
        Timeframe::OneMinute,
        Timeframe::ThirtyMinutes,
        Timeframe::OneHour,
        Timeframe::OneDay,
        Timeframe::OneMonth,
    ];
}

impl fmt::Display for Timeframe {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::OneMinute => "1Min",
            Self::ThirtyMinutes => "30Min",
            Self::OneHour => "1Hour",
            Self::OneDay => "1Day",
            Self::OneMonth => "1Month",
        };
        write!(f, "{}", s)
    }
}

impl FromStr for Timeframe {
    type Err = PipelineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "1Min" => Ok(Self::OneMinute),
            "30Min" => Ok(Self::ThirtyMinutes),
            "1Hour" => Ok(Self::OneHour),
            "1Day" => Ok(Self::OneDay),
            "1Month" => Ok(Self::OneMonth),
            other => Err(PipelineError::InvalidArgument(format!(
                "timeframe must be one of 1Min, 30Min, 1Hour, 1Day, 1Month (got {:?})",
                other
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_symbol() {
        assert_eq!(canonical_symbol(" aapl "), "AAPL");
        assert_eq!(canonical_symbol("MSFT"), "MSFT");
        assert_eq!(canonical_symbol("  "), "");
    }

    #[test]
    fn test_signal_serialization() {
        assert_eq!(serde_json::to_string(&Signal::Bullish).unwrap(), "\"bullish\"");
        let parsed: Signal = serde_json::from_str("\"bearish\"").unwrap();
        assert_eq!(parsed, Signal::Bearish);
    }

    #[test]
    fn test_timeframe_round_trip() {
        for tf in Timeframe::ALL {
            let parsed: Timeframe = tf.to_string().parse().unwrap();
            assert_eq!(parsed, tf);
        }
    }

    #[test]
    fn test_timeframe_rejects_unknown() {
        assert!("2Day".parse::<Timeframe>().is_err());
        assert!("".parse::<Timeframe>().is_err());
    }
}
