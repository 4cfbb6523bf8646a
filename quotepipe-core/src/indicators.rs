//! Quote enrichment indicators
//!
//! Turns a raw provider quote into the enriched form: normalized fields
//! pulled out of the provider attribute map plus computed indicators and the
//! derived trading signal.

use std::collections::HashMap;

use crate::types::{RawQuote, Signal, TransformedQuote};

/// Enrich a raw quote with computed indicators.
///
/// Added fields:
/// - `day_range_pct`: where price sits in today's range (0-100%)
/// - `fifty_two_week_pct`: where price sits in the 52-week range
/// - `gap_pct`: open gap from previous close
/// - `volume_ratio`: current volume vs average volume
/// - `intraday_range_pct`: today's range relative to the open
/// - `signal`: bullish / bearish / neutral
pub fn enrich(raw_quote: &RawQuote) -> TransformedQuote {
    let raw = &raw_quote.raw;

    let change = attr_f64(raw, "change");
    let change_percent = attr_f64(raw, "percent_change");
    let previous_close = attr_f64(raw, "previous_close");
    let average_volume = attr_f64(raw, "average_volume");
    let (ftw_low, ftw_high) = fifty_two_week_range(raw);

    let price = raw_quote.price;
    let high = raw_quote.high;
    let low = raw_quote.low;
    let open = raw_quote.open;

    let day_range = high - low;
    let day_range_pct = safe_pct(price - low, day_range);

    let ftw_range = ftw_high - ftw_low;
    let fifty_two_week_pct = safe_pct(price - ftw_low, ftw_range);

    let gap_pct = safe_pct(open - previous_close, previous_close);
    let volume_ratio = if average_volume != 0.0 {
        round_to(raw_quote.volume / average_volume, 2)
    } else {
        0.0
    };
    let intraday_range_pct = safe_pct(day_range, open);

    let signal = derive_signal(change_percent, volume_ratio, day_range_pct);

    TransformedQuote {
        symbol: raw_quote.symbol.clone(),
        name: attr_str(raw, "name"),
        exchange: attr_str(raw, "exchange"),
        currency: attr_str(raw, "currency"),
        price,
        open,
        high,
        low,
        volume: raw_quote.volume,
        change: round_to(change, 4),
        change_percent: round_to(change_percent, 4),
        previous_close,
        is_market_open: attr_str(raw, "is_market_open").eq_ignore_ascii_case("true"),
        average_volume,
        fifty_two_week_low: ftw_low,
        fifty_two_week_high: ftw_high,
        day_range_pct,
        fifty_two_week_pct,
        gap_pct,
        volume_ratio,
        intraday_range_pct,
        signal,
        timestamp: raw_quote.timestamp,
    }
}

/// Derive a simple trading signal from the indicators.
///
/// Bullish: positive change with elevated volume or price near the day high.
/// Bearish: negative change with elevated volume or price near the day low.
pub fn derive_signal(change_pct: f64, volume_ratio: f64, day_range_pct: f64) -> Signal {
    if change_pct > 0.0 && (volume_ratio > 1.0 || day_range_pct > 66.0) {
        return Signal::Bullish;
    }
    if change_pct < 0.0 && (volume_ratio > 1.0 || day_range_pct < 33.0) {
        return Signal::Bearish;
    }
    Signal::Neutral
}

/// Percentage of `numerator / denominator`, rounded to 2 decimals, 0.0 when
/// the denominator is zero.
fn safe_pct(numerator: f64, denominator: f64) -> f64 {
    if denominator == 0.0 {
        return 0.0;
    }
    round_to(numerator / denominator * 100.0, 2)
}

fn round_to(value: f64, places: u32) -> f64 {
    let factor = 10_f64.powi(places as i32);
    (value * factor).round() / factor
}

/// Parse a float attribute, falling back to 0.0 when absent or malformed.
fn attr_f64(raw: &HashMap<String, String>, key: &str) -> f64 {
    raw.get(key).and_then(|v| v.parse().ok()).unwrap_or(0.0)
}

fn attr_str(raw: &HashMap<String, String>, key: &str) -> String {
    raw.get(key).cloned().unwrap_or_default()
}

/// 52-week low/high, delivered by the provider as a nested JSON string.
fn fifty_two_week_range(raw: &HashMap<String, String>) -> (f64, f64) {
    let nested = match raw.get("fifty_two_week") {
        Some(v) if v.starts_with('{') => v,
        _ => return (0.0, 0.0),
    };
    match serde_json::from_str::<serde_json::Value>(nested) {
        Ok(value) => (json_f64(&value, "low"), json_f64(&value, "high")),
        Err(_) => (0.0, 0.0),
    }
}

fn json_f64(value: &serde_json::Value, key: &str) -> f64 {
    match value.get(key) {
        Some(serde_json::Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(serde_json::Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw_quote(attrs: &[(&str, &str)]) -> RawQuote {
        RawQuote {
            symbol: "AAPL".to_string(),
            price: 150.0,
            open: 148.0,
            high: 151.0,
            low: 147.0,
            volume: 50_000_000.0,
            timestamp: 1_736_350_000,
            source: "twelvedata".to_string(),
            raw: attrs
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    #[test]
    fn test_enrich_bullish_example() {
        let raw = raw_quote(&[
            ("change", "2.0"),
            ("percent_change", "1.35"),
            ("previous_close", "148.0"),
            ("average_volume", "40000000"),
        ]);

        let quote = enrich(&raw);
        assert_eq!(quote.symbol, "AAPL");
        assert_eq!(quote.day_range_pct, 75.0);
        assert_eq!(quote.volume_ratio, 1.25);
        assert_eq!(quote.change_percent, 1.35);
        assert_eq!(quote.signal, Signal::Bullish);
    }

    #[test]
    fn test_enrich_handles_zero_denominators() {
        let mut raw = raw_quote(&[]);
        raw.high = raw.low; // zero day range
        raw.open = 0.0;

        let quote = enrich(&raw);
        assert_eq!(quote.day_range_pct, 0.0);
        assert_eq!(quote.gap_pct, 0.0);
        assert_eq!(quote.volume_ratio, 0.0);
        assert_eq!(quote.intraday_range_pct, 0.0);
        assert_eq!(quote.fifty_two_week_pct, 0.0);
    }

    #[test]
    fn test_enrich_parses_nested_fifty_two_week() {
        let raw = raw_quote(&[(
            "fifty_two_week",
            r#"{"low": "120.5", "high": "199.6", "low_change": "29.5"}"#,
        )]);

        let quote = enrich(&raw);
        assert_eq!(quote.fifty_two_week_low, 120.5);
        assert_eq!(quote.fifty_two_week_high, 199.6);
        // (150 - 120.5) / (199.6 - 120.5) * 100 = 37.29...
        assert_eq!(quote.fifty_two_week_pct, 37.29);
    }

    #[test]
    fn test_enrich_ignores_malformed_fifty_two_week() {
        let raw = raw_quote(&[("fifty_two_week", "{not json")]);
        let quote = enrich(&raw);
        assert_eq!(quote.fifty_two_week_low, 0.0);
        assert_eq!(quote.fifty_two_week_high, 0.0);
    }

    #[test]
    fn test_signal_bullish_requires_confirmation() {
        assert_eq!(derive_signal(1.0, 1.5, 50.0), Signal::Bullish);
        assert_eq!(derive_signal(1.0, 0.5, 80.0), Signal::Bullish);
        assert_eq!(derive_signal(1.0, 0.5, 50.0), Signal::Neutral);
    }

    #[test]
    fn test_signal_bearish_requires_confirmation() {
        assert_eq!(derive_signal(-1.0, 1.5, 50.0), Signal::Bearish);
        assert_eq!(derive_signal(-1.0, 0.5, 20.0), Signal::Bearish);
        assert_eq!(derive_signal(-1.0, 0.5, 50.0), Signal::Neutral);
    }

    #[test]
    fn test_signal_neutral_on_flat_change() {
        assert_eq!(derive_signal(0.0, 5.0, 90.0), Signal::Neutral);
    }
}
