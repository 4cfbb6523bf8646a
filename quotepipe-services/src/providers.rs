//! Upstream market data providers
//!
//! HTTP clients for the quote provider (TwelveData-compatible) and the
//! historical bars provider (Alpaca-compatible data API). Both translate
//! provider failures into the shared error taxonomy at the edge.

use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use url::Url;

use quotepipe_core::{
    Bar, BarSeries, Config, PipelineError, PipelineResult, RateLimiter, RawQuote, Timeframe,
};

const PROVIDER_TIMEOUT: Duration = Duration::from_secs(10);
const BARS_PAGE_LIMIT: u32 = 10_000;

/// Client for the rate-limited quote provider.
///
/// Every call, single or bulk fan-out, goes through the shared
/// [`RateLimiter`], so the provider never sees calls above its plan.
pub struct TwelveDataClient {
    http: Client,
    base_url: Url,
    api_key: String,
    limiter: Arc<RateLimiter>,
}

impl TwelveDataClient {
    pub fn new(config: &Config, limiter: Arc<RateLimiter>) -> PipelineResult<Self> {
        let http = Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .map_err(PipelineError::from)?;
        let base_url = Url::parse(&config.twelve_data_base_url).map_err(|e| {
            PipelineError::InvalidArgument(format!(
                "invalid quote provider base url {:?}: {}",
                config.twelve_data_base_url, e
            ))
        })?;
        Ok(Self {
            http,
            base_url,
            api_key: config.twelve_data_api_key.clone(),
            limiter,
        })
    }

    /// Fetch the current quote for one symbol.
    pub async fn quote(&self, symbol: &str) -> PipelineResult<RawQuote> {
        self.limiter.acquire().await;

        let url = self.base_url.join("/quote").map_err(|e| {
            PipelineError::Internal(format!("failed to build quote url: {}", e))
        })?;
        let response = self
            .http
            .get(url)
            .query(&[("symbol", symbol), ("apikey", &self.api_key)])
            .send()
            .await
            .map_err(PipelineError::from)?;

        let status = response.status().as_u16();
        if status >= 500 {
            return Err(PipelineError::Unavailable(format!(
                "quote provider returned {} for {}",
                status, symbol
            )));
        }
        if status >= 400 {
            return Err(PipelineError::from_status(
                status,
                format!("quote provider returned {} for {}", status, symbol),
            ));
        }

        let payload: Value = response.json().await.map_err(PipelineError::from)?;
        // The provider reports symbol-level failures as 200 responses with an
        // embedded code.
        if let Some(code) = payload.get("code").and_then(Value::as_i64) {
            let message = payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("quote provider error")
                .to_string();
            return Err(map_provider_code(code, symbol, message));
        }

        let quote = parse_quote(symbol, &payload);
        info!("fetched {}: ${:.2}", quote.symbol, quote.price);
        Ok(quote)
    }
}

/// Map an embedded provider error code onto the taxonomy.
fn map_provider_code(code: i64, symbol: &str, message: String) -> PipelineError {
    match code {
        404 => PipelineError::NotFound(format!("symbol {} not found: {}", symbol, message)),
        401 | 403 => PipelineError::Unauthenticated(message),
        _ => PipelineError::Unavailable(format!(
            "quote provider error {} for {}: {}",
            code, symbol, message
        )),
    }
}

/// Build a [`RawQuote`] from the provider payload.
///
/// Core fields are pulled out as numbers; everything else lands in `raw` as
/// strings, with nested objects serialized to JSON strings so later stages
/// can parse them without knowing the provider schema.
fn parse_quote(symbol: &str, payload: &Value) -> RawQuote {
    let mut raw = HashMap::new();
    if let Some(fields) = payload.as_object() {
        for (key, value) in fields {
            let text = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            raw.insert(key.clone(), text);
        }
    }

    RawQuote {
        symbol: payload
            .get("symbol")
            .and_then(Value::as_str)
            .unwrap_or(symbol)
            .to_string(),
        price: field_f64(payload, "close"),
        open: field_f64(payload, "open"),
        high: field_f64(payload, "high"),
        low: field_f64(payload, "low"),
        volume: field_f64(payload, "volume"),
        timestamp: chrono::Utc::now().timestamp(),
        source: "twelvedata".to_string(),
        raw,
    }
}

/// Numeric payload field; the provider emits numbers as JSON strings.
fn field_f64(payload: &Value, key: &str) -> f64 {
    match payload.get(key) {
        Some(Value::Number(n)) => n.as_f64().unwrap_or(0.0),
        Some(Value::String(s)) => s.parse().unwrap_or(0.0),
        _ => 0.0,
    }
}

/// Client for the historical bars provider.
pub struct AlpacaClient {
    http: Client,
    base_url: Url,
    key_id: String,
    secret_key: String,
}

#[derive(Debug, Deserialize)]
struct AlpacaBarsResponse {
    #[serde(default)]
    bars: Option<Vec<AlpacaBar>>,
}

#[derive(Debug, Deserialize)]
struct AlpacaBar {
    t: String,
    o: f64,
    h: f64,
    l: f64,
    c: f64,
    v: f64,
    #[serde(default)]
    n: u64,
    #[serde(default)]
    vw: f64,
}

impl AlpacaClient {
    pub fn new(config: &Config) -> PipelineResult<Self> {
        let http = Client::builder()
            .timeout(PROVIDER_TIMEOUT)
            .build()
            .map_err(PipelineError::from)?;
        let base_url = Url::parse(&config.alpaca_base_url).map_err(|e| {
            PipelineError::InvalidArgument(format!(
                "invalid bars provider base url {:?}: {}",
                config.alpaca_base_url, e
            ))
        })?;
        Ok(Self {
            http,
            base_url,
            key_id: config.alpaca_key_id.clone(),
            secret_key: config.alpaca_secret_key.clone(),
        })
    }

    /// Fetch historical bars for one symbol over a validated window.
    /// Bars come back sorted ascending by open time.
    pub async fn bars(
        &self,
        symbol: &str,
        timeframe: Timeframe,
        start: &str,
        end: &str,
    ) -> PipelineResult<BarSeries> {
        let url = self
            .base_url
            .join(&format!("/v2/stocks/{}/bars", symbol))
            .map_err(|e| PipelineError::Internal(format!("failed to build bars url: {}", e)))?;
        let response = self
            .http
            .get(url)
            .header("APCA-API-KEY-ID", &self.key_id)
            .header("APCA-API-SECRET-KEY", &self.secret_key)
            .query(&[
                ("timeframe", timeframe.to_string()),
                ("start", start.to_string()),
                ("end", end.to_string()),
                ("adjustment", "raw".to_string()),
                ("limit", BARS_PAGE_LIMIT.to_string()),
            ])
            .send()
            .await
            .map_err(PipelineError::from)?;

        let status = response.status().as_u16();
        if status >= 400 {
            return Err(map_bars_status(status, symbol));
        }

        let payload: AlpacaBarsResponse = response.json().await.map_err(PipelineError::from)?;
        let mut bars = Vec::new();
        for bar in payload.bars.unwrap_or_default() {
            match chrono::DateTime::parse_from_rfc3339(&bar.t) {
                Ok(open_time) => bars.push(Bar {
                    timestamp: open_time.timestamp(),
                    open: bar.o,
                    high: bar.h,
                    low: bar.l,
                    close: bar.c,
                    volume: bar.v,
                    vwap: bar.vw,
                    trade_count: bar.n,
                }),
                Err(e) => {
                    warn!("skipping bar with bad timestamp {:?}: {}", bar.t, e);
                }
            }
        }
        bars.sort_by_key(|b| b.timestamp);

        info!(
            "fetched {} {} bars for {}",
            bars.len(),
            timeframe,
            symbol
        );
        Ok(BarSeries {
            symbol: symbol.to_string(),
            timeframe: timeframe.to_string(),
            source: "alpaca".to_string(),
            bars,
        })
    }
}

fn map_bars_status(status: u16, symbol: &str) -> PipelineError {
    match status {
        401 | 403 => PipelineError::Unauthenticated(format!(
            "bars provider rejected credentials ({})",
            status
        )),
        404 => PipelineError::NotFound(format!("symbol {} not found", symbol)),
        422 => PipelineError::InvalidArgument(format!(
            "bars provider rejected the request for {}",
            symbol
        )),
        500..=599 => PipelineError::Unavailable(format!(
            "bars provider returned {} for {}",
            status, symbol
        )),
        _ => PipelineError::from_status(status, format!("bars provider returned {}", status)),
    }
}
