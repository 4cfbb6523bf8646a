//! Market data service
//!
//! Fetch stage of the pipeline. Exposes single-quote, bulk-quote, and
//! historical-bars endpoints over the upstream providers.

use std::convert::Infallible;
use std::sync::Arc;
use tracing::error;
use warp::filters::BoxedFilter;
use warp::{Filter, Reply};

use quotepipe_core::{canonical_symbol, fan_out, into_outcomes, PipelineError};

use crate::providers::{AlpacaClient, TwelveDataClient};
use crate::runtime::{error_reply, json_reply, with_state};
use crate::wire::{validate_bars_request, BarsRequest, BulkQuoteRequest, BulkQuoteResponse, QuoteRequest};

pub struct MarketDataService {
    quotes: TwelveDataClient,
    bars: AlpacaClient,
}

impl MarketDataService {
    pub fn new(quotes: TwelveDataClient, bars: AlpacaClient) -> Self {
        Self { quotes, bars }
    }

    /// Route tree: POST /v1/quote, POST /v1/quotes/bulk, POST /v1/bars.
    pub fn routes(self: Arc<Self>) -> BoxedFilter<(warp::reply::Response,)> {
        let fetch = warp::path!("v1" / "quote")
            .and(warp::post())
            .and(warp::body::json())
            .and(with_state(self.clone()))
            .and_then(handle_fetch);

        let bulk_fetch = warp::path!("v1" / "quotes" / "bulk")
            .and(warp::post())
            .and(warp::body::json())
            .and(with_state(self.clone()))
            .and_then(handle_bulk_fetch);

        let bars = warp::path!("v1" / "bars")
            .and(warp::post())
            .and(warp::body::json())
            .and(with_state(self))
            .and_then(handle_bars);

        fetch.or(bulk_fetch).unify().or(bars).unify().boxed()
    }
}

async fn handle_fetch(
    req: QuoteRequest,
    service: Arc<MarketDataService>,
) -> Result<warp::reply::Response, Infallible> {
    let symbol = canonical_symbol(&req.symbol);
    if symbol.is_empty() {
        return Ok(error_reply(&PipelineError::InvalidArgument(
            "symbol is required".to_string(),
        )));
    }

    match service.quotes.quote(&symbol).await {
        Ok(quote) => Ok(json_reply(&quote)),
        Err(e) => {
            error!("quote fetch failed for {}: {}", symbol, e);
            Ok(error_reply(&e))
        }
    }
}

async fn handle_bulk_fetch(
    req: BulkQuoteRequest,
    service: Arc<MarketDataService>,
) -> Result<warp::reply::Response, Infallible> {
    let results = fan_out(req.symbols, |symbol| {
        let service = service.clone();
        async move {
            let symbol = canonical_symbol(&symbol);
            if symbol.is_empty() {
                return Err(PipelineError::InvalidArgument(
                    "symbol is required".to_string(),
                ));
            }
            service.quotes.quote(&symbol).await
        }
    })
    .await;

    Ok(json_reply(&BulkQuoteResponse {
        results: into_outcomes(results),
    }))
}

async fn handle_bars(
    req: BarsRequest,
    service: Arc<MarketDataService>,
) -> Result<warp::reply::Response, Infallible> {
    let valid = match validate_bars_request(&req) {
        Ok(valid) => valid,
        Err(e) => return Ok(error_reply(&e)),
    };

    match service
        .bars
        .bars(&valid.symbol, valid.timeframe, &req.start, &req.end)
        .await
    {
        Ok(series) => Ok(json_reply(&series)),
        Err(e) => {
            error!("bars fetch failed for {}: {}", valid.symbol, e);
            Ok(error_reply(&e))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quotepipe_core::{Config, ErrorBody, ErrorCode, RateLimiter};

    fn service() -> Arc<MarketDataService> {
        let config = Config::default();
        let limiter = Arc::new(RateLimiter::new(config.twelve_data_rate_limit));
        Arc::new(MarketDataService::new(
            TwelveDataClient::new(&config, limiter).unwrap(),
            AlpacaClient::new(&config).unwrap(),
        ))
    }

    #[tokio::test]
    async fn test_empty_symbol_is_rejected_without_dispatch() {
        let routes = service().routes();
        let resp = warp::test::request()
            .method("POST")
            .path("/v1/quote")
            .json(&QuoteRequest {
                symbol: "  ".to_string(),
            })
            .reply(&routes)
            .await;

        assert_eq!(resp.status(), 400);
        let body: ErrorBody = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body.code, ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn test_invalid_bars_window_is_rejected_without_dispatch() {
        let routes = service().routes();
        let resp = warp::test::request()
            .method("POST")
            .path("/v1/bars")
            .json(&BarsRequest {
                symbol: "AAPL".to_string(),
                timeframe: "1Day".to_string(),
                start: "2025-02-01T00:00:00Z".to_string(),
                end: "2025-01-01T00:00:00Z".to_string(),
            })
            .reply(&routes)
            .await;

        assert_eq!(resp.status(), 400);
        let body: ErrorBody = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body.code, ErrorCode::InvalidArgument);
    }

    #[tokio::test]
    async fn test_empty_bulk_request_returns_empty_results() {
        let routes = service().routes();
        let resp = warp::test::request()
            .method("POST")
            .path("/v1/quotes/bulk")
            .json(&BulkQuoteRequest { symbols: vec![] })
            .reply(&routes)
            .await;

        assert_eq!(resp.status(), 200);
        let body: BulkQuoteResponse = serde_json::from_slice(resp.body()).unwrap();
        assert!(body.results.is_empty());
    }
}
