//! Persistence service
//!
//! Final pipeline stage. Owns the quote store and exposes it over HTTP:
//! upsert endpoints for the pipeline, read endpoints for the scheduler's
//! freshness sweep.

use std::convert::Infallible;
use std::sync::Arc;
use tracing::error;
use warp::filters::BoxedFilter;
use warp::{Filter, Reply};

use quotepipe_core::{fan_out, PersistResult, PipelineError, TransformedQuote};

use crate::runtime::{error_reply, json_reply, with_state};
use crate::storage::QuoteStore;
use crate::wire::{BulkProcessRequest, BulkProcessResponse, ProcessRequest, SymbolsResponse};

pub struct PersistenceService {
    store: Arc<dyn QuoteStore>,
}

impl PersistenceService {
    pub fn new(store: Arc<dyn QuoteStore>) -> Self {
        Self { store }
    }

    /// Route tree: POST /v1/process, POST /v1/process/bulk,
    /// GET /v1/symbols, GET /v1/records/{symbol}.
    pub fn routes(self: Arc<Self>) -> BoxedFilter<(warp::reply::Response,)> {
        let process = warp::path!("v1" / "process")
            .and(warp::post())
            .and(warp::body::json())
            .and(with_state(self.clone()))
            .and_then(handle_process);

        let bulk = warp::path!("v1" / "process" / "bulk")
            .and(warp::post())
            .and(warp::body::json())
            .and(with_state(self.clone()))
            .and_then(handle_bulk_process);

        let symbols = warp::path!("v1" / "symbols")
            .and(warp::get())
            .and(with_state(self.clone()))
            .and_then(handle_symbols);

        let record = warp::path!("v1" / "records" / String)
            .and(warp::get())
            .and(with_state(self))
            .and_then(handle_record);

        process
            .or(bulk)
            .unify()
            .or(symbols)
            .unify()
            .or(record)
            .unify()
            .boxed()
    }

    /// Store one quote; a storage failure becomes a failed result entry,
    /// not a transport error.
    async fn persist(&self, quote: &TransformedQuote) -> PersistResult {
        if quote.symbol.is_empty() {
            return PersistResult {
                symbol: String::new(),
                success: false,
                message: "quote has no symbol".to_string(),
            };
        }

        match self.store.upsert(quote).await {
            Ok(()) => PersistResult {
                symbol: quote.symbol.clone(),
                success: true,
                message: format!("persisted {} at ${:.2}", quote.symbol, quote.price),
            },
            Err(e) => {
                error!("failed to persist {}: {}", quote.symbol, e);
                PersistResult {
                    symbol: quote.symbol.clone(),
                    success: false,
                    message: e.to_string(),
                }
            }
        }
    }
}

async fn handle_process(
    req: ProcessRequest,
    service: Arc<PersistenceService>,
) -> Result<warp::reply::Response, Infallible> {
    Ok(json_reply(&service.persist(&req.quote).await))
}

async fn handle_bulk_process(
    req: BulkProcessRequest,
    service: Arc<PersistenceService>,
) -> Result<warp::reply::Response, Infallible> {
    let results: Vec<PersistResult> = fan_out(req.quotes, |quote| {
        let service = service.clone();
        async move { Ok(service.persist(&quote).await) }
    })
    .await
    .into_iter()
    .map(|result| match result {
        Ok(result) => result,
        Err(e) => PersistResult {
            symbol: String::new(),
            success: false,
            message: e.to_string(),
        },
    })
    .collect();

    Ok(json_reply(&BulkProcessResponse { results }))
}

async fn handle_symbols(
    service: Arc<PersistenceService>,
) -> Result<warp::reply::Response, Infallible> {
    match service.store.distinct_symbols().await {
        Ok(symbols) => Ok(json_reply(&SymbolsResponse { symbols })),
        Err(e) => {
            error!("failed to list symbols: {}", e);
            Ok(error_reply(&e))
        }
    }
}

async fn handle_record(
    symbol: String,
    service: Arc<PersistenceService>,
) -> Result<warp::reply::Response, Infallible> {
    match service.store.record(&symbol).await {
        Ok(Some(record)) => Ok(json_reply(&record)),
        Ok(None) => Ok(error_reply(&PipelineError::NotFound(format!(
            "no record for symbol {}",
            symbol
        )))),
        Err(e) => {
            error!("failed to read record for {}: {}", symbol, e);
            Ok(error_reply(&e))
        }
    }
}
