//! Pipeline orchestrator
//!
//! Drives the fetch -> transform -> persist sequence for one symbol, and
//! historical bar lookups. Each stage runs under its own deadline; a stage
//! that exceeds it surfaces as `Unavailable` naming the stage.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

use quotepipe_core::{
    canonical_symbol, BarSeries, Config, PipelineError, PipelineResult, TransformedQuote,
};

use crate::clients::{MarketDataApi, PersistenceApi, TransformerApi};
use crate::wire::{validate_bars_request, BarsRequest};

/// Per-stage deadlines for single-symbol runs.
#[derive(Clone, Copy, Debug)]
pub struct StageTimeouts {
    pub fetch: Duration,
    pub transform: Duration,
    pub persist: Duration,
}

impl StageTimeouts {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fetch: Duration::from_secs(config.fetch_timeout_secs),
            transform: Duration::from_secs(config.transform_timeout_secs),
            persist: Duration::from_secs(config.persist_timeout_secs),
        }
    }
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

/// Run a stage under its deadline.
pub(crate) async fn timed_stage<T>(
    stage: &str,
    limit: Duration,
    fut: impl Future<Output = PipelineResult<T>>,
) -> PipelineResult<T> {
    match tokio::time::timeout(limit, fut).await {
        Ok(result) => result,
        Err(_) => Err(PipelineError::Unavailable(format!(
            "{} stage timed out after {:?}",
            stage, limit
        ))),
    }
}

pub struct PipelineOrchestrator {
    market_data: Arc<dyn MarketDataApi>,
    transformer: Arc<dyn TransformerApi>,
    persistence: Arc<dyn PersistenceApi>,
    timeouts: StageTimeouts,
}

impl PipelineOrchestrator {
    pub fn new(
        market_data: Arc<dyn MarketDataApi>,
        transformer: Arc<dyn TransformerApi>,
        persistence: Arc<dyn PersistenceApi>,
        timeouts: StageTimeouts,
    ) -> Self {
        Self {
            market_data,
            transformer,
            persistence,
            timeouts,
        }
    }

    /// Full pipeline for one symbol: fetch, enrich, persist, return the
    /// enriched quote. The symbol is canonicalized first; an empty result
    /// rejects before any remote call.
    pub async fn fetch_quote(&self, symbol: &str) -> PipelineResult<TransformedQuote> {
        let symbol = canonical_symbol(symbol);
        if symbol.is_empty() {
            return Err(PipelineError::InvalidArgument(
                "symbol is required".to_string(),
            ));
        }
        debug!("running pipeline for {}", symbol);

        let raw = timed_stage(
            "fetch",
            self.timeouts.fetch,
            self.market_data.fetch(&symbol),
        )
        .await?;
        let quote = timed_stage(
            "transform",
            self.timeouts.transform,
            self.transformer.transform(&raw),
        )
        .await?;
        let persisted = timed_stage(
            "persist",
            self.timeouts.persist,
            self.persistence.process(&quote),
        )
        .await?;

        if !persisted.success {
            debug!("persist reported failure for {}: {}", symbol, persisted.message);
        }
        info!("pipeline complete for {}: ${:.2}", quote.symbol, quote.price);
        Ok(quote)
    }

    /// Historical bars for one symbol. The request is validated before any
    /// dispatch; provider errors pass through unchanged.
    pub async fn fetch_historical_bars(&self, request: &BarsRequest) -> PipelineResult<BarSeries> {
        let valid = validate_bars_request(request)?;
        let request = BarsRequest {
            symbol: valid.symbol,
            timeframe: valid.timeframe.to_string(),
            start: request.start.clone(),
            end: request.end.clone(),
        };
        timed_stage(
            "fetch",
            self.timeouts.fetch,
            self.market_data.historical_bars(&request),
        )
        .await
    }
}
