//! Background refresh scheduler
//!
//! Periodically sweeps every tracked symbol, polls only the stale ones
//! through the bulk pipeline, and paces itself by market state: tight
//! while the market is open, relaxed while it is closed. A tick that fails
//! is logged and the loop continues; shutdown is honored at every
//! suspension point.

use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::time::sleep;
use tracing::{error, info};

use quotepipe_core::{market_hours, Config, PipelineResult, RawQuote, TransformedQuote};

use crate::clients::{MarketDataApi, PersistenceApi, TransformerApi};
use crate::orchestrator::timed_stage;
use crate::storage::QuoteStore;

pub struct Scheduler {
    store: Arc<dyn QuoteStore>,
    market_data: Arc<dyn MarketDataApi>,
    transformer: Arc<dyn TransformerApi>,
    persistence: Arc<dyn PersistenceApi>,
    staleness_seconds: u64,
    startup_delay: Duration,
    open_interval: Duration,
    closed_interval: Duration,
    fetch_timeout: Duration,
    transform_timeout: Duration,
    persist_timeout: Duration,
    shutdown: watch::Receiver<bool>,
}

impl Scheduler {
    pub fn new(
        config: &Config,
        store: Arc<dyn QuoteStore>,
        market_data: Arc<dyn MarketDataApi>,
        transformer: Arc<dyn TransformerApi>,
        persistence: Arc<dyn PersistenceApi>,
        shutdown: watch::Receiver<bool>,
    ) -> Self {
        Self {
            store,
            market_data,
            transformer,
            persistence,
            staleness_seconds: config.quote_staleness_seconds,
            startup_delay: Duration::from_secs(config.scheduler_startup_delay_secs),
            open_interval: Duration::from_secs(config.market_open_interval_secs),
            closed_interval: Duration::from_secs(config.market_closed_interval_secs),
            fetch_timeout: Duration::from_secs(config.bulk_fetch_timeout_secs),
            transform_timeout: Duration::from_secs(config.bulk_transform_timeout_secs),
            persist_timeout: Duration::from_secs(config.bulk_persist_timeout_secs),
            shutdown,
        }
    }

    /// Run until the shutdown channel fires or closes.
    pub async fn run(self) {
        info!(
            "scheduler starting (staleness {}s, open interval {:?}, closed interval {:?})",
            self.staleness_seconds, self.open_interval, self.closed_interval
        );
        // One receiver observes the whole loop, so a signal sent at any
        // point, including while a tick is in flight, is seen at the very
        // next suspension.
        let mut shutdown = self.shutdown.clone();
        if !pause(&mut shutdown, self.startup_delay).await {
            info!("scheduler shutting down");
            return;
        }

        loop {
            let now = Utc::now();
            let market_open = market_hours::is_market_open(now);
            let market_status = if market_open { "open" } else { "closed" };

            tokio::select! {
                result = self.tick(now, market_status) => {
                    if let Err(e) = result {
                        error!("scheduler tick failed: {}", e);
                    }
                }
                _ = shutdown.changed() => {
                    info!("scheduler shutting down");
                    return;
                }
            }

            let interval = if market_open {
                self.open_interval
            } else {
                self.closed_interval
            };
            if !pause(&mut shutdown, interval).await {
                info!("scheduler shutting down");
                return;
            }
        }
    }

    /// One sweep: find stale symbols and push them through the bulk
    /// pipeline. Freshness is judged against `now` under the market-aware
    /// policy, so a closed market never re-polls quotes already carrying
    /// the last session close.
    async fn tick(&self, now: DateTime<Utc>, market_status: &str) -> PipelineResult<()> {
        let symbols = self.store.distinct_symbols().await?;
        if symbols.is_empty() {
            info!("no tracked symbols yet (market {})", market_status);
            return Ok(());
        }

        let mut stale = Vec::new();
        for symbol in &symbols {
            let updated_at = self.store.record(symbol).await?.map(|r| r.updated_at);
            if !market_hours::is_fresh(updated_at, self.staleness_seconds, now) {
                stale.push(symbol.clone());
            }
        }
        if stale.is_empty() {
            info!(
                "all {} symbols fresh, skipping poll (market {})",
                symbols.len(),
                market_status
            );
            return Ok(());
        }
        info!(
            "polling {}/{} stale symbols (market {})",
            stale.len(),
            symbols.len(),
            market_status
        );

        let outcomes = timed_stage(
            "bulk fetch",
            self.fetch_timeout,
            self.market_data.bulk_fetch(&stale),
        )
        .await?;
        let raw: Vec<RawQuote> = outcomes
            .into_iter()
            .filter_map(|o| o.into_result().ok())
            .collect();
        if raw.is_empty() {
            info!("no quotes fetched for {} stale symbols", stale.len());
            return Ok(());
        }

        let outcomes = timed_stage(
            "bulk transform",
            self.transform_timeout,
            self.transformer.bulk_transform(&raw),
        )
        .await?;
        let transformed: Vec<TransformedQuote> = outcomes
            .into_iter()
            .filter_map(|o| o.into_result().ok())
            .collect();
        if transformed.is_empty() {
            return Ok(());
        }

        let results = timed_stage(
            "bulk persist",
            self.persist_timeout,
            self.persistence.bulk_process(&transformed),
        )
        .await?;
        let saved = results.iter().filter(|r| r.success).count();
        info!("refreshed {}/{} stale symbols", saved, stale.len());
        Ok(())
    }
}

/// Sleep `duration`, returning false if shutdown fired first.
async fn pause(shutdown: &mut watch::Receiver<bool>, duration: Duration) -> bool {
    tokio::select! {
        _ = sleep(duration) => true,
        _ = shutdown.changed() => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::InMemoryStore;
    use crate::wire::BarsRequest;
    use async_trait::async_trait;
    use quotepipe_core::{
        BarSeries, CachedRecord, ItemOutcome, PersistResult, PipelineError, PipelineResult,
    };
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingMarketData {
        bulk_calls: AtomicUsize,
        fail: bool,
    }

    #[async_trait]
    impl MarketDataApi for CountingMarketData {
        async fn fetch(&self, symbol: &str) -> PipelineResult<RawQuote> {
            Ok(RawQuote {
                symbol: symbol.to_string(),
                price: 150.25,
                ..Default::default()
            })
        }

        async fn bulk_fetch(
            &self,
            symbols: &[String],
        ) -> PipelineResult<Vec<ItemOutcome<RawQuote>>> {
            self.bulk_calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                return Err(PipelineError::Unavailable("provider down".into()));
            }
            let mut results = Vec::new();
            for symbol in symbols {
                results.push(self.fetch(symbol).await.into());
            }
            Ok(results)
        }

        async fn historical_bars(&self, _request: &BarsRequest) -> PipelineResult<BarSeries> {
            unreachable!("scheduler never requests bars")
        }
    }

    #[derive(Default)]
    struct CountingTransformer {
        bulk_calls: AtomicUsize,
    }

    #[async_trait]
    impl TransformerApi for CountingTransformer {
        async fn transform(&self, raw: &RawQuote) -> PipelineResult<TransformedQuote> {
            Ok(TransformedQuote {
                symbol: raw.symbol.clone(),
                price: raw.price,
                ..Default::default()
            })
        }

        async fn bulk_transform(
            &self,
            raw: &[RawQuote],
        ) -> PipelineResult<Vec<ItemOutcome<TransformedQuote>>> {
            self.bulk_calls.fetch_add(1, Ordering::SeqCst);
            let mut results = Vec::new();
            for quote in raw {
                results.push(self.transform(quote).await.into());
            }
            Ok(results)
        }
    }

    #[derive(Default)]
    struct CountingPersistence {
        bulk_calls: AtomicUsize,
    }

    #[async_trait]
    impl PersistenceApi for CountingPersistence {
        async fn process(&self, quote: &TransformedQuote) -> PipelineResult<PersistResult> {
            Ok(PersistResult {
                symbol: quote.symbol.clone(),
                success: true,
                message: "persisted".to_string(),
            })
        }

        async fn bulk_process(
            &self,
            quotes: &[TransformedQuote],
        ) -> PipelineResult<Vec<PersistResult>> {
            self.bulk_calls.fetch_add(1, Ordering::SeqCst);
            let mut results = Vec::new();
            for quote in quotes {
                results.push(self.process(quote).await?);
            }
            Ok(results)
        }
    }

    struct Fixture {
        scheduler: Scheduler,
        store: Arc<InMemoryStore>,
        market_data: Arc<CountingMarketData>,
        transformer: Arc<CountingTransformer>,
        persistence: Arc<CountingPersistence>,
        shutdown: watch::Sender<bool>,
    }

    fn fixture(market_data: CountingMarketData) -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let market_data = Arc::new(market_data);
        let transformer = Arc::new(CountingTransformer::default());
        let persistence = Arc::new(CountingPersistence::default());
        let (shutdown, shutdown_rx) = watch::channel(false);
        let scheduler = Scheduler::new(
            &Config::default(),
            store.clone(),
            market_data.clone(),
            transformer.clone(),
            persistence.clone(),
            shutdown_rx,
        );
        Fixture {
            scheduler,
            store,
            market_data,
            transformer,
            persistence,
            shutdown,
        }
    }

    fn quote(symbol: &str) -> TransformedQuote {
        TransformedQuote {
            symbol: symbol.to_string(),
            price: 150.25,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn test_tick_with_no_symbols_makes_no_calls() {
        let f = fixture(CountingMarketData::default());
        f.scheduler.tick(Utc::now(), "open").await.unwrap();
        assert_eq!(f.market_data.bulk_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tick_skips_fresh_symbols() {
        let f = fixture(CountingMarketData::default());
        // Freshly persisted records satisfy both the open-market age check
        // and the closed-market session check.
        f.store.upsert(&quote("AAPL")).await.unwrap();
        f.store.upsert(&quote("MSFT")).await.unwrap();

        f.scheduler.tick(Utc::now(), "open").await.unwrap();
        assert_eq!(f.market_data.bulk_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.transformer.bulk_calls.load(Ordering::SeqCst), 0);
        assert_eq!(f.persistence.bulk_calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_tick_polls_stale_symbols_through_all_stages() {
        let f = fixture(CountingMarketData::default());
        f.store.upsert(&quote("AAPL")).await.unwrap();

        // A tick far in the future sees the record as stale in any regime.
        let later = Utc::now() + chrono::Duration::days(30);
        f.scheduler.tick(later, "open").await.unwrap();

        assert_eq!(f.market_data.bulk_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.transformer.bulk_calls.load(Ordering::SeqCst), 1);
        assert_eq!(f.persistence.bulk_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_tick_surfaces_fetch_failure_without_downstream_calls() {
        let f = fixture(CountingMarketData {
            fail: true,
            ..Default::default()
        });
        f.store.upsert(&quote("AAPL")).await.unwrap();

        let later = Utc::now() + chrono::Duration::days(30);
        let err = f.scheduler.tick(later, "open").await.unwrap_err();
        assert!(matches!(err, PipelineError::Unavailable(_)));
        assert_eq!(f.transformer.bulk_calls.load(Ordering::SeqCst), 0);
    }

    /// Store with tracked symbols but no records, so every sweep sees them
    /// as stale.
    struct TrackedSymbolStore {
        symbols: Vec<String>,
    }

    #[async_trait]
    impl QuoteStore for TrackedSymbolStore {
        async fn distinct_symbols(&self) -> PipelineResult<Vec<String>> {
            Ok(self.symbols.clone())
        }

        async fn record(&self, _symbol: &str) -> PipelineResult<Option<CachedRecord>> {
            Ok(None)
        }

        async fn upsert(&self, _quote: &TransformedQuote) -> PipelineResult<()> {
            Ok(())
        }
    }

    /// Market data stub that raises the stop signal while its poll is still
    /// in flight.
    struct SignalingMarketData {
        bulk_calls: AtomicUsize,
        shutdown: watch::Sender<bool>,
    }

    #[async_trait]
    impl MarketDataApi for SignalingMarketData {
        async fn fetch(&self, symbol: &str) -> PipelineResult<RawQuote> {
            Ok(RawQuote {
                symbol: symbol.to_string(),
                price: 150.25,
                ..Default::default()
            })
        }

        async fn bulk_fetch(
            &self,
            symbols: &[String],
        ) -> PipelineResult<Vec<ItemOutcome<RawQuote>>> {
            self.bulk_calls.fetch_add(1, Ordering::SeqCst);
            let _ = self.shutdown.send(true);
            let mut results = Vec::new();
            for symbol in symbols {
                results.push(self.fetch(symbol).await.into());
            }
            Ok(results)
        }

        async fn historical_bars(&self, _request: &BarsRequest) -> PipelineResult<BarSeries> {
            unreachable!("scheduler never requests bars")
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_tick_prevents_further_polls() {
        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        let market_data = Arc::new(SignalingMarketData {
            bulk_calls: AtomicUsize::new(0),
            shutdown: shutdown_tx,
        });
        let scheduler = Scheduler::new(
            &Config::default(),
            Arc::new(TrackedSymbolStore {
                symbols: vec!["AAPL".to_string()],
            }),
            market_data.clone(),
            Arc::new(CountingTransformer::default()),
            Arc::new(CountingPersistence::default()),
            shutdown_rx,
        );

        let handle = tokio::spawn(scheduler.run());
        tokio::time::timeout(Duration::from_secs(3600), handle)
            .await
            .unwrap()
            .unwrap();

        // The loop stops at its next suspension point; no second poll round.
        assert_eq!(market_data.bulk_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_shutdown_during_startup_delay_stops_the_loop() {
        let f = fixture(CountingMarketData::default());
        let market_data = f.market_data.clone();
        let shutdown = f.shutdown;

        let handle = tokio::spawn(f.scheduler.run());
        tokio::task::yield_now().await;
        shutdown.send(true).unwrap();
        handle.await.unwrap();

        assert_eq!(market_data.bulk_calls.load(Ordering::SeqCst), 0);
    }
}
