//! Quote storage
//!
//! The persistence stage and the scheduler both talk to storage through
//! [`QuoteStore`]: the service owns an in-process store, while the scheduler
//! can use either the same store or a remote view over the persistence
//! service (see `clients::RemoteQuoteStore`).

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tracing::debug;

use quotepipe_core::{CachedRecord, PipelineResult, TransformedQuote};

/// Keyed cache of the latest enriched quote per symbol.
#[async_trait]
pub trait QuoteStore: Send + Sync {
    /// All symbols that have ever been persisted.
    async fn distinct_symbols(&self) -> PipelineResult<Vec<String>>;

    /// Latest record for a symbol, if any.
    async fn record(&self, symbol: &str) -> PipelineResult<Option<CachedRecord>>;

    /// Insert or replace the record for `quote.symbol`, stamping the
    /// persistence time.
    async fn upsert(&self, quote: &TransformedQuote) -> PipelineResult<()>;
}

/// In-process [`QuoteStore`] holding one record per symbol.
pub struct InMemoryStore {
    records: DashMap<String, CachedRecord>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl QuoteStore for InMemoryStore {
    async fn distinct_symbols(&self) -> PipelineResult<Vec<String>> {
        let mut symbols: Vec<String> = self.records.iter().map(|e| e.key().clone()).collect();
        symbols.sort();
        Ok(symbols)
    }

    async fn record(&self, symbol: &str) -> PipelineResult<Option<CachedRecord>> {
        Ok(self.records.get(symbol).map(|e| e.value().clone()))
    }

    async fn upsert(&self, quote: &TransformedQuote) -> PipelineResult<()> {
        let record = CachedRecord {
            quote: quote.clone(),
            updated_at: Utc::now(),
        };
        debug!("upserting {} at ${:.2}", quote.symbol, quote.price);
        self.records.insert(quote.symbol.clone(), record);
        Ok(())
    }
}
