//! Quote Pipeline Core
//!
//! Domain logic shared by every quotepipe service: the quote data model,
//! the pipeline error taxonomy, process configuration, the market-aware
//! freshness policy, the provider rate limiter, enrichment indicators, and
//! order-preserving bulk fan-out. No network code lives here.

pub mod config;
pub mod errors;
pub mod fanout;
pub mod indicators;
pub mod market_hours;
pub mod rate_limiter;
pub mod types;

// Re-export main types for easy access
pub use config::Config;
pub use errors::{ErrorBody, ErrorCode, PipelineError, PipelineResult};
pub use fanout::{fan_out, into_outcomes, ItemOutcome};
pub use rate_limiter::RateLimiter;
pub use types::{
    canonical_symbol, Bar, BarSeries, CachedRecord, PersistResult, RawQuote, Signal, Timeframe,
    TransformedQuote,
};
