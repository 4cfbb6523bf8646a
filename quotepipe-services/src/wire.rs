//! JSON wire contracts between stage services
//!
//! Request and response bodies for the versioned HTTP endpoints every stage
//! exposes. Services deserialize these; typed clients serialize them. Both
//! sides share the definitions so the contract cannot drift.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use quotepipe_core::{
    canonical_symbol, ItemOutcome, PersistResult, PipelineError, PipelineResult, RawQuote,
    Timeframe, TransformedQuote,
};

// --- Market data service ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuoteRequest {
    pub symbol: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkQuoteRequest {
    pub symbols: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkQuoteResponse {
    pub results: Vec<ItemOutcome<RawQuote>>,
}

/// Historical bars request. `start` and `end` are RFC 3339 timestamps and
/// `timeframe` is one of the supported bar widths; both are validated with
/// [`validate_bars_request`] before any provider call.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BarsRequest {
    pub symbol: String,
    pub timeframe: String,
    pub start: String,
    pub end: String,
}

// --- Transformer service ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransformRequest {
    pub raw_quote: RawQuote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkTransformRequest {
    pub raw_quotes: Vec<RawQuote>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkTransformResponse {
    pub results: Vec<ItemOutcome<TransformedQuote>>,
}

// --- Persistence service ---

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessRequest {
    pub quote: TransformedQuote,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkProcessRequest {
    pub quotes: Vec<TransformedQuote>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BulkProcessResponse {
    pub results: Vec<PersistResult>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SymbolsResponse {
    pub symbols: Vec<String>,
}

/// A [`BarsRequest`] that passed validation.
#[derive(Debug, Clone)]
pub struct ValidatedBars {
    pub symbol: String,
    pub timeframe: Timeframe,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

/// Validate a bars request before dispatching to the provider.
///
/// Rejects an empty symbol, an unknown timeframe, non-RFC 3339 timestamps,
/// and an empty or inverted window.
pub fn validate_bars_request(req: &BarsRequest) -> PipelineResult<ValidatedBars> {
    let symbol = canonical_symbol(&req.symbol);
    if symbol.is_empty() {
        return Err(PipelineError::InvalidArgument(
            "symbol is required".to_string(),
        ));
    }

    let timeframe: Timeframe = req.timeframe.parse()?;
    let start = parse_rfc3339("start", &req.start)?;
    let end = parse_rfc3339("end", &req.end)?;
    if start >= end {
        return Err(PipelineError::InvalidArgument(format!(
            "start {} must be before end {}",
            req.start, req.end
        )));
    }

    Ok(ValidatedBars {
        symbol,
        timeframe,
        start,
        end,
    })
}

fn parse_rfc3339(field: &str, value: &str) -> PipelineResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| {
            PipelineError::InvalidArgument(format!(
                "{} must be an RFC 3339 timestamp (got {:?}): {}",
                field, value, e
            ))
        })
}
