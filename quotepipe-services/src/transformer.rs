//! Transformer service
//!
//! Enrichment stage. Stateless: each request runs the indicator suite over
//! the raw quote and returns the enriched form.

use std::convert::Infallible;
use warp::filters::BoxedFilter;
use warp::{Filter, Reply};

use quotepipe_core::{fan_out, indicators, into_outcomes, PipelineError};

use crate::runtime::{error_reply, json_reply};
use crate::wire::{BulkTransformRequest, BulkTransformResponse, TransformRequest};

pub struct TransformerService;

impl TransformerService {
    /// Route tree: POST /v1/transform, POST /v1/transform/bulk.
    pub fn routes() -> BoxedFilter<(warp::reply::Response,)> {
        let transform = warp::path!("v1" / "transform")
            .and(warp::post())
            .and(warp::body::json())
            .and_then(handle_transform);

        let bulk = warp::path!("v1" / "transform" / "bulk")
            .and(warp::post())
            .and(warp::body::json())
            .and_then(handle_bulk_transform);

        transform.or(bulk).unify().boxed()
    }
}

async fn handle_transform(req: TransformRequest) -> Result<warp::reply::Response, Infallible> {
    if req.raw_quote.symbol.is_empty() {
        return Ok(error_reply(&PipelineError::InvalidArgument(
            "raw quote has no symbol".to_string(),
        )));
    }
    Ok(json_reply(&indicators::enrich(&req.raw_quote)))
}

async fn handle_bulk_transform(
    req: BulkTransformRequest,
) -> Result<warp::reply::Response, Infallible> {
    let results = fan_out(req.raw_quotes, |raw| async move {
        if raw.symbol.is_empty() {
            return Err(PipelineError::InvalidArgument(
                "raw quote has no symbol".to_string(),
            ));
        }
        Ok(indicators::enrich(&raw))
    })
    .await;

    Ok(json_reply(&BulkTransformResponse {
        results: into_outcomes(results),
    }))
}
