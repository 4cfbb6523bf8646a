//! Bulk fan-out
//!
//! Runs a one-item operation across a batch and collects results in input
//! order. A failing item becomes a failed entry in the result list; it never
//! takes the rest of the batch down with it.

use futures_util::future::join_all;
use serde::{Deserialize, Serialize};
use std::future::Future;

use crate::errors::{ErrorBody, PipelineError, PipelineResult};

/// Apply `op` to every item, concurrently, preserving input order.
///
/// The output always has the same length as the input. Items that share a
/// rate-limited upstream serialize inside that client's limiter; everything
/// else overlaps freely.
pub async fn fan_out<T, U, F, Fut>(items: Vec<T>, op: F) -> Vec<PipelineResult<U>>
where
    F: Fn(T) -> Fut,
    Fut: Future<Output = PipelineResult<U>>,
{
    join_all(items.into_iter().map(op)).await
}

/// Wire form of one entry in a bulk response.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ItemOutcome<T> {
    Ok { value: T },
    Err { error: ErrorBody },
}

impl<T> ItemOutcome<T> {
    pub fn is_ok(&self) -> bool {
        matches!(self, Self::Ok { .. })
    }

    pub fn into_result(self) -> PipelineResult<T> {
        match self {
            Self::Ok { value } => Ok(value),
            Self::Err { error } => Err(error.into()),
        }
    }
}

impl<T> From<PipelineResult<T>> for ItemOutcome<T> {
    fn from(result: PipelineResult<T>) -> Self {
        match result {
            Ok(value) => Self::Ok { value },
            Err(ref err) => Self::Err {
                error: ErrorBody::from(err),
            },
        }
    }
}

/// Convert a fan-out result list into its wire form.
pub fn into_outcomes<T>(results: Vec<PipelineResult<T>>) -> Vec<ItemOutcome<T>> {
    results.into_iter().map(ItemOutcome::from).collect()
}
