//! Service runtime scaffolding
//!
//! Hosts a stage service's route tree behind the shared per-service surface:
//! health checking, service-listing reflection, per-request timing logs, and
//! a graceful shutdown that drains in-flight calls for a bounded grace.

use anyhow::Result;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, watch};
use tracing::{error, info, warn};
use warp::filters::BoxedFilter;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use quotepipe_core::{ErrorBody, ErrorCode, PipelineError};

pub const MARKET_DATA_SERVICE: &str = "quotepipe.MarketDataService";
pub const TRANSFORMER_SERVICE: &str = "quotepipe.TransformerService";
pub const PERSISTENCE_SERVICE: &str = "quotepipe.PersistenceService";
const HEALTH_SERVICE: &str = "quotepipe.Health";
const REFLECTION_SERVICE: &str = "quotepipe.Reflection";

/// Health state reported for a registered service name.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ServingStatus {
    Serving,
    NotServing,
    Unknown,
}

/// Registry behind the health endpoint. A name that was never set reports
/// `Unknown`; the hosting runtime flips its own name to `Serving` only once
/// the full route tree is assembled.
pub struct HealthRegistry {
    statuses: RwLock<HashMap<String, ServingStatus>>,
}

impl HealthRegistry {
    pub fn new() -> Self {
        Self {
            statuses: RwLock::new(HashMap::new()),
        }
    }

    pub fn set(&self, service: &str, status: ServingStatus) {
        self.statuses.write().insert(service.to_string(), status);
    }

    pub fn check(&self, service: &str) -> ServingStatus {
        self.statuses
            .read()
            .get(service)
            .copied()
            .unwrap_or(ServingStatus::Unknown)
    }
}

impl Default for HealthRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Hosts one stage service: binds the port, wires health and reflection
/// routes around the service's own API, and runs until shutdown.
pub struct ServiceRuntime {
    name: String,
    port: u16,
    grace: Duration,
    health: Arc<HealthRegistry>,
    shutdown: Option<watch::Receiver<bool>>,
}

impl ServiceRuntime {
    pub fn new(name: &str, port: u16) -> Self {
        Self {
            name: name.to_string(),
            port,
            grace: Duration::from_secs(5),
            health: Arc::new(HealthRegistry::new()),
            shutdown: None,
        }
    }

    /// Bound on how long in-flight calls may drain after the shutdown
    /// signal before the listener is aborted.
    pub fn with_grace(mut self, grace: Duration) -> Self {
        self.grace = grace;
        self
    }

    /// External shutdown trigger. Without one the runtime stops on SIGINT.
    pub fn with_shutdown(mut self, shutdown: watch::Receiver<bool>) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn health(&self) -> Arc<HealthRegistry> {
        self.health.clone()
    }

    /// Serve `api` plus the shared health/reflection surface until shutdown.
    pub async fn serve(self, api: BoxedFilter<(warp::reply::Response,)>) -> Result<()> {
        let Self {
            name,
            port,
            grace,
            health,
            shutdown,
        } = self;
        info!("{} starting on port {}", name, port);

        let services = vec![
            name.clone(),
            HEALTH_SERVICE.to_string(),
            REFLECTION_SERVICE.to_string(),
        ];
        let routes = api
            .or(health_routes(name.clone(), health.clone()))
            .or(reflection_route(services))
            .recover(handle_rejection)
            .with(warp::log::custom(|info: warp::log::Info| {
                info!(
                    "{} {} -> {} in {:.1}ms",
                    info.method(),
                    info.path(),
                    info.status().as_u16(),
                    info.elapsed().as_secs_f64() * 1000.0
                );
            }));

        // Every handler is registered; the service may now report healthy.
        health.set(&name, ServingStatus::Serving);

        let addr: SocketAddr = ([0, 0, 0, 0], port).into();
        let (drain_tx, drain_rx) = oneshot::channel::<()>();
        let (bound, server) = warp::serve(routes).try_bind_with_graceful_shutdown(addr, async {
            drain_rx.await.ok();
        })?;
        info!("{} listening on {}", name, bound);

        let mut server_task = tokio::spawn(server);
        wait_for_shutdown(shutdown).await;

        info!("{} shutting down, draining for up to {:?}", name, grace);
        health.set(&name, ServingStatus::NotServing);
        let _ = drain_tx.send(());
        if tokio::time::timeout(grace, &mut server_task).await.is_err() {
            warn!("{} drain grace expired, aborting in-flight calls", name);
            server_task.abort();
        }
        info!("{} stopped", name);
        Ok(())
    }
}

async fn wait_for_shutdown(shutdown: Option<watch::Receiver<bool>>) {
    match shutdown {
        Some(mut rx) => {
            // A closed channel counts as a shutdown request.
            let _ = rx.changed().await;
        }
        None => {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("failed to listen for shutdown signal: {}", e);
            }
        }
    }
}

/// GET /health/{service}: status of one registered name.
/// GET /health: status of the hosting service itself.
fn health_routes(
    own_name: String,
    registry: Arc<HealthRegistry>,
) -> BoxedFilter<(warp::reply::Response,)> {
    let by_name = warp::path!("health" / String)
        .and(warp::get())
        .and(with_state(registry.clone()))
        .map(|service: String, registry: Arc<HealthRegistry>| {
            let status = registry.check(&service);
            warp::reply::json(&json!({ "service": service, "status": status })).into_response()
        });

    let own = warp::path!("health")
        .and(warp::get())
        .and(with_state(registry))
        .map(move |registry: Arc<HealthRegistry>| {
            let status = registry.check(&own_name);
            warp::reply::json(&json!({ "service": own_name, "status": status })).into_response()
        });

    by_name.or(own).unify().boxed()
}

/// GET /reflection: names of the services this listener hosts.
fn reflection_route(services: Vec<String>) -> BoxedFilter<(warp::reply::Response,)> {
    warp::path!("reflection")
        .and(warp::get())
        .map(move || warp::reply::json(&json!({ "services": services })).into_response())
        .boxed()
}

/// Helper to inject shared state into a handler.
pub fn with_state<T: Clone + Send>(
    state: T,
) -> impl Filter<Extract = (T,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// A successful JSON reply.
pub fn json_reply<T: Serialize>(value: &T) -> warp::reply::Response {
    warp::reply::json(value).into_response()
}

/// A pipeline error as its wire form: [`ErrorBody`] JSON with the matching
/// RPC status.
pub fn error_reply(err: &PipelineError) -> warp::reply::Response {
    let status = StatusCode::from_u16(err.rpc_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    warp::reply::with_status(warp::reply::json(&ErrorBody::from(err)), status).into_response()
}

/// Map framework rejections onto the shared error taxonomy so callers only
/// ever see [`ErrorBody`] payloads.
async fn handle_rejection(err: Rejection) -> Result<warp::reply::Response, Infallible> {
    let (status, body) = if err.is_not_found() || err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (
            StatusCode::NOT_FOUND,
            ErrorBody {
                code: ErrorCode::NotFound,
                message: "endpoint not found".to_string(),
            },
        )
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (
            StatusCode::BAD_REQUEST,
            ErrorBody {
                code: ErrorCode::InvalidArgument,
                message: e.to_string(),
            },
        )
    } else {
        error!("unhandled rejection: {:?}", err);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            ErrorBody {
                code: ErrorCode::Unknown,
                message: "internal server error".to_string(),
            },
        )
    };

    Ok(warp::reply::with_status(warp::reply::json(&body), status).into_response())
}
