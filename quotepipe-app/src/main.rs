//! Quote Pipeline Launcher
//!
//! Runs one stage service, the scheduler, or the whole pipeline in a single
//! process, selected by the first argument:
//!
//!   quotepipe market-data | transformer | persistence | scheduler | all
//!
//! Every mode reads its settings from the environment (see
//! `quotepipe_core::config`) and stops cleanly on Ctrl+C.

use anyhow::{anyhow, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};

use quotepipe_core::{Config, RateLimiter};
use quotepipe_services::{
    AlpacaClient, InMemoryStore, MarketDataClient, MarketDataService, PersistenceClient,
    PersistenceService, Scheduler, ServiceRuntime, TransformerClient, TransformerService,
    TwelveDataClient, MARKET_DATA_SERVICE, PERSISTENCE_SERVICE, TRANSFORMER_SERVICE,
};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::from_env();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(config.log_level.clone())
        .init();

    let role = std::env::args().nth(1).unwrap_or_else(|| "all".to_string());
    info!("🚀 Starting quote pipeline ({})", role);

    match role.as_str() {
        "market-data" => run_market_data(&config).await,
        "transformer" => run_transformer(&config).await,
        "persistence" => run_persistence(&config).await,
        "scheduler" => run_scheduler(&config).await,
        "all" => run_all(&config).await,
        other => Err(anyhow!(
            "unknown role {:?}; expected market-data, transformer, persistence, scheduler, or all",
            other
        )),
    }
}

fn runtime(config: &Config, name: &str, addr: &str) -> Result<ServiceRuntime> {
    let port = Config::port_of(addr).with_context(|| format!("invalid address {:?}", addr))?;
    Ok(ServiceRuntime::new(name, port)
        .with_grace(Duration::from_secs(config.shutdown_grace_secs)))
}

fn market_data_service(config: &Config) -> Result<Arc<MarketDataService>> {
    let limiter = Arc::new(RateLimiter::new(config.twelve_data_rate_limit));
    let quotes = TwelveDataClient::new(config, limiter)?;
    let bars = AlpacaClient::new(config)?;
    Ok(Arc::new(MarketDataService::new(quotes, bars)))
}

async fn run_market_data(config: &Config) -> Result<()> {
    let service = market_data_service(config)?;
    runtime(config, MARKET_DATA_SERVICE, &config.market_data_addr)?
        .serve(service.routes())
        .await
}

async fn run_transformer(config: &Config) -> Result<()> {
    runtime(config, TRANSFORMER_SERVICE, &config.transformer_addr)?
        .serve(TransformerService::routes())
        .await
}

async fn run_persistence(config: &Config) -> Result<()> {
    let service = Arc::new(PersistenceService::new(Arc::new(InMemoryStore::new())));
    runtime(config, PERSISTENCE_SERVICE, &config.persistence_addr)?
        .serve(service.routes())
        .await
}

/// Standalone scheduler: reaches every stage, including storage reads, over
/// the remote services.
async fn run_scheduler(config: &Config) -> Result<()> {
    let persistence_url = Config::service_url(&config.persistence_addr);
    let store = Arc::new(quotepipe_services::RemoteQuoteStore::new(&persistence_url)?);
    let scheduler = Scheduler::new(
        config,
        store,
        Arc::new(MarketDataClient::new(&Config::service_url(
            &config.market_data_addr,
        ))?),
        Arc::new(TransformerClient::new(&Config::service_url(
            &config.transformer_addr,
        ))?),
        Arc::new(PersistenceClient::new(&persistence_url)?),
        shutdown_channel(),
    );
    scheduler.run().await;
    Ok(())
}

/// Full pipeline in one process: all three services on their configured
/// ports plus the scheduler, sharing one in-memory store.
async fn run_all(config: &Config) -> Result<()> {
    let store = Arc::new(InMemoryStore::new());
    let shutdown = shutdown_channel();

    let market_data = market_data_service(config)?;
    let persistence = Arc::new(PersistenceService::new(store.clone()));

    let mut tasks = Vec::new();
    tasks.push(tokio::spawn(
        runtime(config, MARKET_DATA_SERVICE, &config.market_data_addr)?
            .with_shutdown(shutdown.clone())
            .serve(market_data.routes()),
    ));
    tasks.push(tokio::spawn(
        runtime(config, TRANSFORMER_SERVICE, &config.transformer_addr)?
            .with_shutdown(shutdown.clone())
            .serve(TransformerService::routes()),
    ));
    tasks.push(tokio::spawn(
        runtime(config, PERSISTENCE_SERVICE, &config.persistence_addr)?
            .with_shutdown(shutdown.clone())
            .serve(persistence.routes()),
    ));

    let scheduler = Scheduler::new(
        config,
        store,
        Arc::new(MarketDataClient::new(&Config::service_url(
            &config.market_data_addr,
        ))?),
        Arc::new(TransformerClient::new(&Config::service_url(
            &config.transformer_addr,
        ))?),
        Arc::new(PersistenceClient::new(&Config::service_url(
            &config.persistence_addr,
        ))?),
        shutdown,
    );
    tasks.push(tokio::spawn(async move {
        scheduler.run().await;
        Ok(())
    }));

    info!("📊 Pipeline is running. Press Ctrl+C to stop.");
    for task in tasks {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("service exited with error: {}", e),
            Err(e) => error!("service task failed: {}", e),
        }
    }
    info!("✅ Quote pipeline shutdown complete");
    Ok(())
}

/// Watch channel flipped to true on Ctrl+C.
fn shutdown_channel() -> watch::Receiver<bool> {
    let (tx, rx) = watch::channel(false);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("failed to listen for shutdown signal: {}", e);
        }
        info!("🛑 Shutdown signal received...");
        let _ = tx.send(true);
    });
    rx
}
