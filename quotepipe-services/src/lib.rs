//! Quote Pipeline Services
//!
//! The remote layer of the pipeline: the three stage services (market data,
//! transformer, persistence), the runtime that hosts them, typed clients
//! for calling them, and the orchestrator and scheduler built on top.

pub mod clients;
pub mod market_data;
pub mod orchestrator;
pub mod persistence;
pub mod providers;
pub mod runtime;
pub mod scheduler;
pub mod storage;
pub mod transformer;
pub mod wire;

// Re-export main types for easy access
pub use clients::{
    MarketDataApi, MarketDataClient, PersistenceApi, PersistenceClient, RemoteQuoteStore,
    TransformerApi, TransformerClient,
};
pub use market_data::MarketDataService;
pub use orchestrator::{PipelineOrchestrator, StageTimeouts};
pub use persistence::PersistenceService;
pub use providers::{AlpacaClient, TwelveDataClient};
pub use runtime::{
    HealthRegistry, ServiceRuntime, ServingStatus, MARKET_DATA_SERVICE, PERSISTENCE_SERVICE,
    TRANSFORMER_SERVICE,
};
pub use scheduler::Scheduler;
pub use storage::{InMemoryStore, QuoteStore};
pub use transformer::TransformerService;
