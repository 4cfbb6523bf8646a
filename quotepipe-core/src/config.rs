//! Process configuration
//!
//! Every field maps to an uppercased environment variable (e.g.
//! `quote_staleness_seconds` -> `QUOTE_STALENESS_SECONDS`); unset or
//! unparseable variables fall back to the field default. Loaded once at
//! process start and passed into constructors.

use std::env;
use std::str::FromStr;

/// Immutable process settings shared by all services.
#[derive(Clone, Debug)]
pub struct Config {
    // Service addresses (host:port)
    pub market_data_addr: String,
    pub transformer_addr: String,
    pub persistence_addr: String,

    // Quote provider (TwelveData-compatible REST API)
    pub twelve_data_base_url: String,
    pub twelve_data_api_key: String,
    /// Calls per minute allowed against the quote provider.
    pub twelve_data_rate_limit: u32,

    // Historical bars provider (Alpaca-compatible data API)
    pub alpaca_base_url: String,
    pub alpaca_key_id: String,
    pub alpaca_secret_key: String,

    // Caching
    pub quote_staleness_seconds: u64,

    // Per-stage timeouts for single-symbol pipeline runs (seconds)
    pub fetch_timeout_secs: u64,
    pub transform_timeout_secs: u64,
    pub persist_timeout_secs: u64,

    // Coarse per-call timeouts for scheduler bulk runs (seconds)
    pub bulk_fetch_timeout_secs: u64,
    pub bulk_transform_timeout_secs: u64,
    pub bulk_persist_timeout_secs: u64,

    // Scheduler pacing (seconds)
    pub scheduler_startup_delay_secs: u64,
    pub market_open_interval_secs: u64,
    pub market_closed_interval_secs: u64,

    // Runtime
    pub shutdown_grace_secs: u64,
    pub log_level: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            market_data_addr: "127.0.0.1:50051".to_string(),
            transformer_addr: "127.0.0.1:50052".to_string(),
            persistence_addr: "127.0.0.1:50053".to_string(),
            twelve_data_base_url: "https://api.twelvedata.com".to_string(),
            twelve_data_api_key: String::new(),
            twelve_data_rate_limit: 8,
            alpaca_base_url: "https://data.alpaca.markets".to_string(),
            alpaca_key_id: String::new(),
            alpaca_secret_key: String::new(),
            quote_staleness_seconds: 60,
            fetch_timeout_secs: 10,
            transform_timeout_secs: 5,
            persist_timeout_secs: 5,
            bulk_fetch_timeout_secs: 30,
            bulk_transform_timeout_secs: 10,
            bulk_persist_timeout_secs: 10,
            scheduler_startup_delay_secs: 5,
            market_open_interval_secs: 60,
            market_closed_interval_secs: 300,
            shutdown_grace_secs: 5,
            log_level: "info".to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment variables over the defaults.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            market_data_addr: env_or("MARKET_DATA_ADDR", d.market_data_addr),
            transformer_addr: env_or("TRANSFORMER_ADDR", d.transformer_addr),
            persistence_addr: env_or("PERSISTENCE_ADDR", d.persistence_addr),
            twelve_data_base_url: env_or("TWELVE_DATA_BASE_URL", d.twelve_data_base_url),
            twelve_data_api_key: env_or("TWELVE_DATA_API_KEY", d.twelve_data_api_key),
            twelve_data_rate_limit: env_or("TWELVE_DATA_RATE_LIMIT", d.twelve_data_rate_limit),
            alpaca_base_url: env_or("ALPACA_BASE_URL", d.alpaca_base_url),
            alpaca_key_id: env_or("ALPACA_KEY_ID", d.alpaca_key_id),
            alpaca_secret_key: env_or("ALPACA_SECRET_KEY", d.alpaca_secret_key),
            quote_staleness_seconds: env_or("QUOTE_STALENESS_SECONDS", d.quote_staleness_seconds),
            fetch_timeout_secs: env_or("FETCH_TIMEOUT_SECS", d.fetch_timeout_secs),
            transform_timeout_secs: env_or("TRANSFORM_TIMEOUT_SECS", d.transform_timeout_secs),
            persist_timeout_secs: env_or("PERSIST_TIMEOUT_SECS", d.persist_timeout_secs),
            bulk_fetch_timeout_secs: env_or("BULK_FETCH_TIMEOUT_SECS", d.bulk_fetch_timeout_secs),
            bulk_transform_timeout_secs: env_or(
                "BULK_TRANSFORM_TIMEOUT_SECS",
                d.bulk_transform_timeout_secs,
            ),
            bulk_persist_timeout_secs: env_or(
                "BULK_PERSIST_TIMEOUT_SECS",
                d.bulk_persist_timeout_secs,
            ),
            scheduler_startup_delay_secs: env_or(
                "SCHEDULER_STARTUP_DELAY_SECS",
                d.scheduler_startup_delay_secs,
            ),
            market_open_interval_secs: env_or(
                "MARKET_OPEN_INTERVAL_SECS",
                d.market_open_interval_secs,
            ),
            market_closed_interval_secs: env_or(
                "MARKET_CLOSED_INTERVAL_SECS",
                d.market_closed_interval_secs,
            ),
            shutdown_grace_secs: env_or("SHUTDOWN_GRACE_SECS", d.shutdown_grace_secs),
            log_level: env_or("LOG_LEVEL", d.log_level),
        }
    }

    /// Port component of a `host:port` address string.
    pub fn port_of(addr: &str) -> Option<u16> {
        addr.rsplit(':').next()?.parse().ok()
    }

    /// Base URL for calling a service at `host:port`.
    pub fn service_url(addr: &str) -> String {
        format!("http://{}", addr)
    }
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    match env::var(key) {
        Ok(val) => val.parse().unwrap_or(default),
        Err(_) => default,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = Config::default();
        assert_eq!(config.twelve_data_rate_limit, 8);
        assert_eq!(config.quote_staleness_seconds, 60);
        assert_eq!(config.market_open_interval_secs, 60);
        assert_eq!(config.market_closed_interval_secs, 300);
        assert_eq!(config.shutdown_grace_secs, 5);
    }

    #[test]
    fn test_port_of() {
        assert_eq!(Config::port_of("127.0.0.1:50051"), Some(50051));
        assert_eq!(Config::port_of("localhost:9"), Some(9));
        assert_eq!(Config::port_of("nonsense"), None);
    }

    #[test]
    fn test_service_url() {
        assert_eq!(
            Config::service_url("127.0.0.1:50052"),
            "http://127.0.0.1:50052"
        );
    }
}
