//! Application configuration loaded from environment variables.

use std::time::Duration;

use saga::{LockScope, SagaConfig};
use thiserror::Error;

/// Output format for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl LogFormat {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "pretty" | "text" => Some(LogFormat::Pretty),
            "json" => Some(LogFormat::Json),
            _ => None,
        }
    }
}

/// Base URLs of the three remote services.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteServiceUrls {
    pub product: String,
    pub wallet: String,
    pub order: String,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Some but not all remote service URLs were set.
    #[error("{missing} must be set when any remote service URL is configured")]
    IncompleteRemoteServices { missing: &'static str },
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST` — bind address (default: `"0.0.0.0"`)
/// - `PORT` — listen port (default: `3000`)
/// - `RUST_LOG` — tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT` — `pretty` or `json` (default: `pretty`)
/// - `REQUEST_TIMEOUT_MS` — deadline for each inbound request (default: `5000`)
/// - `COMPENSATION_TIMEOUT_MS` — deadline for the compensating credit (default: `10000`)
/// - `IDEMPOTENCY_TTL_SECS` — how long finished outcomes are remembered (default: `86400`)
/// - `SAGA_LOCK_SCOPE` — `through_registration` or `debit_only` (default: `through_registration`)
/// - `PRODUCT_SERVICE_URL`, `WALLET_SERVICE_URL`, `ORDER_SERVICE_URL` — remote
///   services; when none is set the server uses in-memory services
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub request_timeout: Duration,
    pub compensation_timeout: Duration,
    pub idempotency_ttl: Duration,
    pub lock_scope: LockScope,
    pub product_service_url: Option<String>,
    pub wallet_service_url: Option<String>,
    pub order_service_url: Option<String>,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration through `lookup`. Unparsable values fall back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();
        let millis = |key: &str, default: Duration| {
            lookup(key)
                .and_then(|v| v.parse().ok())
                .map(Duration::from_millis)
                .unwrap_or(default)
        };
        let url = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: lookup("PORT")
                .and_then(|p| p.parse().ok())
                .unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: lookup("LOG_FORMAT")
                .and_then(|v| LogFormat::parse(&v))
                .unwrap_or(defaults.log_format),
            request_timeout: millis("REQUEST_TIMEOUT_MS", defaults.request_timeout),
            compensation_timeout: millis("COMPENSATION_TIMEOUT_MS", defaults.compensation_timeout),
            idempotency_ttl: lookup("IDEMPOTENCY_TTL_SECS")
                .and_then(|v| v.parse().ok())
                .map(Duration::from_secs)
                .unwrap_or(defaults.idempotency_ttl),
            lock_scope: lookup("SAGA_LOCK_SCOPE")
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.lock_scope),
            product_service_url: url("PRODUCT_SERVICE_URL"),
            wallet_service_url: url("WALLET_SERVICE_URL"),
            order_service_url: url("ORDER_SERVICE_URL"),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    /// Returns the saga settings carried by this configuration.
    pub fn saga_config(&self) -> SagaConfig {
        SagaConfig {
            compensation_timeout: self.compensation_timeout,
            lock_scope: self.lock_scope,
            idempotency_ttl: self.idempotency_ttl,
        }
    }

    /// Returns the remote service URLs, or `None` to run on in-memory services.
    pub fn remote_services(&self) -> Result<Option<RemoteServiceUrls>, ConfigError> {
        match (
            &self.product_service_url,
            &self.wallet_service_url,
            &self.order_service_url,
        ) {
            (None, None, None) => Ok(None),
            (Some(product), Some(wallet), Some(order)) => Ok(Some(RemoteServiceUrls {
                product: product.clone(),
                wallet: wallet.clone(),
                order: order.clone(),
            })),
            (None, _, _) => Err(ConfigError::IncompleteRemoteServices {
                missing: "PRODUCT_SERVICE_URL",
            }),
            (_, None, _) => Err(ConfigError::IncompleteRemoteServices {
                missing: "WALLET_SERVICE_URL",
            }),
            (_, _, None) => Err(ConfigError::IncompleteRemoteServices {
                missing: "ORDER_SERVICE_URL",
            }),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        let saga = SagaConfig::default();
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Pretty,
            request_timeout: Duration::from_millis(5000),
            compensation_timeout: saga.compensation_timeout,
            idempotency_ttl: saga.idempotency_ttl,
            lock_scope: saga.lock_scope,
            product_service_url: None,
            wallet_service_url: None,
            order_service_url: None,
        }
    }
}
