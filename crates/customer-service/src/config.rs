//! Environment-driven service configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::time::Duration;

use thiserror::Error;

pub const DEFAULT_SERVICE_NAME: &str = "customer-service";
pub const DEFAULT_TOPIC: &str = "customer";
pub const DEFAULT_HTTP_ADDR: SocketAddr = SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 8080);
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_REDIS_URL: &str = "redis://localhost:6379";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value for {key}: '{value}' ({reason})")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },

    #[error("{0} requires the '{1}' feature")]
    FeatureDisabled(&'static str, &'static str),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceConfig {
    /// Name the request receivers bind under.
    pub service_name: String,
    pub topic: String,
    pub http_addr: SocketAddr,
    /// How long a queue client waits for a reply.
    pub request_timeout: Duration,
    /// Use the Redis Streams event store instead of the in-memory one.
    pub use_persistent_stores: bool,
    pub redis_url: String,
}

impl ServiceConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary key lookup. Unset and blank keys take their defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let http_addr = match get("HTTP_ADDR") {
            Some(raw) => raw.trim().parse().map_err(|e: std::net::AddrParseError| {
                ConfigError::InvalidValue {
                    key: "HTTP_ADDR",
                    value: raw.clone(),
                    reason: e.to_string(),
                }
            })?,
            None => DEFAULT_HTTP_ADDR,
        };

        let request_timeout_ms = match get("REQUEST_TIMEOUT_MS") {
            Some(raw) => match raw.trim().parse::<u64>() {
                Ok(0) => {
                    return Err(ConfigError::InvalidValue {
                        key: "REQUEST_TIMEOUT_MS",
                        value: raw,
                        reason: "must be greater than zero".to_string(),
                    });
                }
                Ok(ms) => ms,
                Err(e) => {
                    return Err(ConfigError::InvalidValue {
                        key: "REQUEST_TIMEOUT_MS",
                        value: raw,
                        reason: e.to_string(),
                    });
                }
            },
            None => DEFAULT_REQUEST_TIMEOUT_MS,
        };

        let use_persistent_stores = match get("USE_PERSISTENT_STORES") {
            Some(raw) => parse_flag(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "USE_PERSISTENT_STORES",
                value: raw.clone(),
                reason: "expected true/false".to_string(),
            })?,
            None => false,
        };

        Ok(Self {
            service_name: get("SERVICE_NAME").unwrap_or_else(|| DEFAULT_SERVICE_NAME.to_string()),
            topic: get("CUSTOMER_TOPIC").unwrap_or_else(|| DEFAULT_TOPIC.to_string()),
            http_addr,
            request_timeout: Duration::from_millis(request_timeout_ms),
            use_persistent_stores,
            redis_url: get("REDIS_URL").unwrap_or_else(|| DEFAULT_REDIS_URL.to_string()),
        })
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            topic: DEFAULT_TOPIC.to_string(),
            http_addr: DEFAULT_HTTP_ADDR,
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            use_persistent_stores: false,
            redis_url: DEFAULT_REDIS_URL.to_string(),
        }
    }
}

fn parse_flag(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
