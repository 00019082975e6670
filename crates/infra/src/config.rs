//! Environment-driven configuration for the two services.

use std::net::SocketAddr;
use std::time::Duration;

use thiserror::Error;

use crate::gateway::DEFAULT_TIMEOUT;
use crate::inventory_service::DEFAULT_JOURNAL_CAPACITY;

pub const DEFAULT_INVENTORY_ADDR: &str = "0.0.0.0:8081";
pub const DEFAULT_BILLING_ADDR: &str = "0.0.0.0:8082";
pub const DEFAULT_INVENTORY_URL: &str = "http://localhost:8081";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{var}: invalid socket address '{value}'")]
    InvalidAddr { var: &'static str, value: String },

    #[error("{var}: expected a positive number of milliseconds, got '{value}'")]
    InvalidTimeout { var: &'static str, value: String },

    #[error("{var}: expected a positive number of keys, got '{value}'")]
    InvalidCapacity { var: &'static str, value: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InventoryConfig {
    pub addr: SocketAddr,
    /// Idempotency keys remembered before the oldest is forgotten.
    pub journal_capacity: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BillingConfig {
    pub addr: SocketAddr,
    pub inventory_url: String,
    pub inventory_timeout: Duration,
}

impl InventoryConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let journal_capacity = match lookup("INVENTORY_JOURNAL_CAPACITY") {
            None => DEFAULT_JOURNAL_CAPACITY,
            Some(value) => match value.trim().parse::<usize>() {
                Ok(keys) if keys > 0 => keys,
                _ => {
                    return Err(ConfigError::InvalidCapacity {
                        var: "INVENTORY_JOURNAL_CAPACITY",
                        value,
                    });
                }
            },
        };

        Ok(Self {
            addr: addr(&lookup, "INVENTORY_ADDR", DEFAULT_INVENTORY_ADDR)?,
            journal_capacity,
        })
    }
}

impl BillingConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|k| std::env::var(k).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let inventory_timeout = match lookup("INVENTORY_TIMEOUT_MS") {
            None => DEFAULT_TIMEOUT,
            Some(value) => match value.trim().parse::<u64>() {
                Ok(ms) if ms > 0 => Duration::from_millis(ms),
                _ => {
                    return Err(ConfigError::InvalidTimeout {
                        var: "INVENTORY_TIMEOUT_MS",
                        value,
                    });
                }
            },
        };

        Ok(Self {
            addr: addr(&lookup, "BILLING_ADDR", DEFAULT_BILLING_ADDR)?,
            inventory_url: lookup("INVENTORY_SERVICE_URL").unwrap_or_else(|| DEFAULT_INVENTORY_URL.to_string()),
            inventory_timeout,
        })
    }
}

fn addr(
    lookup: &impl Fn(&str) -> Option<String>,
    var: &'static str,
    default: &str,
) -> Result<SocketAddr, ConfigError> {
    let value = lookup(var).unwrap_or_else(|| default.to_string());
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidAddr { var, value })
}
