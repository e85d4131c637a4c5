//! In-memory store configuration.

use std::env;
use std::time::Duration;

/// In-memory store configuration.
#[derive(Debug, Clone)]
pub struct MemoryStoreConfig {
    /// Largest accepted `TransactWriteItems` batch.
    pub max_transaction_items: usize,
    /// How long a client request token is remembered.
    pub idempotency_window: Duration,
}

impl MemoryStoreConfig {
    /// Create configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_transaction_items: env_parse(
                "MEMORY_MAX_TRANSACTION_ITEMS",
                defaults.max_transaction_items,
            ),
            idempotency_window: Duration::from_secs(env_parse(
                "MEMORY_IDEMPOTENCY_WINDOW_SECS",
                defaults.idempotency_window.as_secs(),
            )),
        }
    }
}

impl Default for MemoryStoreConfig {
    fn default() -> Self {
        Self {
            max_transaction_items: 100,
            idempotency_window: Duration::from_secs(600),
        }
    }
}

fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}
