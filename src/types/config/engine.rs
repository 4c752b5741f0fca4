//! Configuration for handlers, the block engine and the outbound bus.

use std::time::Duration;

use serde::Deserialize;

use crate::retry::RetryConfig;

/// Handler configuration, resolved once at startup.
#[derive(Debug, Clone, Deserialize)]
pub struct HandlerConfig {
    /// Run each handler's mutation through its storage-side SQL function
    /// instead of discrete client queries.
    #[serde(default = "default_use_sql_function")]
    pub use_sql_function: bool,
}

/// Execution runner configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct EngineConfig {
    /// Maximum number of execution groups running at once.
    #[serde(default = "default_group_concurrency")]
    pub group_concurrency: usize,

    /// Capacity of the channel feeding decoded blocks to the engine.
    #[serde(default = "default_block_channel_capacity")]
    pub block_channel_capacity: usize,

    /// Retry policy for transient storage failures.
    #[serde(default)]
    pub retry: RetrySettings,
}

/// Outbound bus configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct BusConfig {
    #[serde(default = "default_bus_channel_capacity")]
    pub channel_capacity: usize,

    /// Retry policy for publishing a consolidated batch.
    #[serde(default)]
    pub publish_retry: RetrySettings,
}

/// Serialized form of a retry policy.
#[derive(Debug, Clone, Deserialize)]
pub struct RetrySettings {
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_initial_delay_ms")]
    pub initial_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_backoff_multiplier")]
    pub backoff_multiplier: f64,
}

impl RetrySettings {
    pub fn to_retry_config(&self) -> RetryConfig {
        RetryConfig::new(self.max_retries)
            .with_initial_delay(Duration::from_millis(self.initial_delay_ms))
            .with_max_delay(Duration::from_millis(self.max_delay_ms))
            .with_backoff_multiplier(self.backoff_multiplier)
    }
}

fn default_use_sql_function() -> bool {
    true
}

fn default_group_concurrency() -> usize {
    16
}

fn default_block_channel_capacity() -> usize {
    64
}

fn default_bus_channel_capacity() -> usize {
    1024
}

fn default_max_retries() -> u32 {
    3
}

fn default_initial_delay_ms() -> u64 {
    100
}

fn default_max_delay_ms() -> u64 {
    5_000
}

fn default_backoff_multiplier() -> f64 {
    2.0
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            use_sql_function: default_use_sql_function(),
        }
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            group_concurrency: default_group_concurrency(),
            block_channel_capacity: default_block_channel_capacity(),
            retry: RetrySettings::default(),
        }
    }
}

impl Default for BusConfig {
    fn default() -> Self {
        Self {
            channel_capacity: default_bus_channel_capacity(),
            publish_retry: RetrySettings::default(),
        }
    }
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_retries: default_max_retries(),
            initial_delay_ms: default_initial_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            backoff_multiplier: default_backoff_multiplier(),
        }
    }
}
