use std::path::Path;

use anyhow::Context;
use serde::Deserialize;

use crate::types::config::engine::{BusConfig, EngineConfig, HandlerConfig};

/// Where order state is persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackend {
    #[default]
    Postgres,
    /// In-process store; state is lost on exit.
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct IndexerConfig {
    /// Environment variable holding the PostgreSQL connection string.
    #[serde(default = "default_database_url_env_var")]
    pub database_url_env_var: String,

    #[serde(default = "default_database_pool_size")]
    pub database_pool_size: usize,

    #[serde(default)]
    pub storage: StorageBackend,

    #[serde(default)]
    pub handlers: HandlerConfig,

    #[serde(default)]
    pub engine: EngineConfig,

    #[serde(default)]
    pub bus: BusConfig,
}

fn default_database_url_env_var() -> String {
    "DATABASE_URL".to_string()
}

fn default_database_pool_size() -> usize {
    16
}

impl IndexerConfig {
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file at {}", path.display()))?;
        Self::from_json(&content)
            .with_context(|| format!("Failed to parse config file at {}", path.display()))
    }

    pub fn from_json(content: &str) -> anyhow::Result<Self> {
        let config: IndexerConfig = serde_json::from_str(content)?;
        anyhow::ensure!(
            config.engine.group_concurrency > 0,
            "engine.group_concurrency must be at least 1"
        );
        anyhow::ensure!(
            config.engine.block_channel_capacity > 0,
            "engine.block_channel_capacity must be at least 1"
        );
        anyhow::ensure!(
            config.bus.channel_capacity > 0,
            "bus.channel_capacity must be at least 1"
        );
        anyhow::ensure!(
            config.database_pool_size > 0,
            "database_pool_size must be at least 1"
        );
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_from_empty_object() {
        let config = IndexerConfig::from_json("{}").unwrap();
        assert_eq!(config.database_url_env_var, "DATABASE_URL");
        assert_eq!(config.storage, StorageBackend::Postgres);
        assert!(config.handlers.use_sql_function);
        assert_eq!(config.engine.group_concurrency, 16);
        assert_eq!(config.engine.retry.max_retries, 3);
    }

    #[test]
    fn test_overrides() {
        let config = IndexerConfig::from_json(
            r#"{
                "storage": "memory",
                "handlers": { "use_sql_function": false },
                "engine": { "group_concurrency": 4, "retry": { "max_retries": 1 } },
                "bus": { "channel_capacity": 8 }
            }"#,
        )
        .unwrap();
        assert_eq!(config.storage, StorageBackend::Memory);
        assert!(!config.handlers.use_sql_function);
        assert_eq!(config.engine.group_concurrency, 4);
        assert_eq!(config.engine.retry.max_retries, 1);
        assert_eq!(config.engine.retry.initial_delay_ms, 100);
        assert_eq!(config.bus.channel_capacity, 8);
    }

    #[test]
    fn test_zero_concurrency_rejected() {
        let result = IndexerConfig::from_json(r#"{ "engine": { "group_concurrency": 0 } }"#);
        assert!(result.is_err());
    }

    #[test]
    fn test_zero_capacities_rejected() {
        for json in [
            r#"{ "engine": { "block_channel_capacity": 0 } }"#,
            r#"{ "bus": { "channel_capacity": 0 } }"#,
            r#"{ "database_pool_size": 0 }"#,
        ] {
            let err = IndexerConfig::from_json(json).unwrap_err();
            assert!(err.to_string().contains("must be at least 1"), "{}", err);
        }
    }
}
