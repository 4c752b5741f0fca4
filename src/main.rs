use std::env;
use std::path::Path;
use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::{broadcast, mpsc};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

#[cfg(feature = "bench")]
use stateful_order_indexer::bench;
use stateful_order_indexer::bus::{InMemoryBus, MessageBatch};
use stateful_order_indexer::db::{DbPool, MemoryOrderStore, OrderStore, PgOrderStore};
use stateful_order_indexer::handlers::{build_registry, HandlerEngine};
use stateful_order_indexer::types::config::indexer::{IndexerConfig, StorageBackend};
use stateful_order_indexer::types::events::EventBlock;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = IndexerConfig::load(Path::new("config/config.json"))?;

    #[cfg(feature = "bench")]
    {
        bench::init(Path::new("data/bench.csv"))?;
        tracing::info!("Benchmarking enabled, writing to data/bench.csv");
    }

    tracing::info!(
        "Loaded config: storage {:?}, sql functions {}, group concurrency {}",
        config.storage,
        config.handlers.use_sql_function,
        config.engine.group_concurrency
    );

    let store = open_store(&config).await?;
    let registry = Arc::new(build_registry(&config.handlers)?);
    let bus = Arc::new(InMemoryBus::with_capacity(config.bus.channel_capacity));
    spawn_bus_logger(bus.subscribe());

    let engine = HandlerEngine::new(registry, store, bus.clone(), &config.engine, &config.bus);
    engine
        .initialize()
        .await
        .context("Handler initialization failed")?;

    let cancel = CancellationToken::new();
    tokio::spawn(cancel_on_ctrl_c(cancel.clone()));

    let (blocks_tx, blocks_rx) = mpsc::channel(config.engine.block_channel_capacity);
    let reader = tokio::spawn(read_blocks(blocks_tx, cancel.clone()));

    let result = engine.run(blocks_rx, cancel.clone()).await;
    cancel.cancel();
    result.context("Handler engine stopped with an incomplete block")?;

    reader.await.context("Block reader task panicked")??;

    tracing::info!(
        "Shut down after publishing {} messages",
        bus.messages_published()
    );
    Ok(())
}

async fn open_store(config: &IndexerConfig) -> anyhow::Result<Arc<dyn OrderStore>> {
    match config.storage {
        StorageBackend::Memory => {
            tracing::warn!("Using in-memory order store, state will not survive a restart");
            Ok(Arc::new(MemoryOrderStore::new()))
        }
        StorageBackend::Postgres => {
            load_required_env_vars(config)?;
            let database_url = env::var(&config.database_url_env_var)?;

            let pool = DbPool::new(&database_url, config.database_pool_size)
                .await
                .context("Failed to connect to database")?;
            pool.run_migrations(Path::new("migrations"))
                .await
                .context("Failed to run migrations")?;
            tracing::info!("Database ready");

            Ok(Arc::new(PgOrderStore::new(Arc::new(pool))))
        }
    }
}

/// Ensures the database URL env var is set, loading .env if needed.
fn load_required_env_vars(config: &IndexerConfig) -> anyhow::Result<()> {
    let var = config.database_url_env_var.as_str();
    if env::var(var).is_ok() {
        return Ok(());
    }

    dotenvy::dotenv()
        .with_context(|| format!("Missing env var {} and failed to load .env file", var))?;

    anyhow::ensure!(
        env::var(var).is_ok(),
        "Missing required env var after loading .env: {}",
        var
    );
    Ok(())
}

/// Feed decoded blocks, one JSON object per line on stdin, to the engine.
async fn read_blocks(
    blocks_tx: mpsc::Sender<EventBlock>,
    cancel: CancellationToken,
) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut line_number: u64 = 0;

    loop {
        let line = tokio::select! {
            biased;
            _ = cancel.cancelled() => break,
            line = lines.next_line() => line.context("Failed to read from stdin")?,
        };
        let Some(line) = line else {
            tracing::info!("Input closed after {} lines", line_number);
            break;
        };
        line_number += 1;

        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let block: EventBlock = serde_json::from_str(line)
            .with_context(|| format!("Invalid block on input line {}", line_number))?;

        if blocks_tx.send(block).await.is_err() {
            break;
        }
    }

    Ok(())
}

async fn cancel_on_ctrl_c(cancel: CancellationToken) {
    if tokio::signal::ctrl_c().await.is_ok() {
        tracing::info!("Received Ctrl-C, finishing in-flight events");
        cancel.cancel();
    }
}

fn spawn_bus_logger(mut rx: broadcast::Receiver<MessageBatch>) {
    tokio::spawn(async move {
        loop {
            match rx.recv().await {
                Ok(batch) => {
                    for message in batch.iter() {
                        tracing::debug!(
                            "Outbound message key={} ({} bytes)",
                            message.partition_key_hex(),
                            message.payload.len()
                        );
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!("Bus logger lagged, skipped {} batches", skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}
