//! Handler engine that orchestrates per-block execution.
//!
//! For each block the engine resolves every event's handler, groups events by
//! shared entity keys, runs the groups concurrently (events inside a group run
//! one after another), consolidates the messages of the groups that completed
//! and publishes them as one batch.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::mpsc::Receiver;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use super::consolidator::{GroupFailure, GroupOutcome, GroupResult, MessageConsolidator};
use super::context::HandlerContext;
use super::error::EngineError;
use super::registry::HandlerRegistry;
use super::scheduler::{ExecutionGroup, ParallelizationScheduler};
use super::traits::EventHandler;
use crate::bus::MessagePublisher;
use crate::db::OrderStore;
use crate::retry::{with_retry, RetryConfig};
use crate::types::config::engine::{BusConfig, EngineConfig};
use crate::types::events::{BlockEvent, EventBlock};

type ScheduledEvent = (Arc<dyn EventHandler>, BlockEvent);

/// Result of processing one block.
#[derive(Debug)]
pub struct BlockOutcome {
    pub height: u64,
    pub event_count: usize,
    pub group_count: usize,
    pub published_messages: usize,
    /// Groups whose messages were withheld.
    pub failed_groups: Vec<GroupFailure>,
}

impl BlockOutcome {
    pub fn is_complete(&self) -> bool {
        self.failed_groups.is_empty()
    }
}

/// Shared, read-only state every group task needs.
#[derive(Clone)]
struct GroupRunner {
    store: Arc<dyn OrderStore>,
    retry: RetryConfig,
    cancel: CancellationToken,
    height: u64,
}

pub struct HandlerEngine {
    registry: Arc<HandlerRegistry>,
    store: Arc<dyn OrderStore>,
    publisher: Arc<dyn MessagePublisher>,
    group_concurrency: usize,
    retry: RetryConfig,
    publish_retry: RetryConfig,
}

impl HandlerEngine {
    pub fn new(
        registry: Arc<HandlerRegistry>,
        store: Arc<dyn OrderStore>,
        publisher: Arc<dyn MessagePublisher>,
        engine_config: &EngineConfig,
        bus_config: &BusConfig,
    ) -> Self {
        Self {
            registry,
            store,
            publisher,
            group_concurrency: engine_config.group_concurrency.max(1),
            retry: engine_config.retry.to_retry_config(),
            publish_retry: bus_config.publish_retry.to_retry_config(),
        }
    }

    /// Validate the registry and initialize every handler.
    pub async fn initialize(&self) -> Result<(), EngineError> {
        self.registry.validate()?;

        for handler in self.registry.all_handlers() {
            tracing::debug!(
                "Initializing handler: {} ({})",
                handler.name(),
                handler.strategy()
            );
            handler
                .initialize(self.store.as_ref())
                .await
                .map_err(EngineError::Initialization)?;
        }
        Ok(())
    }

    /// Process blocks in arrival order until the channel closes or `cancel` fires.
    ///
    /// Returns an error when a block could not be completed as a whole (publish
    /// failure, scheduling error); the caller is expected to redeliver it.
    pub async fn run(
        &self,
        mut blocks_rx: Receiver<EventBlock>,
        cancel: CancellationToken,
    ) -> Result<(), EngineError> {
        tracing::info!(
            "Handler engine started with {} handlers, group concurrency {}",
            self.registry.handler_count(),
            self.group_concurrency
        );

        let mut blocks_processed: u64 = 0;

        loop {
            let block = tokio::select! {
                biased;

                _ = cancel.cancelled() => {
                    tracing::info!("Cancellation requested, handler engine stopping");
                    break;
                }

                block = blocks_rx.recv() => match block {
                    Some(block) => block,
                    None => {
                        tracing::info!("Block channel closed, handler engine shutting down");
                        break;
                    }
                },
            };

            match self.process_block(block, &cancel).await {
                Ok(outcome) => {
                    blocks_processed += 1;
                    if outcome.is_complete() {
                        tracing::info!(
                            "Block {}: {} events in {} groups, published {} messages",
                            outcome.height,
                            outcome.event_count,
                            outcome.group_count,
                            outcome.published_messages
                        );
                    } else {
                        tracing::warn!(
                            "Block {}: {} of {} groups failed, published {} messages",
                            outcome.height,
                            outcome.failed_groups.len(),
                            outcome.group_count,
                            outcome.published_messages
                        );
                    }
                }
                Err(EngineError::Cancelled { height }) => {
                    tracing::warn!(
                        "Block {} was cancelled before publishing and must be redelivered",
                        height
                    );
                    break;
                }
                Err(e) => return Err(e),
            }
        }

        tracing::info!("Handler engine processed {} blocks", blocks_processed);
        Ok(())
    }

    /// Handle every event of `block` and publish the consolidated batch.
    pub async fn process_block(
        &self,
        block: EventBlock,
        cancel: &CancellationToken,
    ) -> Result<BlockOutcome, EngineError> {
        let height = block.height;
        let event_count = block.events.len();

        let groups = self.schedule(block)?;
        let group_count = groups.len();

        tracing::debug!(
            "Block {}: scheduled {} events into {} groups",
            height,
            event_count,
            group_count
        );

        let runner = GroupRunner {
            store: self.store.clone(),
            retry: self.retry.clone(),
            cancel: cancel.clone(),
            height,
        };
        let semaphore = Arc::new(Semaphore::new(self.group_concurrency));
        let mut join_set = JoinSet::new();

        for group in groups {
            let runner = runner.clone();
            let semaphore = semaphore.clone();

            join_set.spawn(async move {
                let group_id = group.id;
                let event_count = group.items.len();

                let permit = tokio::select! {
                    biased;
                    _ = runner.cancel.cancelled() => None,
                    permit = semaphore.acquire_owned() => permit.ok(),
                };

                let outcome = match permit {
                    Some(_permit) => runner.run_group(group.items).await,
                    None => GroupOutcome::Cancelled { handled_events: 0 },
                };

                GroupResult {
                    group_id,
                    event_count,
                    outcome,
                }
            });
        }

        let mut consolidator = MessageConsolidator::new();
        let mut task_failure = None;

        while let Some(result) = join_set.join_next().await {
            match result {
                Ok(group_result) => consolidator.add(group_result),
                Err(e) => {
                    tracing::error!("Execution group task failed in block {}: {:?}", height, e);
                    task_failure = Some(e.to_string());
                }
            }
        }

        if let Some(message) = task_failure {
            return Err(EngineError::GroupTask { height, message });
        }
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled { height });
        }

        let batch = consolidator.finish();

        for failure in &batch.failed_groups {
            tracing::error!(
                "Block {}: group {} failed at event {} and contributed no messages: {}",
                height,
                failure.group_id,
                failure.event_index,
                failure.error
            );
        }

        if !batch.messages.is_empty() {
            let publisher = self.publisher.as_ref();
            let messages = batch.messages.as_slice();
            with_retry(&self.publish_retry, "publish", || publisher.publish(messages))
                .await
                .map_err(|source| EngineError::Publish { height, source })?;
        }

        Ok(BlockOutcome {
            height,
            event_count,
            group_count,
            published_messages: batch.messages.len(),
            failed_groups: batch.failed_groups,
        })
    }

    /// Resolve handlers, extract keys and partition the block into groups.
    fn schedule(
        &self,
        block: EventBlock,
    ) -> Result<Vec<ExecutionGroup<ScheduledEvent>>, EngineError> {
        let mut scheduler = ParallelizationScheduler::new();

        for event in block.events {
            let handler = self.registry.resolve(event.kind())?.clone();
            let keys = handler.parallelization_keys(&event);
            if keys.is_empty() {
                return Err(EngineError::NoEntityKeys {
                    height: block.height,
                    event_index: event.event_index,
                    handler: handler.name(),
                });
            }
            scheduler.add((handler, event), &keys);
        }

        Ok(scheduler.into_groups())
    }
}

impl GroupRunner {
    /// Run a group's events strictly in order, stopping at the first failure.
    ///
    /// Cancellation is observed between events, never inside a handler call.
    async fn run_group(&self, events: Vec<ScheduledEvent>) -> GroupOutcome {
        let ctx = HandlerContext::new(self.height, self.store.as_ref());
        let mut messages = Vec::new();

        for (handled_events, (handler, event)) in events.iter().enumerate() {
            if self.cancel.is_cancelled() {
                return GroupOutcome::Cancelled { handled_events };
            }

            let start = Instant::now();
            let result =
                with_retry(&self.retry, handler.name(), || handler.handle(event, &ctx)).await;
            let elapsed = start.elapsed();

            match result {
                Ok(produced) => {
                    tracing::debug!(
                        "{} handled event {} of block {} in {:?} ({} messages)",
                        handler.name(),
                        event.event_index,
                        self.height,
                        elapsed,
                        produced.len()
                    );

                    #[cfg(feature = "bench")]
                    crate::bench::record(
                        handler.name(),
                        self.height,
                        event.event_index,
                        produced.len(),
                        elapsed,
                    );

                    messages.extend(produced);
                }
                Err(error) => {
                    tracing::error!(
                        "{} failed on event {} of block {}: {}",
                        handler.name(),
                        event.event_index,
                        self.height,
                        error
                    );
                    return GroupOutcome::Failed {
                        event_index: event.event_index,
                        error,
                    };
                }
            }
        }

        GroupOutcome::Completed(messages)
    }
}
