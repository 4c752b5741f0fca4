//! Event handling system for decoded blocks.
//!
//! This module provides:
//! - The handler trait and its two execution strategies
//! - Entity key extraction and union-find scheduling into execution groups
//! - A handler registry for compile-time registration
//! - An engine that runs groups concurrently and publishes one batch per block
//!
//! # Architecture
//!
//! ```text
//! EventBlock ──► HandlerEngine ──► Scheduler ──► groups ──► Handlers ──► OrderStore
//!                     │                                        │
//!                     │                                        └─► OutboundMessages
//!                     └─► MessageConsolidator ──► MessagePublisher
//! ```
//!
//! # Example Handler
//!
//! ```ignore
//! use async_trait::async_trait;
//! use stateful_order_indexer::bus::OutboundMessage;
//! use stateful_order_indexer::handlers::{
//!     EventHandler, ExecutionStrategy, HandlerContext, HandlerError,
//! };
//! use stateful_order_indexer::types::events::{BlockEvent, EventKind};
//!
//! pub struct MyHandler;
//!
//! #[async_trait]
//! impl EventHandler for MyHandler {
//!     fn name(&self) -> &'static str { "MyHandler" }
//!     fn event_kinds(&self) -> &'static [EventKind] { &[EventKind::StatefulOrderRemoval] }
//!     fn strategy(&self) -> ExecutionStrategy { ExecutionStrategy::Fallback }
//!
//!     async fn handle(
//!         &self,
//!         event: &BlockEvent,
//!         ctx: &HandlerContext<'_>,
//!     ) -> Result<Vec<OutboundMessage>, HandlerError> {
//!         Ok(Vec::new())
//!     }
//! }
//! ```

pub mod consolidator;
pub mod context;
pub mod engine;
pub mod error;
pub mod keys;
pub mod registry;
pub mod scheduler;
pub mod stateful_order;
pub mod traits;

#[cfg(test)]
mod test_utils;

// Re-exports for convenience
pub use consolidator::{ConsolidatedBatch, GroupFailure, GroupOutcome, MessageConsolidator};
pub use context::HandlerContext;
pub use engine::{BlockOutcome, HandlerEngine};
pub use error::{EngineError, HandlerError, RegistryError};
pub use keys::EntityKey;
pub use registry::{build_registry, HandlerRegistry};
pub use scheduler::{ExecutionGroup, ParallelizationScheduler};
pub use traits::{EventHandler, ExecutionStrategy};
