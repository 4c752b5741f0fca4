//! Core trait for event handlers.
//!
//! A handler turns one decoded event into exactly one storage mutation and the
//! outbound messages describing it.

use std::fmt;

use async_trait::async_trait;

use crate::bus::OutboundMessage;
use crate::db::OrderStore;
use crate::types::config::engine::HandlerConfig;
use crate::types::events::{BlockEvent, EventKind};

use super::context::HandlerContext;
use super::error::HandlerError;
use super::keys::{self, EntityKey};

/// How a handler performs its mutation. Chosen once at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionStrategy {
    /// One atomic storage-side function call.
    FastPath,
    /// Discrete read, rule evaluation and write issued by the client.
    Fallback,
}

impl ExecutionStrategy {
    pub fn from_config(config: &HandlerConfig) -> Self {
        if config.use_sql_function {
            Self::FastPath
        } else {
            Self::Fallback
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::FastPath => "fast_path",
            Self::Fallback => "fallback",
        }
    }
}

impl fmt::Display for ExecutionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Trait every event handler implements.
///
/// Handlers are registered at compile time in [`super::registry::build_registry`]
/// and own exactly the event kinds they declare. Both execution strategies of a
/// handler must produce identical messages and identical persisted state for
/// the same input and prior state.
#[async_trait]
pub trait EventHandler: Send + Sync + 'static {
    /// Unique name for this handler (used in logging and timing output).
    fn name(&self) -> &'static str;

    /// Event kinds this handler is responsible for.
    fn event_kinds(&self) -> &'static [EventKind];

    fn strategy(&self) -> ExecutionStrategy;

    /// Keys of the entities `event` touches. Must not be empty.
    fn parallelization_keys(&self, event: &BlockEvent) -> Vec<EntityKey> {
        keys::extract(&event.payload)
    }

    /// Apply the event's mutation and return the messages it produces.
    async fn handle(
        &self,
        event: &BlockEvent,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<OutboundMessage>, HandlerError>;

    /// Optional: called once at startup, before any block is processed.
    #[allow(unused_variables)]
    async fn initialize(&self, store: &dyn OrderStore) -> Result<(), HandlerError> {
        Ok(())
    }
}
