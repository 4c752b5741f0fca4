//! Handler, registry and engine error types.

use thiserror::Error;

use crate::bus::BusError;
use crate::db::DbError;
use crate::retry::Retryable;
use crate::types::events::EventKind;

/// Failure of one handler invocation.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// The referenced entity does not exist. Permanent.
    #[error("Entity not found: {0}")]
    EntityNotFound(String),

    /// The mutation is not valid for the persisted state. Permanent.
    #[error("Invalid state transition for {entity}: {message}")]
    InvalidStateTransition { entity: String, message: String },

    /// Transport-level storage failure. Retried by the engine.
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(#[source] DbError),

    /// Storage rejected the operation for a reason retrying cannot fix.
    #[error("Storage error: {0}")]
    Storage(#[source] DbError),

    #[error("Handler '{handler}' cannot handle {kind} events")]
    UnexpectedEvent {
        handler: &'static str,
        kind: EventKind,
    },

    #[error("Handler '{handler}' requires storage function '{function}', which is not installed")]
    FastPathUnavailable {
        handler: &'static str,
        function: &'static str,
    },

    #[error("Message encoding failed: {0}")]
    Encode(#[from] serde_json::Error),
}

impl From<DbError> for HandlerError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound(id) => HandlerError::EntityNotFound(format!("order {}", id)),
            DbError::InvalidTransition { order, message } => {
                HandlerError::InvalidStateTransition {
                    entity: format!("order {}", order),
                    message,
                }
            }
            other if other.is_retryable() => HandlerError::StorageUnavailable(other),
            other => HandlerError::Storage(other),
        }
    }
}

impl Retryable for HandlerError {
    fn is_retryable(&self) -> bool {
        matches!(self, HandlerError::StorageUnavailable(_))
    }
}

/// Startup-time configuration errors in the handler registry.
#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("No handler registered for event type '{0}'")]
    MissingHandler(EventKind),

    #[error("Event type '{kind}' is claimed by both '{existing}' and '{duplicate}'")]
    DuplicateHandler {
        kind: EventKind,
        existing: &'static str,
        duplicate: &'static str,
    },
}

/// Block-level failures. Per-group handler failures are not errors at this
/// level; they are reported in the block outcome.
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("Handler initialization failed: {0}")]
    Initialization(#[source] HandlerError),

    #[error("Handler '{handler}' produced no entity keys for event {event_index} of block {height}")]
    NoEntityKeys {
        height: u64,
        event_index: u32,
        handler: &'static str,
    },

    #[error("Block {height} processing was cancelled")]
    Cancelled { height: u64 },

    #[error("Execution group task failed in block {height}: {message}")]
    GroupTask { height: u64, message: String },

    #[error("Publishing block {height} failed: {source}")]
    Publish {
        height: u64,
        #[source]
        source: BusError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_db_errors_map_onto_taxonomy() {
        let id = Uuid::nil();

        let err: HandlerError = DbError::NotFound(id).into();
        assert!(matches!(err, HandlerError::EntityNotFound(_)));
        assert!(!err.is_retryable());

        let err: HandlerError = DbError::InvalidTransition {
            order: id,
            message: "cannot move order from FILLED to CANCELED".to_string(),
        }
        .into();
        assert!(matches!(err, HandlerError::InvalidStateTransition { .. }));
        assert!(!err.is_retryable());

        let err: HandlerError = DbError::PoolError(deadpool_postgres::PoolError::Closed).into();
        assert!(matches!(err, HandlerError::StorageUnavailable(_)));
        assert!(err.is_retryable());

        let err: HandlerError = DbError::MigrationError("bad".to_string()).into();
        assert!(matches!(err, HandlerError::Storage(_)));
        assert!(!err.is_retryable());
    }
}
