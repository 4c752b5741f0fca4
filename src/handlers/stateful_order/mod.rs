//! Handlers for stateful (long-term and conditional) order events.

pub mod placement;
pub mod removal;

pub use placement::StatefulOrderPlacementHandler;
pub use removal::StatefulOrderRemovalHandler;

use crate::db::OrderStore;
use crate::types::config::engine::HandlerConfig;

use super::error::{HandlerError, RegistryError};
use super::registry::HandlerRegistry;
use super::traits::ExecutionStrategy;

/// Register all stateful order handlers.
pub fn register_handlers(
    registry: &mut HandlerRegistry,
    config: &HandlerConfig,
) -> Result<(), RegistryError> {
    let strategy = ExecutionStrategy::from_config(config);
    registry.register(StatefulOrderPlacementHandler::new(strategy))?;
    registry.register(StatefulOrderRemovalHandler::new(strategy))?;
    Ok(())
}

/// Fail startup when the fast path is selected but its storage function is missing.
async fn require_fast_path(
    handler: &'static str,
    strategy: ExecutionStrategy,
    function: &'static str,
    store: &dyn OrderStore,
) -> Result<(), HandlerError> {
    if strategy != ExecutionStrategy::FastPath {
        return Ok(());
    }
    if !store.fast_path_available(function).await? {
        return Err(HandlerError::FastPathUnavailable { handler, function });
    }
    tracing::debug!("{} using storage function {}", handler, function);
    Ok(())
}
