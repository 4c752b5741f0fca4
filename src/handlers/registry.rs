//! Handler registration system.
//!
//! The registry maps every event kind to the single handler that owns it. The
//! set of kinds is closed, so a gap is reported at startup rather than per event.

use std::collections::HashMap;
use std::sync::Arc;

use crate::types::config::engine::HandlerConfig;
use crate::types::events::EventKind;

use super::error::RegistryError;
use super::traits::EventHandler;

/// Registry of all event handlers, built at startup.
pub struct HandlerRegistry {
    handlers: HashMap<EventKind, Arc<dyn EventHandler>>,
    /// Registration order, for initialization
    all_handlers: Vec<Arc<dyn EventHandler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
            all_handlers: Vec::new(),
        }
    }

    /// Register a handler for every kind it declares.
    ///
    /// Fails if another handler already owns one of those kinds.
    pub fn register<H: EventHandler>(&mut self, handler: H) -> Result<(), RegistryError> {
        let handler: Arc<dyn EventHandler> = Arc::new(handler);

        for kind in handler.event_kinds() {
            if let Some(existing) = self.handlers.get(kind) {
                return Err(RegistryError::DuplicateHandler {
                    kind: *kind,
                    existing: existing.name(),
                    duplicate: handler.name(),
                });
            }
        }

        for kind in handler.event_kinds() {
            self.handlers.insert(*kind, handler.clone());
        }
        self.all_handlers.push(handler);
        Ok(())
    }

    pub fn resolve(&self, kind: EventKind) -> Result<&Arc<dyn EventHandler>, RegistryError> {
        self.handlers
            .get(&kind)
            .ok_or(RegistryError::MissingHandler(kind))
    }

    /// Check that every known event kind has a handler.
    pub fn validate(&self) -> Result<(), RegistryError> {
        for kind in EventKind::ALL {
            self.resolve(kind)?;
        }
        Ok(())
    }

    pub fn all_handlers(&self) -> &[Arc<dyn EventHandler>] {
        &self.all_handlers
    }

    pub fn is_empty(&self) -> bool {
        self.all_handlers.is_empty()
    }

    pub fn handler_count(&self) -> usize {
        self.all_handlers.len()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Build the handler registry with all handlers.
///
/// Add new handler registrations here as they are implemented.
pub fn build_registry(config: &HandlerConfig) -> Result<HandlerRegistry, RegistryError> {
    let mut registry = HandlerRegistry::new();

    super::stateful_order::register_handlers(&mut registry, config)?;

    registry.validate()?;

    tracing::info!(
        "Built handler registry with {} handlers covering {} event kinds",
        registry.handler_count(),
        EventKind::ALL.len()
    );

    Ok(registry)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handlers::stateful_order::StatefulOrderRemovalHandler;
    use crate::handlers::traits::ExecutionStrategy;

    #[test]
    fn test_build_registry_covers_every_kind() {
        let registry = build_registry(&HandlerConfig::default()).unwrap();
        assert_eq!(registry.handler_count(), 2);

        let removal = registry.resolve(EventKind::StatefulOrderRemoval).unwrap();
        assert_eq!(removal.name(), "StatefulOrderRemovalHandler");
        assert_eq!(removal.strategy(), ExecutionStrategy::FastPath);

        let placement = registry.resolve(EventKind::StatefulOrderPlacement).unwrap();
        assert_eq!(placement.name(), "StatefulOrderPlacementHandler");
    }

    #[test]
    fn test_strategy_follows_config() {
        let registry = build_registry(&HandlerConfig {
            use_sql_function: false,
        })
        .unwrap();
        for handler in registry.all_handlers() {
            assert_eq!(handler.strategy(), ExecutionStrategy::Fallback);
        }
    }

    #[test]
    fn test_missing_handler_fails_validation() {
        let mut registry = HandlerRegistry::new();
        registry
            .register(StatefulOrderRemovalHandler::new(ExecutionStrategy::Fallback))
            .unwrap();

        let err = registry.validate().unwrap_err();
        assert!(matches!(
            err,
            RegistryError::MissingHandler(EventKind::StatefulOrderPlacement)
        ));
    }

    #[test]
    fn test_duplicate_handler_is_rejected() {
        let mut registry = HandlerRegistry::new();
        registry
            .register(StatefulOrderRemovalHandler::new(ExecutionStrategy::Fallback))
            .unwrap();

        let err = registry
            .register(StatefulOrderRemovalHandler::new(ExecutionStrategy::FastPath))
            .unwrap_err();
        assert!(matches!(err, RegistryError::DuplicateHandler { .. }));
        assert_eq!(registry.handler_count(), 1);
    }
}
