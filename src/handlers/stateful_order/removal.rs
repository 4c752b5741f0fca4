//! Stateful order removal.
//!
//! Cancels a previously placed order and announces the removal downstream.
//! Removing an order that is already canceled leaves it untouched and still
//! emits the removal message, so redelivered blocks are harmless.

use async_trait::async_trait;

use crate::bus::{OffChainUpdate, OrderRemovalStatus, OutboundMessage};
use crate::db::orders::REMOVAL_FUNCTION;
use crate::db::OrderStore;
use crate::handlers::context::HandlerContext;
use crate::handlers::error::HandlerError;
use crate::handlers::traits::{EventHandler, ExecutionStrategy};
use crate::types::events::{BlockEvent, EventKind, EventPayload, OrderRemovalEvent};
use crate::types::order::{
    removal_transition, IndexerOrderId, OrderRemovalReason, StatusTransition,
};

const NAME: &str = "StatefulOrderRemovalHandler";

pub struct StatefulOrderRemovalHandler {
    strategy: ExecutionStrategy,
}

impl StatefulOrderRemovalHandler {
    pub fn new(strategy: ExecutionStrategy) -> Self {
        Self { strategy }
    }

    /// One storage call reads, evaluates and writes the order.
    async fn handle_via_sql_function(
        &self,
        removal: &OrderRemovalEvent,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<OutboundMessage>, HandlerError> {
        let row = ctx
            .store
            .remove_order_atomic(
                removal.removed_order_id.uuid(),
                removal.reason,
                ctx.block_height,
            )
            .await?;

        tracing::debug!(
            "Order {} is {} after removal at block {}",
            row.id,
            row.status,
            ctx.block_height
        );

        Ok(vec![removal_message(&row.order_id, removal.reason)?])
    }

    async fn handle_via_client_queries(
        &self,
        removal: &OrderRemovalEvent,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<OutboundMessage>, HandlerError> {
        let id = removal.removed_order_id.uuid();
        let current = ctx
            .store
            .find_order(id)
            .await?
            .ok_or_else(|| HandlerError::EntityNotFound(format!("order {}", id)))?;

        match removal_transition(current.status) {
            Ok(StatusTransition::Write(status)) => {
                ctx.store
                    .update_order_status(id, status, Some(removal.reason), ctx.block_height)
                    .await?;
            }
            Ok(StatusTransition::Unchanged) => {
                tracing::debug!("Order {} already {}, removal is a no-op", id, current.status);
            }
            Err(e) => {
                return Err(HandlerError::InvalidStateTransition {
                    entity: format!("order {}", id),
                    message: e.to_string(),
                })
            }
        }

        Ok(vec![removal_message(&removal.removed_order_id, removal.reason)?])
    }
}

fn removal_message(
    order_id: &IndexerOrderId,
    reason: OrderRemovalReason,
) -> Result<OutboundMessage, HandlerError> {
    let update = OffChainUpdate::OrderRemove {
        removed_order_id: order_id.clone(),
        reason,
        removal_status: OrderRemovalStatus::Canceled,
    };
    Ok(OutboundMessage::off_chain_update(order_id, &update)?)
}

#[async_trait]
impl EventHandler for StatefulOrderRemovalHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn event_kinds(&self) -> &'static [EventKind] {
        &[EventKind::StatefulOrderRemoval]
    }

    fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    async fn handle(
        &self,
        event: &BlockEvent,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<OutboundMessage>, HandlerError> {
        let EventPayload::StatefulOrderRemoval(removal) = &event.payload else {
            return Err(HandlerError::UnexpectedEvent {
                handler: NAME,
                kind: event.kind(),
            });
        };

        match self.strategy {
            ExecutionStrategy::FastPath => self.handle_via_sql_function(removal, ctx).await,
            ExecutionStrategy::Fallback => self.handle_via_client_queries(removal, ctx).await,
        }
    }

    async fn initialize(&self, store: &dyn OrderStore) -> Result<(), HandlerError> {
        super::require_fast_path(NAME, self.strategy, REMOVAL_FUNCTION, store).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{MemoryOrderStore, OrderRow};
    use crate::handlers::test_utils::{order, placement, removal};
    use crate::types::order::OrderStatus;

    const STRATEGIES: [ExecutionStrategy; 2] =
        [ExecutionStrategy::FastPath, ExecutionStrategy::Fallback];

    async fn seed(status: OrderStatus) -> MemoryOrderStore {
        let store = MemoryOrderStore::new();
        let mut row = OrderRow::placed(&order("dydx1alice", 1), 5);
        row.status = status;
        store.upsert_order(&row).await.unwrap();
        store
    }

    async fn run(
        strategy: ExecutionStrategy,
        store: &MemoryOrderStore,
        event: &BlockEvent,
        height: u64,
    ) -> Result<Vec<OutboundMessage>, HandlerError> {
        let handler = StatefulOrderRemovalHandler::new(strategy);
        handler.handle(event, &HandlerContext::new(height, store)).await
    }

    #[tokio::test]
    async fn test_strategies_are_equivalent() {
        let event = removal(0, "dydx1alice", OrderRemovalReason::Expired);
        let id = order("dydx1alice", 1).order_id.uuid();

        for prior in [
            OrderStatus::Open,
            OrderStatus::Untriggered,
            OrderStatus::BestEffortCanceled,
            OrderStatus::Canceled,
        ] {
            let fast_store = seed(prior).await;
            let slow_store = seed(prior).await;

            let fast = run(ExecutionStrategy::FastPath, &fast_store, &event, 9)
                .await
                .unwrap();
            let slow = run(ExecutionStrategy::Fallback, &slow_store, &event, 9)
                .await
                .unwrap();

            assert_eq!(fast, slow, "messages differ for prior status {}", prior);
            assert_eq!(fast_store.get(id), slow_store.get(id));
        }
    }

    #[tokio::test]
    async fn test_removal_cancels_and_emits_message() {
        for strategy in STRATEGIES {
            let store = seed(OrderStatus::Open).await;
            let event = removal(0, "dydx1alice", OrderRemovalReason::Expired);

            let messages = run(strategy, &store, &event, 9).await.unwrap();
            assert_eq!(messages.len(), 1);

            let order_id = order("dydx1alice", 1).order_id;
            assert_eq!(messages[0].partition_key, order_id.hash().to_vec());
            assert_eq!(
                messages[0].decode_update().unwrap(),
                OffChainUpdate::OrderRemove {
                    removed_order_id: order_id.clone(),
                    reason: OrderRemovalReason::Expired,
                    removal_status: OrderRemovalStatus::Canceled,
                }
            );

            let row = store.get(order_id.uuid()).unwrap();
            assert_eq!(row.status, OrderStatus::Canceled);
            assert_eq!(row.removal_reason, Some(OrderRemovalReason::Expired));
            assert_eq!(row.updated_at_height, 9);
            assert_eq!(row.created_at_height, 5);
        }
    }

    #[tokio::test]
    async fn test_repeated_removal_is_idempotent() {
        for strategy in STRATEGIES {
            let store = seed(OrderStatus::Open).await;
            let first = removal(0, "dydx1alice", OrderRemovalReason::Expired);
            let second = removal(1, "dydx1alice", OrderRemovalReason::UserCanceled);

            run(strategy, &store, &first, 9).await.unwrap();
            let id = order("dydx1alice", 1).order_id.uuid();
            let after_first = store.get(id).unwrap();

            let messages = run(strategy, &store, &second, 10).await.unwrap();
            assert_eq!(messages.len(), 1);
            assert_eq!(store.get(id).unwrap(), after_first);
        }
    }

    #[tokio::test]
    async fn test_missing_order_is_not_found() {
        for strategy in STRATEGIES {
            let store = MemoryOrderStore::new();
            let event = removal(0, "dydx1nobody", OrderRemovalReason::Expired);

            let err = run(strategy, &store, &event, 9).await.unwrap_err();
            assert!(matches!(err, HandlerError::EntityNotFound(_)), "{:?}", err);
            assert!(store.is_empty());
        }
    }

    #[tokio::test]
    async fn test_filled_order_cannot_be_removed() {
        for strategy in STRATEGIES {
            let store = seed(OrderStatus::Filled).await;
            let event = removal(0, "dydx1alice", OrderRemovalReason::Expired);

            let err = run(strategy, &store, &event, 9).await.unwrap_err();
            assert!(
                matches!(err, HandlerError::InvalidStateTransition { .. }),
                "{:?}",
                err
            );

            let row = store.get(order("dydx1alice", 1).order_id.uuid()).unwrap();
            assert_eq!(row.status, OrderStatus::Filled);
        }
    }

    #[tokio::test]
    async fn test_rejects_other_event_kinds() {
        let store = MemoryOrderStore::new();
        let err = run(ExecutionStrategy::Fallback, &store, &placement(0, "dydx1alice"), 1)
            .await
            .unwrap_err();
        assert!(matches!(err, HandlerError::UnexpectedEvent { .. }));
    }

    #[tokio::test]
    async fn test_initialize_checks_fast_path() {
        let store = MemoryOrderStore::new();
        StatefulOrderRemovalHandler::new(ExecutionStrategy::FastPath)
            .initialize(&store)
            .await
            .unwrap();
    }
}
