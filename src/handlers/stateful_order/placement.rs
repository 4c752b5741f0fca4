//! Stateful order placement.
//!
//! Upserts the placed order (OPEN, or UNTRIGGERED for conditional orders) and
//! announces it downstream. A filled order cannot be placed again.

use async_trait::async_trait;

use crate::bus::{OffChainUpdate, OrderPlacementStatus, OutboundMessage};
use crate::db::orders::PLACEMENT_FUNCTION;
use crate::db::{OrderRow, OrderStore};
use crate::handlers::context::HandlerContext;
use crate::handlers::error::HandlerError;
use crate::handlers::traits::{EventHandler, ExecutionStrategy};
use crate::types::events::{BlockEvent, EventKind, EventPayload, OrderPlacementEvent};
use crate::types::order::{placement_transition, IndexerOrder, StatusTransition};

const NAME: &str = "StatefulOrderPlacementHandler";

pub struct StatefulOrderPlacementHandler {
    strategy: ExecutionStrategy,
}

impl StatefulOrderPlacementHandler {
    pub fn new(strategy: ExecutionStrategy) -> Self {
        Self { strategy }
    }

    async fn handle_via_sql_function(
        &self,
        placement: &OrderPlacementEvent,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<OutboundMessage>, HandlerError> {
        let row = OrderRow::placed(&placement.order, ctx.block_height);
        let placed = ctx.store.place_order_atomic(&row).await?;

        tracing::debug!(
            "Order {} placed as {} at block {}",
            placed.id,
            placed.status,
            ctx.block_height
        );

        Ok(vec![placement_message(&placement.order)?])
    }

    async fn handle_via_client_queries(
        &self,
        placement: &OrderPlacementEvent,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<OutboundMessage>, HandlerError> {
        let row = OrderRow::placed(&placement.order, ctx.block_height);
        let current = ctx.store.find_order(row.id).await?.map(|r| r.status);

        match placement_transition(current, row.status) {
            Ok(StatusTransition::Write(_)) => ctx.store.upsert_order(&row).await?,
            Ok(StatusTransition::Unchanged) => {}
            Err(e) => {
                return Err(HandlerError::InvalidStateTransition {
                    entity: format!("order {}", row.id),
                    message: e.to_string(),
                })
            }
        }

        Ok(vec![placement_message(&placement.order)?])
    }
}

fn placement_message(order: &IndexerOrder) -> Result<OutboundMessage, HandlerError> {
    let update = OffChainUpdate::OrderPlace {
        order: order.clone(),
        placement_status: OrderPlacementStatus::Opened,
    };
    Ok(OutboundMessage::off_chain_update(&order.order_id, &update)?)
}

#[async_trait]
impl EventHandler for StatefulOrderPlacementHandler {
    fn name(&self) -> &'static str {
        NAME
    }

    fn event_kinds(&self) -> &'static [EventKind] {
        &[EventKind::StatefulOrderPlacement]
    }

    fn strategy(&self) -> ExecutionStrategy {
        self.strategy
    }

    async fn handle(
        &self,
        event: &BlockEvent,
        ctx: &HandlerContext<'_>,
    ) -> Result<Vec<OutboundMessage>, HandlerError> {
        let EventPayload::StatefulOrderPlacement(placement) = &event.payload else {
            return Err(HandlerError::UnexpectedEvent {
                handler: NAME,
                kind: event.kind(),
            });
        };

        match self.strategy {
            ExecutionStrategy::FastPath => self.handle_via_sql_function(placement, ctx).await,
            ExecutionStrategy::Fallback => self.handle_via_client_queries(placement, ctx).await,
        }
    }

    async fn initialize(&self, store: &dyn OrderStore) -> Result<(), HandlerError> {
        super::require_fast_path(NAME, self.strategy, PLACEMENT_FUNCTION, store).await
    }
}
