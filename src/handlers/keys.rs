//! Entity key extraction.
//!
//! Keys only drive grouping and are never persisted. Every event touching a
//! given order yields the same keys, whichever event family it belongs to.

use std::fmt;

use crate::types::events::EventPayload;
use crate::types::order::IndexerOrderId;

pub const STATEFUL_ORDER_EVENT_TYPE: &str = "StatefulOrderEvent";
pub const ORDER_FILL_EVENT_TYPE: &str = "OrderFillEvent";

/// Opaque grouping identifier for one logical entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityKey(String);

impl EntityKey {
    pub fn new(key: impl Into<String>) -> Self {
        Self(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for EntityKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Keys for an event of `event_type` touching one order. The fill key keeps
/// stateful order events and fills of the same order in one group.
pub fn order_keys(event_type: &str, order_id: &IndexerOrderId) -> Vec<EntityKey> {
    let uuid = order_id.uuid();
    vec![
        EntityKey::new(format!("{}_{}", event_type, uuid)),
        EntityKey::new(format!("{}_{}", ORDER_FILL_EVENT_TYPE, uuid)),
    ]
}

/// Keys of every entity an event affects. Total over all event types.
pub fn extract(payload: &EventPayload) -> Vec<EntityKey> {
    match payload {
        EventPayload::StatefulOrderPlacement(placement) => {
            order_keys(STATEFUL_ORDER_EVENT_TYPE, &placement.order.order_id)
        }
        EventPayload::StatefulOrderRemoval(removal) => {
            order_keys(STATEFUL_ORDER_EVENT_TYPE, &removal.removed_order_id)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::events::{OrderPlacementEvent, OrderRemovalEvent};
    use crate::types::order::{
        IndexerOrder, OrderRemovalReason, OrderSide, SubaccountId, ORDER_FLAG_LONG_TERM,
    };

    fn order_id(client_id: u32) -> IndexerOrderId {
        IndexerOrderId {
            subaccount_id: SubaccountId {
                owner: "dydx1alice".to_string(),
                number: 0,
            },
            client_id,
            order_flags: ORDER_FLAG_LONG_TERM,
            clob_pair_id: 0,
        }
    }

    fn removal(client_id: u32) -> EventPayload {
        EventPayload::StatefulOrderRemoval(OrderRemovalEvent {
            removed_order_id: order_id(client_id),
            reason: OrderRemovalReason::Expired,
        })
    }

    #[test]
    fn test_keys_are_deterministic() {
        assert_eq!(extract(&removal(1)), extract(&removal(1)));
        assert_eq!(extract(&removal(1)).len(), 2);
    }

    #[test]
    fn test_unrelated_orders_do_not_collide() {
        let a = extract(&removal(1));
        let b = extract(&removal(2));
        assert!(a.iter().all(|key| !b.contains(key)));
    }

    #[test]
    fn test_placement_and_removal_of_same_order_share_keys() {
        let placement = EventPayload::StatefulOrderPlacement(OrderPlacementEvent {
            order: IndexerOrder {
                order_id: order_id(1),
                side: OrderSide::Sell,
                quantums: 5,
                subticks: 10,
                good_til_block: None,
                good_til_block_time: Some(100),
                reduce_only: false,
                conditional_order_trigger_subticks: None,
            },
        });
        assert_eq!(extract(&placement), extract(&removal(1)));
    }

    #[test]
    fn test_fill_key_format() {
        let keys = order_keys(STATEFUL_ORDER_EVENT_TYPE, &order_id(3));
        let uuid = order_id(3).uuid();
        assert_eq!(keys[0].as_str(), format!("StatefulOrderEvent_{}", uuid));
        assert_eq!(keys[1].to_string(), format!("OrderFillEvent_{}", uuid));
    }
}
