//! Decoded block events as delivered by the upstream feed.

use std::fmt;

use serde::{Deserialize, Serialize};

use super::order::{IndexerOrder, IndexerOrderId, OrderRemovalReason};

/// Type tag of an event. The set is closed and known at startup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    StatefulOrderPlacement,
    StatefulOrderRemoval,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [
        EventKind::StatefulOrderPlacement,
        EventKind::StatefulOrderRemoval,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::StatefulOrderPlacement => "stateful_order_placement",
            EventKind::StatefulOrderRemoval => "stateful_order_removal",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPlacementEvent {
    pub order: IndexerOrder,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderRemovalEvent {
    pub removed_order_id: IndexerOrderId,
    pub reason: OrderRemovalReason,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventPayload {
    StatefulOrderPlacement(OrderPlacementEvent),
    StatefulOrderRemoval(OrderRemovalEvent),
}

impl EventPayload {
    pub fn kind(&self) -> EventKind {
        match self {
            EventPayload::StatefulOrderPlacement(_) => EventKind::StatefulOrderPlacement,
            EventPayload::StatefulOrderRemoval(_) => EventKind::StatefulOrderRemoval,
        }
    }
}

/// One state transition emitted by the chain. Identity is its position in the block.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockEvent {
    pub event_index: u32,
    #[serde(default)]
    pub transaction_index: u32,
    pub payload: EventPayload,
}

impl BlockEvent {
    pub fn kind(&self) -> EventKind {
        self.payload.kind()
    }
}

/// All events of one block, in chain order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventBlock {
    pub height: u64,
    pub events: Vec<BlockEvent>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_removal_block() {
        let json = r#"{
            "height": 12,
            "events": [{
                "event_index": 0,
                "payload": {
                    "type": "stateful_order_removal",
                    "removed_order_id": {
                        "subaccount_id": { "owner": "dydx1alice", "number": 0 },
                        "client_id": 4,
                        "order_flags": 64,
                        "clob_pair_id": 0
                    },
                    "reason": "EXPIRED"
                }
            }]
        }"#;

        let block: EventBlock = serde_json::from_str(json).unwrap();
        assert_eq!(block.height, 12);
        assert_eq!(block.events.len(), 1);
        assert_eq!(block.events[0].transaction_index, 0);
        assert_eq!(block.events[0].kind(), EventKind::StatefulOrderRemoval);

        match &block.events[0].payload {
            EventPayload::StatefulOrderRemoval(removal) => {
                assert_eq!(removal.reason, OrderRemovalReason::Expired);
                assert_eq!(removal.removed_order_id.client_id, 4);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }

    #[test]
    fn test_parse_placement_event() {
        let json = r#"{
            "event_index": 3,
            "transaction_index": 1,
            "payload": {
                "type": "stateful_order_placement",
                "order": {
                    "order_id": {
                        "subaccount_id": { "owner": "dydx1bob", "number": 2 },
                        "client_id": 9,
                        "order_flags": 32,
                        "clob_pair_id": 1
                    },
                    "side": "SELL",
                    "quantums": 1000,
                    "subticks": 250,
                    "conditional_order_trigger_subticks": 240
                }
            }
        }"#;

        let event: BlockEvent = serde_json::from_str(json).unwrap();
        assert_eq!(event.kind(), EventKind::StatefulOrderPlacement);
        match event.payload {
            EventPayload::StatefulOrderPlacement(placement) => {
                assert!(placement.order.order_id.is_conditional());
                assert!(!placement.order.reduce_only);
                assert_eq!(placement.order.good_til_block, None);
            }
            other => panic!("unexpected payload {:?}", other),
        }
    }
}
