//! Shared fixtures for handler and engine tests.

use crate::types::events::{
    BlockEvent, EventBlock, EventPayload, OrderPlacementEvent, OrderRemovalEvent,
};
use crate::types::order::{
    IndexerOrder, IndexerOrderId, OrderRemovalReason, OrderSide, SubaccountId,
    ORDER_FLAG_LONG_TERM,
};

pub fn order_id(owner: &str, client_id: u32) -> IndexerOrderId {
    IndexerOrderId {
        subaccount_id: SubaccountId {
            owner: owner.to_string(),
            number: 0,
        },
        client_id,
        order_flags: ORDER_FLAG_LONG_TERM,
        clob_pair_id: 0,
    }
}

pub fn order(owner: &str, client_id: u32) -> IndexerOrder {
    IndexerOrder {
        order_id: order_id(owner, client_id),
        side: OrderSide::Buy,
        quantums: 1_000_000,
        subticks: 250,
        good_til_block: None,
        good_til_block_time: Some(1_700_000_000),
        reduce_only: false,
        conditional_order_trigger_subticks: None,
    }
}

pub fn removal(event_index: u32, owner: &str, reason: OrderRemovalReason) -> BlockEvent {
    BlockEvent {
        event_index,
        transaction_index: 0,
        payload: EventPayload::StatefulOrderRemoval(OrderRemovalEvent {
            removed_order_id: order_id(owner, 1),
            reason,
        }),
    }
}

pub fn placement(event_index: u32, owner: &str) -> BlockEvent {
    BlockEvent {
        event_index,
        transaction_index: 0,
        payload: EventPayload::StatefulOrderPlacement(OrderPlacementEvent {
            order: order(owner, 1),
        }),
    }
}

pub fn block(height: u64, events: Vec<BlockEvent>) -> EventBlock {
    EventBlock { height, events }
}
