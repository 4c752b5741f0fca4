//! Outbound messages and the off-chain update payloads they carry.

use serde::{Deserialize, Serialize};

use crate::types::order::{IndexerOrder, IndexerOrderId, OrderRemovalReason};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderRemovalStatus {
    Unspecified,
    BestEffortCanceled,
    Canceled,
    Filled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderPlacementStatus {
    Unspecified,
    BestEffortOpened,
    Opened,
}

/// Update consumed by the order book and websocket services.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OffChainUpdate {
    OrderPlace {
        order: IndexerOrder,
        placement_status: OrderPlacementStatus,
    },
    OrderRemove {
        removed_order_id: IndexerOrderId,
        reason: OrderRemovalReason,
        removal_status: OrderRemovalStatus,
    },
}

/// A message bound for the bus. Messages sharing a partition key are delivered in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutboundMessage {
    pub partition_key: Vec<u8>,
    pub payload: Vec<u8>,
}

impl OutboundMessage {
    /// Encode an off-chain update keyed on the hash of the order it concerns.
    pub fn off_chain_update(
        order_id: &IndexerOrderId,
        update: &OffChainUpdate,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self {
            partition_key: order_id.hash().to_vec(),
            payload: serde_json::to_vec(update)?,
        })
    }

    pub fn decode_update(&self) -> Result<OffChainUpdate, serde_json::Error> {
        serde_json::from_slice(&self.payload)
    }

    pub fn partition_key_hex(&self) -> String {
        hex::encode(&self.partition_key)
    }
}
