//! Order identifiers, statuses and the status transition rules.
//!
//! The transition functions here are the single source of truth for what a
//! placement or removal may do to a persisted order. Both handler strategies and
//! the in-process store evaluate them; the PL/pgSQL functions in
//! `migrations/002_stateful_order_functions.sql` mirror them.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use thiserror::Error;
use uuid::Uuid;

/// Namespace for order UUIDs. Changing it re-keys every persisted order.
const ORDER_UUID_NAMESPACE: Uuid = Uuid::from_u128(0x8f3b_61c2_7a4e_5d90_b1e3_22c4_9d6a_0f17);

pub const ORDER_FLAG_SHORT_TERM: u32 = 0;
pub const ORDER_FLAG_CONDITIONAL: u32 = 32;
pub const ORDER_FLAG_LONG_TERM: u32 = 64;

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SubaccountId {
    pub owner: String,
    pub number: u32,
}

/// Chain-side identifier of an order.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct IndexerOrderId {
    pub subaccount_id: SubaccountId,
    pub client_id: u32,
    pub order_flags: u32,
    pub clob_pair_id: u32,
}

impl IndexerOrderId {
    /// Primary key of the order row.
    pub fn uuid(&self) -> Uuid {
        let name = format!(
            "{}-{}-{}-{}-{}",
            self.subaccount_id.owner,
            self.subaccount_id.number,
            self.client_id,
            self.clob_pair_id,
            self.order_flags
        );
        Uuid::new_v5(&ORDER_UUID_NAMESPACE, name.as_bytes())
    }

    /// SHA-256 over the canonical byte encoding; used as the bus partition key.
    pub fn hash(&self) -> [u8; 32] {
        let owner = self.subaccount_id.owner.as_bytes();
        let mut hasher = Sha256::new();
        hasher.update((owner.len() as u32).to_be_bytes());
        hasher.update(owner);
        hasher.update(self.subaccount_id.number.to_be_bytes());
        hasher.update(self.client_id.to_be_bytes());
        hasher.update(self.order_flags.to_be_bytes());
        hasher.update(self.clob_pair_id.to_be_bytes());

        let digest = hasher.finalize();
        let mut out = [0u8; 32];
        out.copy_from_slice(&digest);
        out
    }

    pub fn is_conditional(&self) -> bool {
        self.order_flags == ORDER_FLAG_CONDITIONAL
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl OrderSide {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderSide::Buy => "BUY",
            OrderSide::Sell => "SELL",
        }
    }
}

impl FromStr for OrderSide {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "BUY" => Ok(OrderSide::Buy),
            "SELL" => Ok(OrderSide::Sell),
            other => Err(format!("unknown order side '{}'", other)),
        }
    }
}

/// A stateful order as carried by a placement event.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexerOrder {
    pub order_id: IndexerOrderId,
    pub side: OrderSide,
    pub quantums: u64,
    pub subticks: u64,
    #[serde(default)]
    pub good_til_block: Option<u32>,
    #[serde(default)]
    pub good_til_block_time: Option<u32>,
    #[serde(default)]
    pub reduce_only: bool,
    #[serde(default)]
    pub conditional_order_trigger_subticks: Option<u64>,
}

impl IndexerOrder {
    /// Status an order enters on placement. Conditional orders wait for their trigger.
    pub fn initial_status(&self) -> OrderStatus {
        if self.order_id.is_conditional() {
            OrderStatus::Untriggered
        } else {
            OrderStatus::Open
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderStatus {
    Open,
    Filled,
    Canceled,
    BestEffortCanceled,
    Untriggered,
}

impl OrderStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Open => "OPEN",
            OrderStatus::Filled => "FILLED",
            OrderStatus::Canceled => "CANCELED",
            OrderStatus::BestEffortCanceled => "BEST_EFFORT_CANCELED",
            OrderStatus::Untriggered => "UNTRIGGERED",
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "OPEN" => Ok(OrderStatus::Open),
            "FILLED" => Ok(OrderStatus::Filled),
            "CANCELED" => Ok(OrderStatus::Canceled),
            "BEST_EFFORT_CANCELED" => Ok(OrderStatus::BestEffortCanceled),
            "UNTRIGGERED" => Ok(OrderStatus::Untriggered),
            other => Err(format!("unknown order status '{}'", other)),
        }
    }
}

/// Why the chain removed a stateful order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderRemovalReason {
    Unspecified,
    Expired,
    #[serde(alias = "CANCELED")]
    UserCanceled,
    Undercollateralized,
    InternalError,
    SelfTradeError,
    MaxNumOpenOrdersExceeded,
    ConditionalFokCouldNotBeFullyFilled,
    ConditionalIocWouldRestOnBook,
    Replaced,
    FullyFilled,
    EquityTier,
    FinalSettlement,
    ViolatesIsolatedSubaccountConstraints,
    PermissionedKeysExpired,
}

impl OrderRemovalReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            OrderRemovalReason::Unspecified => "UNSPECIFIED",
            OrderRemovalReason::Expired => "EXPIRED",
            OrderRemovalReason::UserCanceled => "USER_CANCELED",
            OrderRemovalReason::Undercollateralized => "UNDERCOLLATERALIZED",
            OrderRemovalReason::InternalError => "INTERNAL_ERROR",
            OrderRemovalReason::SelfTradeError => "SELF_TRADE_ERROR",
            OrderRemovalReason::MaxNumOpenOrdersExceeded => "MAX_NUM_OPEN_ORDERS_EXCEEDED",
            OrderRemovalReason::ConditionalFokCouldNotBeFullyFilled => {
                "CONDITIONAL_FOK_COULD_NOT_BE_FULLY_FILLED"
            }
            OrderRemovalReason::ConditionalIocWouldRestOnBook => {
                "CONDITIONAL_IOC_WOULD_REST_ON_BOOK"
            }
            OrderRemovalReason::Replaced => "REPLACED",
            OrderRemovalReason::FullyFilled => "FULLY_FILLED",
            OrderRemovalReason::EquityTier => "EQUITY_TIER",
            OrderRemovalReason::FinalSettlement => "FINAL_SETTLEMENT",
            OrderRemovalReason::ViolatesIsolatedSubaccountConstraints => {
                "VIOLATES_ISOLATED_SUBACCOUNT_CONSTRAINTS"
            }
            OrderRemovalReason::PermissionedKeysExpired => "PERMISSIONED_KEYS_EXPIRED",
        }
    }
}

impl FromStr for OrderRemovalReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Same spelling as the serde representation.
        serde_json::from_value(serde_json::Value::String(s.to_string()))
            .map_err(|_| format!("unknown removal reason '{}'", s))
    }
}

/// Result of evaluating a status change against the persisted status.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusTransition {
    /// Persist the new status.
    Write(OrderStatus),
    /// Already in the target state; nothing to write.
    Unchanged,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("cannot move order from {from} to {to}")]
pub struct IllegalTransition {
    pub from: OrderStatus,
    pub to: OrderStatus,
}

/// Removal cancels any order that is not filled. Removing a canceled order is a no-op.
pub fn removal_transition(current: OrderStatus) -> Result<StatusTransition, IllegalTransition> {
    match current {
        OrderStatus::Canceled => Ok(StatusTransition::Unchanged),
        OrderStatus::Filled => Err(IllegalTransition {
            from: current,
            to: OrderStatus::Canceled,
        }),
        OrderStatus::Open | OrderStatus::BestEffortCanceled | OrderStatus::Untriggered => {
            Ok(StatusTransition::Write(OrderStatus::Canceled))
        }
    }
}

/// Placement upserts the order unless it has already been filled.
pub fn placement_transition(
    current: Option<OrderStatus>,
    target: OrderStatus,
) -> Result<StatusTransition, IllegalTransition> {
    match current {
        Some(OrderStatus::Filled) => Err(IllegalTransition {
            from: OrderStatus::Filled,
            to: target,
        }),
        _ => Ok(StatusTransition::Write(target)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order_id(owner: &str, client_id: u32) -> IndexerOrderId {
        IndexerOrderId {
            subaccount_id: SubaccountId {
                owner: owner.to_string(),
                number: 0,
            },
            client_id,
            order_flags: ORDER_FLAG_LONG_TERM,
            clob_pair_id: 1,
        }
    }

    #[test]
    fn test_uuid_is_stable_and_distinct() {
        let a = order_id("dydx1alice", 7);
        assert_eq!(a.uuid(), a.clone().uuid());
        assert_ne!(a.uuid(), order_id("dydx1alice", 8).uuid());
        assert_ne!(a.uuid(), order_id("dydx1bob", 7).uuid());
    }

    #[test]
    fn test_hash_is_stable_and_distinct() {
        let a = order_id("dydx1alice", 7);
        assert_eq!(a.hash(), order_id("dydx1alice", 7).hash());
        assert_ne!(a.hash(), order_id("dydx1alice", 70).hash());
        // Length prefix keeps owner/number boundaries unambiguous.
        assert_ne!(order_id("ab", 1).hash(), order_id("a", 1).hash());
    }

    #[test]
    fn test_removal_transitions() {
        assert_eq!(
            removal_transition(OrderStatus::Open),
            Ok(StatusTransition::Write(OrderStatus::Canceled))
        );
        assert_eq!(
            removal_transition(OrderStatus::Untriggered),
            Ok(StatusTransition::Write(OrderStatus::Canceled))
        );
        assert_eq!(
            removal_transition(OrderStatus::Canceled),
            Ok(StatusTransition::Unchanged)
        );
        assert!(removal_transition(OrderStatus::Filled).is_err());
    }

    #[test]
    fn test_placement_transitions() {
        assert_eq!(
            placement_transition(None, OrderStatus::Open),
            Ok(StatusTransition::Write(OrderStatus::Open))
        );
        assert_eq!(
            placement_transition(Some(OrderStatus::Canceled), OrderStatus::Untriggered),
            Ok(StatusTransition::Write(OrderStatus::Untriggered))
        );
        let err = placement_transition(Some(OrderStatus::Filled), OrderStatus::Open).unwrap_err();
        assert_eq!(err.to_string(), "cannot move order from FILLED to OPEN");
    }

    #[test]
    fn test_removal_reason_parsing() {
        assert_eq!(
            "EXPIRED".parse::<OrderRemovalReason>(),
            Ok(OrderRemovalReason::Expired)
        );
        assert_eq!(
            "CANCELED".parse::<OrderRemovalReason>(),
            Ok(OrderRemovalReason::UserCanceled)
        );
        assert_eq!(
            OrderRemovalReason::MaxNumOpenOrdersExceeded
                .as_str()
                .parse::<OrderRemovalReason>(),
            Ok(OrderRemovalReason::MaxNumOpenOrdersExceeded)
        );
        assert!("NOPE".parse::<OrderRemovalReason>().is_err());
    }

    #[test]
    fn test_conditional_orders_start_untriggered() {
        let mut id = order_id("dydx1alice", 1);
        id.order_flags = ORDER_FLAG_CONDITIONAL;
        let order = IndexerOrder {
            order_id: id,
            side: OrderSide::Buy,
            quantums: 10,
            subticks: 100,
            good_til_block: None,
            good_til_block_time: Some(1_700_000_000),
            reduce_only: false,
            conditional_order_trigger_subticks: Some(90),
        };
        assert_eq!(order.initial_status(), OrderStatus::Untriggered);
    }
}
