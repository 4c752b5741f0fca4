//! Outbound pub/sub bus: message types and the publisher contract.

pub mod error;
pub mod message;
pub mod publisher;

pub use error::BusError;
pub use message::{OffChainUpdate, OrderPlacementStatus, OrderRemovalStatus, OutboundMessage};
pub use publisher::{InMemoryBus, MessageBatch, MessagePublisher};
