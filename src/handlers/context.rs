//! Per-invocation context handed to handlers.

use crate::db::OrderStore;

/// What a handler may touch while processing one event.
///
/// The store is shared by every concurrently running execution group; each
/// handler call performs its own independent storage operation.
pub struct HandlerContext<'a> {
    pub block_height: u64,
    pub store: &'a dyn OrderStore,
}

impl<'a> HandlerContext<'a> {
    pub fn new(block_height: u64, store: &'a dyn OrderStore) -> Self {
        Self {
            block_height,
            store,
        }
    }
}
