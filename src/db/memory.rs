//! In-process order store.
//!
//! Every operation runs under one mutex, so the fast-path operations are atomic
//! with respect to each other and to the discrete reads and writes. Unsigned
//! columns are held to the same BIGINT range as the PostgreSQL schema.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use uuid::Uuid;

use super::error::{to_bigint, DbError};
use super::orders::{OrderRow, OrderStore};
use crate::types::order::{
    placement_transition, removal_transition, OrderRemovalReason, OrderStatus, StatusTransition,
};

#[derive(Default)]
pub struct MemoryOrderStore {
    orders: Mutex<HashMap<Uuid, OrderRow>>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Uuid, OrderRow>> {
        self.orders.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Snapshot of one order.
    pub fn get(&self, id: Uuid) -> Option<OrderRow> {
        self.lock().get(&id).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }
}

fn upsert_locked(orders: &mut HashMap<Uuid, OrderRow>, row: &OrderRow) {
    let mut row = row.clone();
    if let Some(existing) = orders.get(&row.id) {
        row.created_at_height = existing.created_at_height;
    }
    orders.insert(row.id, row);
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn find_order(&self, id: Uuid) -> Result<Option<OrderRow>, DbError> {
        Ok(self.get(id))
    }

    async fn update_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        removal_reason: Option<OrderRemovalReason>,
        height: u64,
    ) -> Result<(), DbError> {
        to_bigint("updated_at_height", height)?;
        let mut orders = self.lock();
        let row = orders.get_mut(&id).ok_or(DbError::NotFound(id))?;
        row.status = status;
        row.removal_reason = removal_reason;
        row.updated_at_height = height;
        Ok(())
    }

    async fn upsert_order(&self, row: &OrderRow) -> Result<(), DbError> {
        row.check_storable()?;
        upsert_locked(&mut self.lock(), row);
        Ok(())
    }

    async fn remove_order_atomic(
        &self,
        id: Uuid,
        reason: OrderRemovalReason,
        height: u64,
    ) -> Result<OrderRow, DbError> {
        to_bigint("updated_at_height", height)?;
        let mut orders = self.lock();
        let row = orders.get_mut(&id).ok_or(DbError::NotFound(id))?;

        match removal_transition(row.status) {
            Ok(StatusTransition::Write(status)) => {
                row.status = status;
                row.removal_reason = Some(reason);
                row.updated_at_height = height;
            }
            Ok(StatusTransition::Unchanged) => {}
            Err(e) => {
                return Err(DbError::InvalidTransition {
                    order: id,
                    message: e.to_string(),
                })
            }
        }

        Ok(row.clone())
    }

    async fn place_order_atomic(&self, row: &OrderRow) -> Result<OrderRow, DbError> {
        row.check_storable()?;
        let mut orders = self.lock();
        let current = orders.get(&row.id).map(|existing| existing.status);

        match placement_transition(current, row.status) {
            Ok(StatusTransition::Write(status)) => {
                let mut placed = row.clone();
                placed.status = status;
                upsert_locked(&mut orders, &placed);
            }
            Ok(StatusTransition::Unchanged) => {}
            Err(e) => {
                return Err(DbError::InvalidTransition {
                    order: row.id,
                    message: e.to_string(),
                })
            }
        }

        orders.get(&row.id).cloned().ok_or(DbError::NotFound(row.id))
    }

    async fn fast_path_available(&self, _operation: &str) -> Result<bool, DbError> {
        Ok(true)
    }
}
