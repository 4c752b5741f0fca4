//! Order repository: the narrow storage contract the stateful order handlers use.
//!
//! Two families of operations live here:
//! - discrete reads and writes (`find_order`, `update_order_status`, `upsert_order`)
//!   that the client-side strategy composes itself, and
//! - one atomic operation per handler (`remove_order_atomic`, `place_order_atomic`)
//!   that performs read, rule evaluation and write in a single storage call.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_postgres::error::SqlState;
use tokio_postgres::Row;
use uuid::Uuid;

use super::error::{to_bigint, DbError};
use super::pool::DbPool;
use super::types::{DbOperation, DbValue, WhereClause};
use crate::types::order::{
    IndexerOrder, IndexerOrderId, OrderRemovalReason, OrderSide, OrderStatus, SubaccountId,
};

pub const ORDERS_TABLE: &str = "orders";
pub const REMOVAL_FUNCTION: &str = "indexer_stateful_order_removal";
pub const PLACEMENT_FUNCTION: &str = "indexer_stateful_order_placement";

const ORDER_COLUMNS: [&str; 17] = [
    "id",
    "subaccount_owner",
    "subaccount_number",
    "client_id",
    "clob_pair_id",
    "order_flags",
    "side",
    "quantums",
    "subticks",
    "good_til_block",
    "good_til_block_time",
    "reduce_only",
    "trigger_subticks",
    "status",
    "removal_reason",
    "created_at_height",
    "updated_at_height",
];

/// Persisted state of one order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderRow {
    pub id: Uuid,
    pub order_id: IndexerOrderId,
    pub side: OrderSide,
    pub quantums: u64,
    pub subticks: u64,
    pub good_til_block: Option<u32>,
    pub good_til_block_time: Option<u32>,
    pub reduce_only: bool,
    pub trigger_subticks: Option<u64>,
    pub status: OrderStatus,
    pub removal_reason: Option<OrderRemovalReason>,
    pub created_at_height: u64,
    pub updated_at_height: u64,
}

impl OrderRow {
    /// Row written when `order` is placed at `height`.
    pub fn placed(order: &IndexerOrder, height: u64) -> Self {
        Self {
            id: order.order_id.uuid(),
            order_id: order.order_id.clone(),
            side: order.side,
            quantums: order.quantums,
            subticks: order.subticks,
            good_til_block: order.good_til_block,
            good_til_block_time: order.good_til_block_time,
            reduce_only: order.reduce_only,
            trigger_subticks: order.conditional_order_trigger_subticks,
            status: order.initial_status(),
            removal_reason: None,
            created_at_height: height,
            updated_at_height: height,
        }
    }

    /// Fails when any unsigned column exceeds the BIGINT range of the `orders` table.
    pub fn check_storable(&self) -> Result<(), DbError> {
        PlacementArgs::from_row(self).map(|_| ())
    }

    fn column_values(&self) -> Vec<DbValue> {
        vec![
            DbValue::Uuid(self.id),
            DbValue::Text(self.order_id.subaccount_id.owner.clone()),
            DbValue::Uint64(self.order_id.subaccount_id.number.into()),
            DbValue::Uint64(self.order_id.client_id.into()),
            DbValue::Uint64(self.order_id.clob_pair_id.into()),
            DbValue::Uint64(self.order_id.order_flags.into()),
            DbValue::Text(self.side.as_str().to_string()),
            DbValue::Uint64(self.quantums),
            DbValue::Uint64(self.subticks),
            DbValue::opt_uint(self.good_til_block.map(u64::from)),
            DbValue::opt_uint(self.good_til_block_time.map(u64::from)),
            DbValue::Bool(self.reduce_only),
            DbValue::opt_uint(self.trigger_subticks),
            DbValue::Text(self.status.as_str().to_string()),
            DbValue::opt_text(self.removal_reason.as_ref().map(|r| r.as_str())),
            DbValue::Uint64(self.created_at_height),
            DbValue::Uint64(self.updated_at_height),
        ]
    }
}

/// Storage collaborator for order state. Implementations must be safe to share
/// across concurrently running execution groups.
#[async_trait]
pub trait OrderStore: Send + Sync + 'static {
    async fn find_order(&self, id: Uuid) -> Result<Option<OrderRow>, DbError>;

    /// Write a new status. Fails with `NotFound` when the order does not exist.
    async fn update_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        removal_reason: Option<OrderRemovalReason>,
        height: u64,
    ) -> Result<(), DbError>;

    /// Insert or overwrite an order, keeping its original `created_at_height`.
    async fn upsert_order(&self, row: &OrderRow) -> Result<(), DbError>;

    /// Atomically cancel an order and return the resulting row.
    async fn remove_order_atomic(
        &self,
        id: Uuid,
        reason: OrderRemovalReason,
        height: u64,
    ) -> Result<OrderRow, DbError>;

    /// Atomically upsert a placed order and return the resulting row.
    async fn place_order_atomic(&self, row: &OrderRow) -> Result<OrderRow, DbError>;

    /// Whether the named storage-side operation exists.
    async fn fast_path_available(&self, operation: &str) -> Result<bool, DbError>;
}

/// PostgreSQL-backed order store. Fast-path operations call the PL/pgSQL
/// functions installed by `migrations/002_stateful_order_functions.sql`.
pub struct PgOrderStore {
    pool: Arc<DbPool>,
}

impl PgOrderStore {
    pub fn new(pool: Arc<DbPool>) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl OrderStore for PgOrderStore {
    async fn find_order(&self, id: Uuid) -> Result<Option<OrderRow>, DbError> {
        let sql = format!(
            "SELECT {} FROM {} WHERE id = $1",
            ORDER_COLUMNS.join(", "),
            ORDERS_TABLE
        );
        let rows = self.pool.query(&sql, &[&id]).await?;
        rows.first().map(order_row_from_pg).transpose()
    }

    async fn update_order_status(
        &self,
        id: Uuid,
        status: OrderStatus,
        removal_reason: Option<OrderRemovalReason>,
        height: u64,
    ) -> Result<(), DbError> {
        let affected = self
            .pool
            .execute_transaction(vec![DbOperation::Update {
                table: ORDERS_TABLE.to_string(),
                set_columns: vec![
                    ("status".to_string(), DbValue::Text(status.as_str().to_string())),
                    (
                        "removal_reason".to_string(),
                        DbValue::opt_text(removal_reason.as_ref().map(|r| r.as_str())),
                    ),
                    ("updated_at_height".to_string(), DbValue::Uint64(height)),
                ],
                where_clause: WhereClause::Eq("id".to_string(), DbValue::Uuid(id)),
            }])
            .await?;

        if affected == 0 {
            return Err(DbError::NotFound(id));
        }
        Ok(())
    }

    async fn upsert_order(&self, row: &OrderRow) -> Result<(), DbError> {
        let columns: Vec<String> = ORDER_COLUMNS.iter().map(|c| c.to_string()).collect();
        let update_columns: Vec<String> = ORDER_COLUMNS
            .iter()
            .filter(|c| !matches!(**c, "id" | "created_at_height"))
            .map(|c| c.to_string())
            .collect();

        self.pool
            .execute_transaction(vec![DbOperation::Upsert {
                table: ORDERS_TABLE.to_string(),
                columns,
                values: row.column_values(),
                conflict_columns: vec!["id".to_string()],
                update_columns,
            }])
            .await?;
        Ok(())
    }

    async fn remove_order_atomic(
        &self,
        id: Uuid,
        reason: OrderRemovalReason,
        height: u64,
    ) -> Result<OrderRow, DbError> {
        let sql = format!("SELECT * FROM {}($1, $2, $3)", REMOVAL_FUNCTION);
        let height = to_bigint("updated_at_height", height)?;
        let rows = self
            .pool
            .query(&sql, &[&id, &reason.as_str(), &height])
            .await
            .map_err(|e| classify_function_error(e, id))?;

        let row = rows.first().ok_or(DbError::NotFound(id))?;
        order_row_from_pg(row)
    }

    async fn place_order_atomic(&self, row: &OrderRow) -> Result<OrderRow, DbError> {
        let placeholders: Vec<String> = (1..=ORDER_COLUMNS.len())
            .map(|i| format!("${}", i))
            .collect();
        let sql = format!(
            "SELECT * FROM {}({})",
            PLACEMENT_FUNCTION,
            placeholders.join(", ")
        );

        let args = PlacementArgs::from_row(row)?;
        let owner = row.order_id.subaccount_id.owner.clone();
        let side = row.side.as_str();
        let status = row.status.as_str();
        let removal_reason = row.removal_reason.as_ref().map(|r| r.as_str());

        let rows = self
            .pool
            .query(
                &sql,
                &[
                    &row.id,
                    &owner,
                    &args.number,
                    &args.client_id,
                    &args.clob_pair_id,
                    &args.order_flags,
                    &side,
                    &args.quantums,
                    &args.subticks,
                    &args.good_til_block,
                    &args.good_til_block_time,
                    &row.reduce_only,
                    &args.trigger_subticks,
                    &status,
                    &removal_reason,
                    &args.created_at_height,
                    &args.updated_at_height,
                ],
            )
            .await
            .map_err(|e| classify_function_error(e, row.id))?;

        let result = rows.first().ok_or(DbError::NotFound(row.id))?;
        order_row_from_pg(result)
    }

    async fn fast_path_available(&self, operation: &str) -> Result<bool, DbError> {
        let rows = self
            .pool
            .query(
                "SELECT EXISTS (SELECT 1 FROM pg_proc WHERE proname = $1)",
                &[&operation],
            )
            .await?;
        Ok(rows.first().map(|r| r.get::<_, bool>(0)).unwrap_or(false))
    }
}

/// BIGINT arguments of the placement function, range-checked before the call.
#[derive(Debug, PartialEq, Eq)]
struct PlacementArgs {
    number: i64,
    client_id: i64,
    clob_pair_id: i64,
    order_flags: i64,
    quantums: i64,
    subticks: i64,
    good_til_block: Option<i64>,
    good_til_block_time: Option<i64>,
    trigger_subticks: Option<i64>,
    created_at_height: i64,
    updated_at_height: i64,
}

impl PlacementArgs {
    fn from_row(row: &OrderRow) -> Result<Self, DbError> {
        Ok(Self {
            number: i64::from(row.order_id.subaccount_id.number),
            client_id: i64::from(row.order_id.client_id),
            clob_pair_id: i64::from(row.order_id.clob_pair_id),
            order_flags: i64::from(row.order_id.order_flags),
            quantums: to_bigint("quantums", row.quantums)?,
            subticks: to_bigint("subticks", row.subticks)?,
            good_til_block: row.good_til_block.map(i64::from),
            good_til_block_time: row.good_til_block_time.map(i64::from),
            trigger_subticks: row
                .trigger_subticks
                .map(|v| to_bigint("trigger_subticks", v))
                .transpose()?,
            created_at_height: to_bigint("created_at_height", row.created_at_height)?,
            updated_at_height: to_bigint("updated_at_height", row.updated_at_height)?,
        })
    }
}

/// Map the SQLSTATEs raised by the order functions back onto domain errors.
fn classify_function_error(err: DbError, id: Uuid) -> DbError {
    if let DbError::PostgresError(pg) = &err {
        if let Some(db_err) = pg.as_db_error() {
            if *db_err.code() == SqlState::NO_DATA_FOUND {
                return DbError::NotFound(id);
            }
            if *db_err.code() == SqlState::OBJECT_NOT_IN_PREREQUISITE_STATE {
                return DbError::InvalidTransition {
                    order: id,
                    message: db_err.message().to_string(),
                };
            }
        }
    }
    err
}

fn order_row_from_pg(row: &Row) -> Result<OrderRow, DbError> {
    let status: String = row.try_get("status")?;
    let side: String = row.try_get("side")?;
    let removal_reason: Option<String> = row.try_get("removal_reason")?;

    Ok(OrderRow {
        id: row.try_get("id")?,
        order_id: IndexerOrderId {
            subaccount_id: SubaccountId {
                owner: row.try_get("subaccount_owner")?,
                number: get_u32(row, "subaccount_number")?,
            },
            client_id: get_u32(row, "client_id")?,
            order_flags: get_u32(row, "order_flags")?,
            clob_pair_id: get_u32(row, "clob_pair_id")?,
        },
        side: side
            .parse::<OrderSide>()
            .map_err(|message| invalid_column("side", message))?,
        quantums: get_u64(row, "quantums")?,
        subticks: get_u64(row, "subticks")?,
        good_til_block: get_opt_u32(row, "good_til_block")?,
        good_til_block_time: get_opt_u32(row, "good_til_block_time")?,
        reduce_only: row.try_get("reduce_only")?,
        trigger_subticks: row
            .try_get::<_, Option<i64>>("trigger_subticks")?
            .map(|v| to_u64("trigger_subticks", v))
            .transpose()?,
        status: status
            .parse::<OrderStatus>()
            .map_err(|message| invalid_column("status", message))?,
        removal_reason: removal_reason
            .map(|r| r.parse::<OrderRemovalReason>())
            .transpose()
            .map_err(|message| invalid_column("removal_reason", message))?,
        created_at_height: get_u64(row, "created_at_height")?,
        updated_at_height: get_u64(row, "updated_at_height")?,
    })
}

fn invalid_column(column: &str, message: String) -> DbError {
    DbError::InvalidColumn {
        column: column.to_string(),
        message,
    }
}

fn to_u64(column: &str, value: i64) -> Result<u64, DbError> {
    u64::try_from(value).map_err(|_| invalid_column(column, format!("negative value {}", value)))
}

fn to_u32(column: &str, value: i64) -> Result<u32, DbError> {
    u32::try_from(value).map_err(|_| invalid_column(column, format!("{} out of range", value)))
}

fn get_u64(row: &Row, column: &str) -> Result<u64, DbError> {
    to_u64(column, row.try_get(column)?)
}

fn get_u32(row: &Row, column: &str) -> Result<u32, DbError> {
    to_u32(column, row.try_get(column)?)
}

fn get_opt_u32(row: &Row, column: &str) -> Result<Option<u32>, DbError> {
    row.try_get::<_, Option<i64>>(column)?
        .map(|v| to_u32(column, v))
        .transpose()
}
