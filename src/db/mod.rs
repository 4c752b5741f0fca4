pub mod error;
pub mod memory;
pub mod migrations;
pub mod orders;
pub mod pool;
pub mod types;

pub use error::DbError;
pub use memory::MemoryOrderStore;
pub use orders::{OrderRow, OrderStore, PgOrderStore};
pub use pool::DbPool;
pub use types::{DbOperation, DbValue, WhereClause};
