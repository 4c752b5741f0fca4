use thiserror::Error;
use tokio_postgres::error::SqlState;
use uuid::Uuid;

use crate::retry::Retryable;

#[derive(Debug, Error)]
pub enum DbError {
    #[error("Pool error: {0}")]
    PoolError(#[from] deadpool_postgres::PoolError),

    #[error("{}", format_pg_error(.0))]
    PostgresError(#[from] tokio_postgres::Error),

    #[error("Build error: {0}")]
    BuildError(#[from] deadpool_postgres::BuildError),

    #[error("Migration error: {0}")]
    MigrationError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Invalid connection string: {0}")]
    InvalidConnectionString(String),

    #[error("Order {0} not found")]
    NotFound(Uuid),

    #[error("Invalid transition for order {order}: {message}")]
    InvalidTransition { order: Uuid, message: String },

    #[error("Invalid value in column '{column}': {message}")]
    InvalidColumn { column: String, message: String },

    #[error("Value {value} for column '{column}' does not fit in BIGINT")]
    ValueOutOfRange { column: String, value: u64 },
}

/// Narrow an unsigned value to the BIGINT range before it is written.
pub fn to_bigint(column: &str, value: u64) -> Result<i64, DbError> {
    i64::try_from(value).map_err(|_| DbError::ValueOutOfRange {
        column: column.to_string(),
        value,
    })
}

impl Retryable for DbError {
    /// Connection-level failures and serialization conflicts are worth another attempt;
    /// anything the database rejected on its merits is not.
    fn is_retryable(&self) -> bool {
        match self {
            DbError::PoolError(_) => true,
            DbError::PostgresError(e) => match e.code() {
                None => true,
                Some(code) => is_transient_sql_state(code),
            },
            DbError::BuildError(_)
            | DbError::MigrationError(_)
            | DbError::IoError(_)
            | DbError::InvalidConnectionString(_)
            | DbError::NotFound(_)
            | DbError::InvalidTransition { .. }
            | DbError::InvalidColumn { .. }
            | DbError::ValueOutOfRange { .. } => false,
        }
    }
}

fn is_transient_sql_state(code: &SqlState) -> bool {
    // Class 08: connection exception.
    code.code().starts_with("08")
        || *code == SqlState::T_R_SERIALIZATION_FAILURE
        || *code == SqlState::T_R_DEADLOCK_DETECTED
        || *code == SqlState::ADMIN_SHUTDOWN
        || *code == SqlState::CANNOT_CONNECT_NOW
        || *code == SqlState::TOO_MANY_CONNECTIONS
}

fn format_pg_error(e: &tokio_postgres::Error) -> String {
    if let Some(db_err) = e.as_db_error() {
        let mut msg = format!(
            "PostgreSQL error [{}]: {}",
            db_err.code().code(),
            db_err.message()
        );
        if let Some(detail) = db_err.detail() {
            msg.push_str(&format!("\n  Detail: {}", detail));
        }
        if let Some(hint) = db_err.hint() {
            msg.push_str(&format!("\n  Hint: {}", hint));
        }
        if let Some(table) = db_err.table() {
            msg.push_str(&format!("\n  Table: {}", table));
        }
        if let Some(column) = db_err.column() {
            msg.push_str(&format!("\n  Column: {}", column));
        }
        if let Some(constraint) = db_err.constraint() {
            msg.push_str(&format!("\n  Constraint: {}", constraint));
        }
        msg
    } else {
        format!("PostgreSQL error: {}", e)
    }
}
