use uuid::Uuid;

/// A value that can be stored in the database.
#[derive(Debug, Clone, PartialEq)]
pub enum DbValue {
    /// NULL value
    Null,
    /// Boolean
    Bool(bool),
    /// Unsigned 64-bit integer (stored as BIGINT)
    Uint64(u64),
    /// Text (unlimited length)
    Text(String),
    /// UUID primary key
    Uuid(Uuid),
}

impl DbValue {
    /// Optional unsigned integer, NULL when absent.
    pub fn opt_uint(value: Option<u64>) -> Self {
        value.map(DbValue::Uint64).unwrap_or(DbValue::Null)
    }

    /// Optional text, NULL when absent.
    pub fn opt_text(value: Option<&str>) -> Self {
        value
            .map(|v| DbValue::Text(v.to_string()))
            .unwrap_or(DbValue::Null)
    }
}

/// Database write issued by the client-side (fallback) handler strategy.
#[derive(Debug, Clone, PartialEq)]
pub enum DbOperation {
    /// INSERT with ON CONFLICT DO UPDATE (upsert)
    Upsert {
        table: String,
        columns: Vec<String>,
        values: Vec<DbValue>,
        /// Columns that form the unique constraint
        conflict_columns: Vec<String>,
        /// Columns to update on conflict
        update_columns: Vec<String>,
    },
    /// UPDATE with WHERE clause
    Update {
        table: String,
        set_columns: Vec<(String, DbValue)>,
        where_clause: WhereClause,
    },
}

/// WHERE clause for UPDATE operations.
#[derive(Debug, Clone, PartialEq)]
pub enum WhereClause {
    /// column = value
    Eq(String, DbValue),
}
