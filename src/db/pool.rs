use std::path::Path;

use bytes::BytesMut;
use deadpool_postgres::{Manager, ManagerConfig, Pool, RecyclingMethod, Runtime};
use tokio_postgres::types::ToSql;
use tokio_postgres::NoTls;
use uuid::Uuid;

use super::error::{to_bigint, DbError};
use super::types::{DbOperation, DbValue, WhereClause};

pub struct DbPool {
    pool: Pool,
}

impl DbPool {
    pub async fn new(database_url: &str, max_size: usize) -> Result<Self, DbError> {
        let config = database_url
            .parse::<tokio_postgres::Config>()
            .map_err(|e| DbError::InvalidConnectionString(e.to_string()))?;

        let manager_config = ManagerConfig {
            recycling_method: RecyclingMethod::Fast,
        };

        let manager = Manager::from_config(config, NoTls, manager_config);

        let pool = Pool::builder(manager)
            .max_size(max_size)
            .runtime(Runtime::Tokio1)
            .build()
            .map_err(DbError::BuildError)?;

        let _conn = pool.get().await?;
        tracing::info!(
            "Database connection pool created successfully (max_size={})",
            max_size
        );

        Ok(Self { pool })
    }

    /// Execute operations in one transaction and return the total number of affected rows.
    pub async fn execute_transaction(&self, operations: Vec<DbOperation>) -> Result<u64, DbError> {
        if operations.is_empty() {
            return Ok(0);
        }

        let statements = operations
            .into_iter()
            .map(build_sql)
            .collect::<Result<Vec<_>, _>>()?;

        let mut client = self.pool.get().await?;
        let transaction = client.transaction().await?;
        let mut affected = 0;

        for (sql, params) in statements {
            let params_refs: Vec<&(dyn ToSql + Sync)> =
                params.iter().map(|p| p as &(dyn ToSql + Sync)).collect();

            match transaction.execute(&sql, &params_refs[..]).await {
                Ok(rows) => affected += rows,
                Err(e) => {
                    let db_err: DbError = e.into();
                    tracing::error!("SQL execution failed\n  SQL: {}\n  Error: {}", sql, db_err);
                    return Err(db_err);
                }
            }
        }

        transaction.commit().await?;
        Ok(affected)
    }

    pub async fn run_migrations(&self, dir: &Path) -> Result<(), DbError> {
        super::migrations::run(&self.pool, dir).await
    }

    pub async fn query(
        &self,
        query: &str,
        params: &[&(dyn ToSql + Sync)],
    ) -> Result<Vec<tokio_postgres::Row>, DbError> {
        let client = self.pool.get().await?;
        let rows = client.query(query, params).await?;
        Ok(rows)
    }
}

#[derive(Debug)]
enum SqlParam {
    Null,
    Bool(bool),
    Int64(i64),
    Text(String),
    Uuid(Uuid),
}

impl ToSql for SqlParam {
    fn to_sql(
        &self,
        ty: &tokio_postgres::types::Type,
        out: &mut BytesMut,
    ) -> Result<tokio_postgres::types::IsNull, Box<dyn std::error::Error + Sync + Send>> {
        match self {
            SqlParam::Null => Ok(tokio_postgres::types::IsNull::Yes),
            SqlParam::Bool(v) => v.to_sql(ty, out),
            SqlParam::Int64(v) => v.to_sql(ty, out),
            SqlParam::Text(v) => v.to_sql(ty, out),
            SqlParam::Uuid(v) => v.to_sql(ty, out),
        }
    }

    fn accepts(ty: &tokio_postgres::types::Type) -> bool {
        <bool as ToSql>::accepts(ty)
            || <i64 as ToSql>::accepts(ty)
            || <String as ToSql>::accepts(ty)
            || <Uuid as ToSql>::accepts(ty)
    }

    tokio_postgres::types::to_sql_checked!();
}

fn convert_db_value(column: &str, value: &DbValue) -> Result<SqlParam, DbError> {
    Ok(match value {
        DbValue::Null => SqlParam::Null,
        DbValue::Bool(v) => SqlParam::Bool(*v),
        DbValue::Uint64(v) => SqlParam::Int64(to_bigint(column, *v)?),
        DbValue::Text(v) => SqlParam::Text(v.clone()),
        DbValue::Uuid(v) => SqlParam::Uuid(*v),
    })
}

fn convert_values_to_params(
    columns: &[String],
    values: &[DbValue],
) -> Result<Vec<SqlParam>, DbError> {
    columns
        .iter()
        .zip(values)
        .map(|(column, value)| convert_db_value(column, value))
        .collect()
}

fn build_sql(op: DbOperation) -> Result<(String, Vec<SqlParam>), DbError> {
    match op {
        DbOperation::Upsert {
            table,
            columns,
            values,
            conflict_columns,
            update_columns,
        } => build_upsert_sql(&table, &columns, &values, &conflict_columns, &update_columns),
        DbOperation::Update {
            table,
            set_columns,
            where_clause,
        } => build_update_sql(&table, &set_columns, &where_clause),
    }
}

/// Wrap a column name in double quotes to handle reserved keywords.
fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name)
}

fn quote_cols(columns: &[String]) -> String {
    columns.iter().map(|c| quote_ident(c)).collect::<Vec<_>>().join(", ")
}

fn build_upsert_sql(
    table: &str,
    columns: &[String],
    values: &[DbValue],
    conflict_columns: &[String],
    update_columns: &[String],
) -> Result<(String, Vec<SqlParam>), DbError> {
    let cols = quote_cols(columns);
    let placeholders: Vec<String> = (1..=values.len()).map(|i| format!("${}", i)).collect();
    let placeholders_str = placeholders.join(", ");

    let conflict_cols = quote_cols(conflict_columns);
    let updates: Vec<String> = update_columns
        .iter()
        .map(|c| format!("{} = EXCLUDED.{}", quote_ident(c), quote_ident(c)))
        .collect();
    let updates_str = updates.join(", ");

    let sql = if update_columns.is_empty() {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO NOTHING",
            table, cols, placeholders_str, conflict_cols
        )
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO UPDATE SET {}",
            table, cols, placeholders_str, conflict_cols, updates_str
        )
    };

    let params = convert_values_to_params(columns, values)?;
    Ok((sql, params))
}

fn build_update_sql(
    table: &str,
    set_columns: &[(String, DbValue)],
    where_clause: &WhereClause,
) -> Result<(String, Vec<SqlParam>), DbError> {
    let mut params = Vec::new();
    let mut sets = Vec::with_capacity(set_columns.len());

    for (col, val) in set_columns {
        params.push(convert_db_value(col, val)?);
        sets.push(format!("{} = ${}", quote_ident(col), params.len()));
    }
    let sets_str = sets.join(", ");

    let where_str = match where_clause {
        WhereClause::Eq(col, val) => {
            params.push(convert_db_value(col, val)?);
            format!("{} = ${}", quote_ident(col), params.len())
        }
    };

    let sql = format!("UPDATE {} SET {} WHERE {}", table, sets_str, where_str);
    Ok((sql, params))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cols(names: &[&str]) -> Vec<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_build_update_sql() {
        let id = Uuid::nil();
        let (sql, params) = build_sql(DbOperation::Update {
            table: "orders".to_string(),
            set_columns: vec![
                ("status".to_string(), DbValue::Text("CANCELED".to_string())),
                ("updated_at_height".to_string(), DbValue::Uint64(9)),
            ],
            where_clause: WhereClause::Eq("id".to_string(), DbValue::Uuid(id)),
        })
        .unwrap();

        assert_eq!(
            sql,
            "UPDATE orders SET \"status\" = $1, \"updated_at_height\" = $2 WHERE \"id\" = $3"
        );
        assert_eq!(params.len(), 3);
        assert!(matches!(params[1], SqlParam::Int64(9)));
        assert!(matches!(params[2], SqlParam::Uuid(u) if u == id));
    }

    #[test]
    fn test_build_upsert_sql() {
        let (sql, params) = build_sql(DbOperation::Upsert {
            table: "orders".to_string(),
            columns: cols(&["id", "status", "removal_reason"]),
            values: vec![
                DbValue::Uuid(Uuid::nil()),
                DbValue::Text("OPEN".to_string()),
                DbValue::opt_text(None),
            ],
            conflict_columns: cols(&["id"]),
            update_columns: cols(&["status", "removal_reason"]),
        })
        .unwrap();

        assert_eq!(
            sql,
            "INSERT INTO orders (\"id\", \"status\", \"removal_reason\") VALUES ($1, $2, $3) \
             ON CONFLICT (\"id\") DO UPDATE SET \"status\" = EXCLUDED.\"status\", \
             \"removal_reason\" = EXCLUDED.\"removal_reason\""
        );
        assert!(matches!(params[2], SqlParam::Null));
    }

    #[test]
    fn test_build_upsert_without_updates_does_nothing_on_conflict() {
        let (sql, _) = build_sql(DbOperation::Upsert {
            table: "orders".to_string(),
            columns: cols(&["id"]),
            values: vec![DbValue::Uuid(Uuid::nil())],
            conflict_columns: cols(&["id"]),
            update_columns: Vec::new(),
        })
        .unwrap();

        assert!(sql.ends_with("ON CONFLICT (\"id\") DO NOTHING"));
    }

    #[test]
    fn test_unsigned_values_beyond_bigint_are_rejected() {
        let err = build_sql(DbOperation::Upsert {
            table: "orders".to_string(),
            columns: cols(&["id", "quantums"]),
            values: vec![DbValue::Uuid(Uuid::nil()), DbValue::Uint64(u64::MAX)],
            conflict_columns: cols(&["id"]),
            update_columns: cols(&["quantums"]),
        })
        .unwrap_err();
        assert!(matches!(
            err,
            DbError::ValueOutOfRange { ref column, value } if column == "quantums" && value == u64::MAX
        ));

        let err = build_sql(DbOperation::Update {
            table: "orders".to_string(),
            set_columns: vec![("updated_at_height".to_string(), DbValue::Uint64(1 << 63))],
            where_clause: WhereClause::Eq("id".to_string(), DbValue::Uuid(Uuid::nil())),
        })
        .unwrap_err();
        assert!(matches!(err, DbError::ValueOutOfRange { ref column, .. } if column == "updated_at_height"));

        let (_, params) = build_sql(DbOperation::Update {
            table: "orders".to_string(),
            set_columns: vec![("quantums".to_string(), DbValue::Uint64(i64::MAX as u64))],
            where_clause: WhereClause::Eq("id".to_string(), DbValue::Uuid(Uuid::nil())),
        })
        .unwrap();
        assert!(matches!(params[0], SqlParam::Int64(i64::MAX)));
    }
}
