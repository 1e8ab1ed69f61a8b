//! PostgreSQL warehouse

use async_trait::async_trait;
use deadpool_postgres::{Pool, Runtime};
use serde_json::{Map, Value};
use tokio_postgres::NoTls;
use tracing::{debug, info};

use super::{LoadOutcome, LoadRequest, Warehouse, WarehouseError, WarehouseResult, validate_identifier};
use crate::config::WarehouseConfig;
use crate::frame::Row;

fn db_error(err: tokio_postgres::Error) -> WarehouseError {
    WarehouseError::Database(err.to_string())
}

/// Bulk insert statement for a table
///
/// Rows travel as one JSON array parameter and are expanded server side
/// against the table's row type, so every value is coerced to its column
/// type by the server.
pub fn insert_statement(table: &str, columns: &[String]) -> WarehouseResult<String> {
    validate_identifier(table)?;
    for column in columns {
        validate_identifier(column)?;
    }
    let columns = columns.join(", ");
    Ok(format!(
        "INSERT INTO {table} ({columns}) \
         SELECT {columns} FROM json_populate_recordset(NULL::{table}, $1::json) \
         ON CONFLICT DO NOTHING"
    ))
}

/// Encode rows as a JSON array of objects keyed by column name
pub fn rows_to_json(columns: &[String], rows: &[Row]) -> Value {
    Value::Array(
        rows.iter()
            .map(|row| {
                let object: Map<String, Value> = columns
                    .iter()
                    .zip(row)
                    .map(|(column, cell)| {
                        let value = cell.clone().map(Value::String).unwrap_or(Value::Null);
                        (column.clone(), value)
                    })
                    .collect();
                Value::Object(object)
            })
            .collect(),
    )
}

/// Warehouse backed by a PostgreSQL connection pool
#[derive(Clone)]
pub struct PostgresWarehouse {
    pool: Pool,
}

impl PostgresWarehouse {
    /// Build a pool from configuration
    ///
    /// No connection is opened until the first call.
    pub fn new(config: &WarehouseConfig) -> WarehouseResult<Self> {
        let mut pg = deadpool_postgres::Config::new();
        pg.host = Some(config.host.clone());
        pg.port = Some(config.port);
        pg.dbname = Some(config.name.clone());
        pg.user = Some(config.user.clone());
        pg.password = Some(config.password.clone());
        pg.pool = Some(deadpool_postgres::PoolConfig::new(config.pool_size));

        let pool = pg
            .create_pool(Some(Runtime::Tokio1), NoTls)
            .map_err(|e| WarehouseError::Connection(e.to_string()))?;
        Ok(Self { pool })
    }

    /// Underlying pool, shared with the query layer
    pub fn pool(&self) -> &Pool {
        &self.pool
    }

    async fn client(&self) -> WarehouseResult<deadpool_postgres::Object> {
        self.pool
            .get()
            .await
            .map_err(|e| WarehouseError::Connection(e.to_string()))
    }
}

#[async_trait]
impl Warehouse for PostgresWarehouse {
    async fn load(&self, request: LoadRequest) -> WarehouseResult<LoadOutcome> {
        request.validate()?;
        let sql = insert_statement(&request.table, &request.columns)?;

        let mut client = self.client().await?;
        let tx = client.transaction().await.map_err(db_error)?;

        if request.truncate_first {
            tx.batch_execute(&format!("TRUNCATE TABLE {}", request.table))
                .await
                .map_err(db_error)?;
            debug!(table = %request.table, "Truncated table");
        }

        let mut inserted = 0;
        for (phase, rows) in request.phases.iter().enumerate() {
            if rows.is_empty() {
                continue;
            }
            let payload = rows_to_json(&request.columns, rows);
            let count = tx.execute(sql.as_str(), &[&payload]).await.map_err(db_error)?;
            debug!(
                table = %request.table,
                phase = phase + 1,
                rows = rows.len(),
                inserted = count,
                "Inserted batch"
            );
            inserted += count;
        }

        tx.commit().await.map_err(db_error)?;

        let outcome = LoadOutcome {
            submitted: request.submitted(),
            inserted,
        };
        info!(
            table = %request.table,
            submitted = outcome.submitted,
            inserted = outcome.inserted,
            "Loaded rows"
        );
        Ok(outcome)
    }

    async fn refresh_view(&self, name: &str) -> WarehouseResult<()> {
        let name = validate_identifier(name)?;
        let mut client = self.client().await?;
        let tx = client.transaction().await.map_err(db_error)?;
        tx.batch_execute(&format!("REFRESH MATERIALIZED VIEW {name}"))
            .await
            .map_err(db_error)?;
        tx.commit().await.map_err(db_error)?;
        info!(view = name, "Refreshed materialized view");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_statement() {
        let sql = insert_statement("orders", &["order_id".into(), "status".into()]).unwrap();
        assert_eq!(
            sql,
            "INSERT INTO orders (order_id, status) SELECT order_id, status \
             FROM json_populate_recordset(NULL::orders, $1::json) ON CONFLICT DO NOTHING"
        );
        assert!(insert_statement("orders x", &[]).is_err());
        assert!(insert_statement("orders", &["a;b".into()]).is_err());
    }

    #[test]
    fn test_rows_to_json_keeps_nulls() {
        let json = rows_to_json(
            &["a".into(), "b".into()],
            &[vec![Some("1".into()), None]],
        );
        assert_eq!(json, serde_json::json!([{"a": "1", "b": null}]));
    }

    #[tokio::test]
    async fn test_pool_creation_is_lazy() {
        let warehouse = PostgresWarehouse::new(&WarehouseConfig::default()).unwrap();
        assert_eq!(warehouse.pool().status().size, 0);
    }
}
