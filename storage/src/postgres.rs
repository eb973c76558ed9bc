//! PostgreSQL local store keeping each row's attributes as JSONB.

use crate::local::row_id;
use async_trait::async_trait;
use errors::StorageError;
use idp_core::{Attributes, LocalStore};
use serde_json::Value;
use sqlx::{AssertSqlSafe, Pool, Postgres, Row};

const BACKEND: &str = "PostgreSQL";

fn query_error(e: &sqlx::Error) -> StorageError {
    StorageError::QueryError {
        backend: BACKEND.to_string(),
        reason: e.to_string()
    }
}

/// Local store over a single table:
///
/// ```sql
/// CREATE TABLE <table> (
///     id BIGSERIAL PRIMARY KEY,
///     attributes JSONB NOT NULL,
///     updated_at BIGINT NOT NULL
/// )
/// ```
///
/// The `id` column is surfaced as the `"id"` attribute and never stored in
/// the JSONB payload.
pub struct PostgresLocalStore {
    pool: Pool<Postgres>,
    table: String
}

impl PostgresLocalStore {
    pub fn new(pool: Pool<Postgres>, table: &str) -> Result<Self, StorageError> {
        if !utils::is_valid_sql_identifier(table) {
            return Err(StorageError::QueryError {
                backend: BACKEND.to_string(),
                reason: format!("invalid table name: {table}")
            });
        }
        Ok(Self {
            pool,
            table: table.to_string()
        })
    }

    pub async fn connect(connection_url: &str, table: &str) -> Result<Self, StorageError> {
        let pool = Pool::connect(connection_url)
            .await
            .map_err(|e| StorageError::ConnectionError {
                backend: BACKEND.to_string(),
                reason: e.to_string()
            })?;
        Self::new(pool, table)
    }

    pub async fn initialize_schema(&self) -> Result<(), StorageError> {
        let create_table = format!(
            "CREATE TABLE IF NOT EXISTS {} (
                id BIGSERIAL PRIMARY KEY,
                attributes JSONB NOT NULL DEFAULT '{{}}',
                updated_at BIGINT NOT NULL
            )",
            self.table
        );
        sqlx::query(AssertSqlSafe(create_table.as_str()))
            .execute(&self.pool)
            .await
            .map_err(|e| query_error(&e))?;

        let create_index = format!(
            "CREATE INDEX IF NOT EXISTS idx_{0}_attributes ON {0} USING GIN (attributes)",
            self.table
        );
        sqlx::query(AssertSqlSafe(create_index.as_str()))
            .execute(&self.pool)
            .await
            .map_err(|e| query_error(&e))?;

        Ok(())
    }

    fn row_to_attributes(row: &sqlx::postgres::PgRow) -> Result<Attributes, StorageError> {
        let id: i64 = row.try_get("id").map_err(|e| query_error(&e))?;
        let payload: Value = row.try_get("attributes").map_err(|e| query_error(&e))?;

        let mut attributes = match payload {
            Value::Object(map) => map,
            other => {
                return Err(StorageError::SerializationError {
                    error_type: "attributes".to_string(),
                    reason: format!("expected a JSON object, found {other}")
                });
            }
        };
        attributes.insert("id".to_string(), Value::from(id));
        Ok(attributes)
    }
}

fn payload(attributes: &Attributes) -> Value {
    let mut payload = attributes.clone();
    payload.remove("id");
    Value::Object(payload)
}

#[async_trait]
impl LocalStore for PostgresLocalStore {
    async fn find_by(&self, column: &str, value: &str) -> Result<Option<Attributes>, StorageError> {
        let row = if column == "id" {
            let Ok(id) = value.parse::<i64>() else {
                return Ok(None);
            };
            let sql = format!("SELECT id, attributes FROM {} WHERE id = $1", self.table);
            sqlx::query(AssertSqlSafe(sql.as_str()))
                .bind(id)
                .fetch_optional(&self.pool)
                .await
        } else {
            let sql = format!(
                "SELECT id, attributes FROM {} WHERE attributes->>$1 = $2 ORDER BY id LIMIT 1",
                self.table
            );
            sqlx::query(AssertSqlSafe(sql.as_str()))
                .bind(column)
                .bind(value)
                .fetch_optional(&self.pool)
                .await
        }
        .map_err(|e| query_error(&e))?;

        row.as_ref().map(Self::row_to_attributes).transpose()
    }

    async fn save(&self, attributes: &Attributes) -> Result<Attributes, StorageError> {
        let now = chrono::Utc::now().timestamp();
        let row = match row_id(attributes) {
            Some(id) => {
                let sql = format!(
                    "UPDATE {} SET attributes = $2, updated_at = $3 WHERE id = $1
                     RETURNING id, attributes",
                    self.table
                );
                sqlx::query(AssertSqlSafe(sql.as_str()))
                    .bind(id)
                    .bind(payload(attributes))
                    .bind(now)
                    .fetch_optional(&self.pool)
                    .await
                    .map_err(|e| query_error(&e))?
                    .ok_or_else(|| StorageError::NotFound {
                        backend: BACKEND.to_string(),
                        id: id.to_string()
                    })?
            }
            None => {
                let sql = format!(
                    "INSERT INTO {} (attributes, updated_at) VALUES ($1, $2)
                     RETURNING id, attributes",
                    self.table
                );
                sqlx::query(AssertSqlSafe(sql.as_str()))
                    .bind(payload(attributes))
                    .bind(now)
                    .fetch_one(&self.pool)
                    .await
                    .map_err(|e| query_error(&e))?
            }
        };

        Self::row_to_attributes(&row)
    }

    async fn delete(&self, attributes: &Attributes) -> Result<bool, StorageError> {
        let Some(id) = row_id(attributes) else {
            return Ok(false);
        };

        let sql = format!("DELETE FROM {} WHERE id = $1", self.table);
        let result = sqlx::query(AssertSqlSafe(sql.as_str()))
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| query_error(&e))?;

        Ok(result.rows_affected() > 0)
    }
}
