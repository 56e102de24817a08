//! SQLite storage backend
//!
//! One table per entity: an `INTEGER PRIMARY KEY AUTOINCREMENT` key plus
//! untyped own columns, so values keep the storage class they were written
//! with. While a transaction is open every statement runs on it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde_json::Value;
use sqlx::query::Query;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteQueryResult,
    SqliteRow,
};
use sqlx::{Column, Row, Sqlite, Transaction, TypeInfo, ValueRef};
use std::str::FromStr;
use tokio::sync::Mutex;

use super::{ListQuery, Operation, OperationResult, Storage, unknown_columns};
use crate::record::Record;
use crate::schema::{EntityDef, Schema};

pub struct SqliteStorage {
    pool: SqlitePool,
    tx: Mutex<Option<Transaction<'static, Sqlite>>>,
}

impl SqliteStorage {
    pub fn new(pool: SqlitePool) -> Self {
        Self {
            pool,
            tx: Mutex::new(None),
        }
    }

    /// Open a pool for `url`, creating the database file if needed
    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .with_context(|| format!("Invalid database URL: {}", url))?
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .with_context(|| format!("Failed to connect to {}", url))?;

        log::debug!("Connected to {}", url);
        Ok(Self::new(pool))
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Create a table for every entity that does not have one yet
    pub async fn ensure_schema(&self, schema: &Schema) -> Result<()> {
        for entity in schema.entities() {
            let mut columns = vec![format!(
                "{} INTEGER PRIMARY KEY AUTOINCREMENT",
                quote(&entity.primary_key)
            )];
            columns.extend(entity.columns.iter().map(|c| quote(c)));

            let sql = format!(
                "CREATE TABLE IF NOT EXISTS {} ({})",
                quote(&entity.name),
                columns.join(", ")
            );
            self.execute(&sql, &[])
                .await
                .with_context(|| format!("Failed to create table for {}", entity.name))?;
            log::debug!("Ensured table {}", entity.name);
        }
        Ok(())
    }

    async fn execute(&self, sql: &str, values: &[Value]) -> sqlx::Result<SqliteQueryResult> {
        let mut guard = self.tx.lock().await;
        let query = bind_values(sqlx::query(sql), values);
        match guard.as_mut() {
            Some(tx) => query.execute(&mut **tx).await,
            None => query.execute(&self.pool).await,
        }
    }

    async fn fetch_all(&self, sql: &str, values: &[Value]) -> sqlx::Result<Vec<SqliteRow>> {
        let mut guard = self.tx.lock().await;
        let query = bind_values(sqlx::query(sql), values);
        match guard.as_mut() {
            Some(tx) => query.fetch_all(&mut **tx).await,
            None => query.fetch_all(&self.pool).await,
        }
    }
}

/// Quote an identifier
fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

/// Canonical integers ("12", "-3", "0") are stored as integers so keys
/// submitted as text compare equal to generated keys
fn canonical_integer(text: &str) -> Option<i64> {
    let digits = text.strip_prefix('-').unwrap_or(text);
    let canonical = !digits.is_empty()
        && digits.bytes().all(|b| b.is_ascii_digit())
        && (digits == "0" || !digits.starts_with('0'));
    if canonical { text.parse().ok() } else { None }
}

fn bind_values<'q>(
    mut query: Query<'q, Sqlite, SqliteArguments<'q>>,
    values: &'q [Value],
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    for value in values {
        query = match value {
            Value::Null => query.bind(None::<String>),
            Value::Bool(b) => query.bind(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) => query.bind(i),
                None => query.bind(n.as_f64().unwrap_or_default()),
            },
            Value::String(s) => match canonical_integer(s) {
                Some(i) => query.bind(i),
                None => query.bind(s.as_str()),
            },
            // Nested values are kept as JSON text
            other => query.bind(other.to_string()),
        };
    }
    query
}

fn row_to_record(row: &SqliteRow) -> sqlx::Result<Record> {
    let mut record = Record::new();
    for (idx, column) in row.columns().iter().enumerate() {
        let raw = row.try_get_raw(idx)?;
        let value = if raw.is_null() {
            Value::Null
        } else {
            let type_name = raw.type_info().name().to_string();
            match type_name.as_str() {
                "INTEGER" | "BOOLEAN" => Value::from(row.try_get::<i64, _>(idx)?),
                "REAL" => serde_json::Number::from_f64(row.try_get::<f64, _>(idx)?)
                    .map(Value::Number)
                    .unwrap_or(Value::Null),
                "BLOB" => Value::String(
                    String::from_utf8_lossy(&row.try_get::<Vec<u8>, _>(idx)?).into_owned(),
                ),
                _ => Value::String(row.try_get::<String, _>(idx)?),
            }
        };
        record.insert(column.name().to_string(), value);
    }
    Ok(record)
}

#[async_trait]
impl Storage for SqliteStorage {
    async fn get_list(&self, entity: &EntityDef, query: &ListQuery) -> Result<Vec<Record>> {
        let select: Vec<&str> = if query.select.is_empty() {
            entity.all_columns()
        } else {
            query.select.iter().map(|c| c.as_str()).collect()
        };
        if let Some(column) = select
            .iter()
            .copied()
            .chain(query.filter.keys().map(|k| k.as_str()))
            .find(|column| !entity.has_column(column))
        {
            anyhow::bail!("Unknown column '{}' in entity '{}'", column, entity.name);
        }

        let mut conditions = Vec::new();
        let mut values = Vec::new();
        for (column, value) in &query.filter {
            if value.is_null() {
                conditions.push(format!("{} IS NULL", quote(column)));
            } else {
                conditions.push(format!("{} = ?", quote(column)));
                values.push(value.clone());
            }
        }

        let mut sql = format!(
            "SELECT {} FROM {}",
            select.iter().map(|c| quote(c)).collect::<Vec<_>>().join(", "),
            quote(&entity.name)
        );
        if !conditions.is_empty() {
            sql.push_str(" WHERE ");
            sql.push_str(&conditions.join(" AND "));
        }
        sql.push_str(&format!(" ORDER BY {}", quote(&entity.primary_key)));

        let rows = self
            .fetch_all(&sql, &values)
            .await
            .with_context(|| format!("Failed to list {}", entity.name))?;

        rows.iter()
            .map(|row| row_to_record(row).context("Failed to decode row"))
            .collect()
    }

    async fn add(&self, entity: &EntityDef, data: &Record) -> OperationResult {
        let operation = Operation::create(&entity.name, data.clone());

        let unknown = unknown_columns(entity, data);
        if !unknown.is_empty() {
            return OperationResult::error(
                operation,
                format!("Unknown fields for {}: {}", entity.name, unknown.join(", ")),
            );
        }

        let sql = if data.is_empty() {
            format!("INSERT INTO {} DEFAULT VALUES", quote(&entity.name))
        } else {
            format!(
                "INSERT INTO {} ({}) VALUES ({})",
                quote(&entity.name),
                data.keys().map(|k| quote(k)).collect::<Vec<_>>().join(", "),
                vec!["?"; data.len()].join(", ")
            )
        };
        let values: Vec<Value> = data.values().cloned().collect();

        match self.execute(&sql, &values).await {
            Ok(result) => {
                OperationResult::success(operation, Some(Value::from(result.last_insert_rowid())))
            }
            Err(e) => OperationResult::error(operation, e.to_string()),
        }
    }

    async fn update(&self, entity: &EntityDef, id: &Value, data: &Record) -> OperationResult {
        let operation = Operation::update(&entity.name, id.clone(), data.clone());

        let unknown = unknown_columns(entity, data);
        if !unknown.is_empty() {
            return OperationResult::error(
                operation,
                format!("Unknown fields for {}: {}", entity.name, unknown.join(", ")),
            );
        }

        let fields: Vec<(&String, &Value)> = data
            .iter()
            .filter(|(field, _)| **field != entity.primary_key)
            .collect();

        let (sql, mut values) = if fields.is_empty() {
            // Nothing to write, still report a missing row
            (
                format!(
                    "UPDATE {} SET {} = {} WHERE {} = ?",
                    quote(&entity.name),
                    quote(&entity.primary_key),
                    quote(&entity.primary_key),
                    quote(&entity.primary_key)
                ),
                Vec::new(),
            )
        } else {
            (
                format!(
                    "UPDATE {} SET {} WHERE {} = ?",
                    quote(&entity.name),
                    fields
                        .iter()
                        .map(|(field, _)| format!("{} = ?", quote(field)))
                        .collect::<Vec<_>>()
                        .join(", "),
                    quote(&entity.primary_key)
                ),
                fields.iter().map(|(_, value)| (*value).clone()).collect(),
            )
        };
        values.push(id.clone());

        match self.execute(&sql, &values).await {
            Ok(result) if result.rows_affected() == 0 => OperationResult::error(
                operation,
                format!("Row {} not found in {}", id, entity.name),
            ),
            Ok(_) => OperationResult::success(operation, None),
            Err(e) => OperationResult::error(operation, e.to_string()),
        }
    }

    async fn delete(&self, entity: &EntityDef, id: &Value) -> OperationResult {
        let operation = Operation::delete(&entity.name, id.clone());
        let sql = format!(
            "DELETE FROM {} WHERE {} = ?",
            quote(&entity.name),
            quote(&entity.primary_key)
        );

        match self.execute(&sql, std::slice::from_ref(id)).await {
            Ok(result) if result.rows_affected() == 0 => OperationResult::error(
                operation,
                format!("Row {} not found in {}", id, entity.name),
            ),
            Ok(_) => OperationResult::success(operation, None),
            Err(e) => OperationResult::error(operation, e.to_string()),
        }
    }

    async fn start_transaction(&self) -> Result<()> {
        let mut guard = self.tx.lock().await;
        if guard.is_some() {
            anyhow::bail!("A transaction is already active");
        }
        let tx = self.pool.begin().await.context("Failed to begin transaction")?;
        *guard = Some(tx);
        Ok(())
    }

    async fn commit_transaction(&self) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .await
            .take()
            .context("No active transaction to commit")?;
        tx.commit().await.context("Failed to commit transaction")
    }

    async fn rollback_transaction(&self) -> Result<()> {
        let tx = self
            .tx
            .lock()
            .await
            .take()
            .context("No active transaction to roll back")?;
        tx.rollback().await.context("Failed to roll back transaction")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    async fn storage() -> SqliteStorage {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect("sqlite::memory:")
            .await
            .unwrap();
        let storage = SqliteStorage::new(pool);
        let schema = Schema::new(vec![
            EntityDef::new("links").with_columns(["POST_ID", "VALUE"]),
        ])
        .unwrap();
        storage.ensure_schema(&schema).await.unwrap();
        storage
    }

    fn links() -> EntityDef {
        EntityDef::new("links").with_columns(["POST_ID", "VALUE"])
    }

    fn row(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[test]
    fn test_canonical_integer() {
        assert_eq!(canonical_integer("12"), Some(12));
        assert_eq!(canonical_integer("-3"), Some(-3));
        assert_eq!(canonical_integer("0"), Some(0));
        assert_eq!(canonical_integer("007"), None);
        assert_eq!(canonical_integer("1.5"), None);
        assert_eq!(canonical_integer(""), None);
        assert_eq!(canonical_integer("-"), None);
    }

    #[test]
    fn test_quote_escapes() {
        assert_eq!(quote("links"), "\"links\"");
        assert_eq!(quote("a\"b"), "\"a\"\"b\"");
    }

    #[tokio::test]
    async fn test_crud_round_trip() {
        let storage = storage().await;
        let entity = links();

        let created = storage
            .add(&entity, &row(json!({"POST_ID": "12", "VALUE": "x.com"})))
            .await;
        assert!(created.is_success(), "{:?}", created.error);
        assert_eq!(created.data, Some(json!(1)));

        let updated = storage
            .update(&entity, &json!("1"), &row(json!({"VALUE": "y.com"})))
            .await;
        assert!(updated.is_success());

        let query = ListQuery::new().filter("POST_ID", 12);
        let rows = storage.get_list(&entity, &query).await.unwrap();
        assert_eq!(rows, vec![row(json!({"ID": 1, "POST_ID": 12, "VALUE": "y.com"}))]);

        assert!(storage.delete(&entity, &json!(1)).await.is_success());
        assert!(storage.delete(&entity, &json!(1)).await.is_error());
        assert!(storage.update(&entity, &json!(1), &Record::new()).await.is_error());
    }

    #[tokio::test]
    async fn test_rollback_discards_writes() {
        let storage = storage().await;
        let entity = links();

        storage.start_transaction().await.unwrap();
        assert!(storage.start_transaction().await.is_err());
        storage.add(&entity, &row(json!({"VALUE": "x.com"}))).await;
        let inside = storage.get_list(&entity, &ListQuery::new()).await.unwrap();
        assert_eq!(inside.len(), 1);
        storage.rollback_transaction().await.unwrap();

        let after = storage.get_list(&entity, &ListQuery::new()).await.unwrap();
        assert!(after.is_empty());
        assert!(storage.commit_transaction().await.is_err());
    }

    #[tokio::test]
    async fn test_unknown_fields_fail() {
        let storage = storage().await;

        let result = storage.add(&links(), &row(json!({"COLOR": "red"}))).await;

        assert!(result.is_error());
        assert!(
            storage
                .get_list(&links(), &ListQuery::new().filter("COLOR", "red"))
                .await
                .is_err()
        );
    }
}
