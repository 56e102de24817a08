//! In-process storage backend
//!
//! Tables live in memory with auto-increment integer keys. Transactions
//! snapshot every table on start and restore the snapshot on rollback.
//! Every write call is appended to an operations log, which survives
//! rollbacks, so callers can see what was attempted.

use async_trait::async_trait;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};

use super::{ListQuery, Operation, OperationResult, Storage, unknown_columns};
use crate::record::{Record, key_text, loosely_equal};
use crate::schema::EntityDef;

#[derive(Debug, Clone, Default)]
struct Table {
    next_id: i64,
    rows: BTreeMap<i64, Record>,
}

/// Writes carrying `column = value` on `entity` fail like a constraint violation
///
/// Deletes are matched against the stored row.
#[derive(Debug, Clone)]
struct RejectRule {
    entity: String,
    column: String,
    value: Value,
}

#[derive(Debug, Default)]
struct MemoryState {
    tables: HashMap<String, Table>,
    snapshots: Vec<HashMap<String, Table>>,
    log: Vec<Operation>,
    rules: Vec<RejectRule>,
    fail_commit: bool,
}

impl MemoryState {
    fn table(&mut self, entity: &str) -> &mut Table {
        self.tables.entry(entity.to_string()).or_default()
    }

    fn violated_rule(&self, entity: &str, data: &Record) -> Option<&RejectRule> {
        self.rules.iter().find(|rule| {
            rule.entity == entity
                && data
                    .get(&rule.column)
                    .map(|value| loosely_equal(value, &rule.value))
                    .unwrap_or(false)
        })
    }
}

#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: Mutex<MemoryState>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MemoryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Insert a row directly, bypassing rules and the operations log
    ///
    /// Returns the row's key.
    pub fn insert_row(&self, entity: &EntityDef, mut row: Record) -> i64 {
        let mut state = self.state();
        let table = state.table(&entity.name);
        let id = row
            .get(&entity.primary_key)
            .and_then(parse_id)
            .unwrap_or(table.next_id + 1);
        table.next_id = table.next_id.max(id);
        row.insert(entity.primary_key.clone(), Value::from(id));
        table.rows.insert(id, row);
        id
    }

    /// All rows of an entity in key order
    pub fn rows(&self, entity: &str) -> Vec<Record> {
        self.state()
            .tables
            .get(entity)
            .map(|table| table.rows.values().cloned().collect())
            .unwrap_or_default()
    }

    /// Every write issued so far, failed ones included
    pub fn operations(&self) -> Vec<Operation> {
        self.state().log.clone()
    }

    pub fn clear_operations(&self) {
        self.state().log.clear();
    }

    /// Make writes to `entity` carrying `column = value` fail, and deletes of
    /// stored rows holding it
    pub fn reject_value(&self, entity: &str, column: &str, value: impl Into<Value>) {
        self.state().rules.push(RejectRule {
            entity: entity.to_string(),
            column: column.to_string(),
            value: value.into(),
        });
    }

    /// Make the next commit fail; its changes are discarded
    pub fn fail_next_commit(&self) {
        self.state().fail_commit = true;
    }

    pub fn in_transaction(&self) -> bool {
        !self.state().snapshots.is_empty()
    }
}

fn parse_id(value: &Value) -> Option<i64> {
    key_text(value).and_then(|text| text.parse().ok())
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn get_list(&self, entity: &EntityDef, query: &ListQuery) -> anyhow::Result<Vec<Record>> {
        if let Some(column) = query
            .select
            .iter()
            .chain(query.filter.keys())
            .find(|column| !entity.has_column(column))
        {
            anyhow::bail!("Unknown column '{}' in entity '{}'", column, entity.name);
        }

        Ok(self
            .state()
            .tables
            .get(&entity.name)
            .map(|table| {
                table
                    .rows
                    .values()
                    .filter(|row| query.matches(row))
                    .map(|row| query.project(row))
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn add(&self, entity: &EntityDef, data: &Record) -> OperationResult {
        let operation = Operation::create(&entity.name, data.clone());
        let mut state = self.state();
        state.log.push(operation.clone());

        let unknown = unknown_columns(entity, data);
        if !unknown.is_empty() {
            return OperationResult::error(
                operation,
                format!("Unknown fields for {}: {}", entity.name, unknown.join(", ")),
            );
        }
        if let Some(rule) = state.violated_rule(&entity.name, data) {
            let message = format!("Constraint violation on {}.{}", rule.entity, rule.column);
            return OperationResult::error(operation, message);
        }

        let requested = data.get(&entity.primary_key).and_then(parse_id);
        let table = state.table(&entity.name);
        let id = match requested {
            Some(id) if table.rows.contains_key(&id) => {
                return OperationResult::error(
                    operation,
                    format!("Duplicate key {} in {}", id, entity.name),
                );
            }
            Some(id) => id,
            None => table.next_id + 1,
        };

        let mut row = data.clone();
        row.insert(entity.primary_key.clone(), Value::from(id));
        table.next_id = table.next_id.max(id);
        table.rows.insert(id, row);

        OperationResult::success(operation, Some(Value::from(id)))
    }

    async fn update(&self, entity: &EntityDef, id: &Value, data: &Record) -> OperationResult {
        let operation = Operation::update(&entity.name, id.clone(), data.clone());
        let mut state = self.state();
        state.log.push(operation.clone());

        let unknown = unknown_columns(entity, data);
        if !unknown.is_empty() {
            return OperationResult::error(
                operation,
                format!("Unknown fields for {}: {}", entity.name, unknown.join(", ")),
            );
        }
        if let Some(rule) = state.violated_rule(&entity.name, data) {
            let message = format!("Constraint violation on {}.{}", rule.entity, rule.column);
            return OperationResult::error(operation, message);
        }

        let Some(key) = parse_id(id) else {
            return OperationResult::error(operation, format!("Invalid key {}", id));
        };
        let table = state.table(&entity.name);
        let Some(row) = table.rows.get_mut(&key) else {
            return OperationResult::error(
                operation,
                format!("Row {} not found in {}", key, entity.name),
            );
        };

        for (field, value) in data {
            if *field != entity.primary_key {
                row.insert(field.clone(), value.clone());
            }
        }

        OperationResult::success(operation, None)
    }

    async fn delete(&self, entity: &EntityDef, id: &Value) -> OperationResult {
        let operation = Operation::delete(&entity.name, id.clone());
        let mut state = self.state();
        state.log.push(operation.clone());

        let found = parse_id(id)
            .and_then(|key| Some((key, state.table(&entity.name).rows.get(&key)?.clone())));
        let Some((key, stored)) = found else {
            return OperationResult::error(
                operation,
                format!("Row {} not found in {}", id, entity.name),
            );
        };

        if let Some(rule) = state.violated_rule(&entity.name, &stored) {
            let message = format!("Constraint violation on {}.{}", rule.entity, rule.column);
            return OperationResult::error(operation, message);
        }

        state.table(&entity.name).rows.remove(&key);
        OperationResult::success(operation, None)
    }

    async fn start_transaction(&self) -> anyhow::Result<()> {
        let mut state = self.state();
        let snapshot = state.tables.clone();
        state.snapshots.push(snapshot);
        Ok(())
    }

    async fn commit_transaction(&self) -> anyhow::Result<()> {
        let mut state = self.state();
        let Some(snapshot) = state.snapshots.pop() else {
            anyhow::bail!("No active transaction to commit");
        };
        if std::mem::take(&mut state.fail_commit) {
            state.tables = snapshot;
            anyhow::bail!("Commit failed");
        }
        Ok(())
    }

    async fn rollback_transaction(&self) -> anyhow::Result<()> {
        let mut state = self.state();
        match state.snapshots.pop() {
            Some(snapshot) => {
                state.tables = snapshot;
                Ok(())
            }
            None => anyhow::bail!("No active transaction to roll back"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn links() -> EntityDef {
        EntityDef::new("links").with_columns(["POST_ID", "VALUE"])
    }

    fn row(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    #[tokio::test]
    async fn test_add_generates_keys() {
        let storage = MemoryStorage::new();
        let entity = links();

        let first = storage.add(&entity, &row(json!({"VALUE": "x"}))).await;
        let second = storage.add(&entity, &row(json!({"VALUE": "y"}))).await;

        assert_eq!(first.data, Some(json!(1)));
        assert_eq!(second.data, Some(json!(2)));
        assert_eq!(storage.rows("links")[1], row(json!({"ID": 2, "VALUE": "y"})));
    }

    #[tokio::test]
    async fn test_unknown_fields_fail() {
        let storage = MemoryStorage::new();

        let result = storage.add(&links(), &row(json!({"COLOR": "red"}))).await;

        assert!(result.is_error());
        assert_eq!(result.error_message(), "Unknown fields for links: COLOR");
        assert!(storage.rows("links").is_empty());
        assert_eq!(storage.operations().len(), 1);
    }

    #[tokio::test]
    async fn test_reject_rule() {
        let storage = MemoryStorage::new();
        storage.reject_value("links", "VALUE", "bad");

        let result = storage.add(&links(), &row(json!({"VALUE": "bad"}))).await;

        assert!(result.is_error());
        assert_eq!(result.error_message(), "Constraint violation on links.VALUE");
    }

    #[tokio::test]
    async fn test_reject_rule_applies_to_stored_row_on_delete() {
        let storage = MemoryStorage::new();
        let entity = links();
        storage.insert_row(&entity, row(json!({"ID": 1, "VALUE": "locked"})));
        storage.insert_row(&entity, row(json!({"ID": 2, "VALUE": "free"})));
        storage.reject_value("links", "VALUE", "locked");

        let rejected = storage.delete(&entity, &json!(1)).await;
        assert!(rejected.is_error());
        assert_eq!(rejected.error_message(), "Constraint violation on links.VALUE");

        assert!(storage.delete(&entity, &json!(2)).await.is_success());
        assert_eq!(storage.rows("links"), vec![row(json!({"ID": 1, "VALUE": "locked"}))]);
    }

    #[tokio::test]
    async fn test_failed_commit_discards_changes() {
        let storage = MemoryStorage::new();
        let entity = links();
        storage.fail_next_commit();

        storage.start_transaction().await.unwrap();
        storage.add(&entity, &row(json!({"VALUE": "x"}))).await;
        assert!(storage.commit_transaction().await.is_err());

        assert!(!storage.in_transaction());
        assert!(storage.rows("links").is_empty());

        storage.start_transaction().await.unwrap();
        storage.add(&entity, &row(json!({"VALUE": "x"}))).await;
        storage.commit_transaction().await.unwrap();
        assert_eq!(storage.rows("links").len(), 1);
    }

    #[tokio::test]
    async fn test_update_and_delete_missing_rows() {
        let storage = MemoryStorage::new();
        let entity = links();
        storage.insert_row(&entity, row(json!({"ID": 5, "VALUE": "x"})));

        let updated = storage.update(&entity, &json!("5"), &row(json!({"VALUE": "z"}))).await;
        assert!(updated.is_success());
        assert_eq!(storage.rows("links")[0]["VALUE"], json!("z"));

        let missing = storage.update(&entity, &json!(6), &Record::new()).await;
        assert!(missing.is_error());

        assert!(storage.delete(&entity, &json!(5)).await.is_success());
        assert!(storage.delete(&entity, &json!(5)).await.is_error());
    }

    #[tokio::test]
    async fn test_rollback_restores_snapshot() {
        let storage = MemoryStorage::new();
        let entity = links();
        storage.insert_row(&entity, row(json!({"VALUE": "kept"})));

        storage.start_transaction().await.unwrap();
        assert!(storage.in_transaction());
        storage.add(&entity, &row(json!({"VALUE": "dropped"}))).await;
        storage.delete(&entity, &json!(1)).await;
        storage.rollback_transaction().await.unwrap();

        assert!(!storage.in_transaction());
        assert_eq!(storage.rows("links"), vec![row(json!({"ID": 1, "VALUE": "kept"}))]);
        assert_eq!(storage.operations().len(), 2);
        assert!(storage.commit_transaction().await.is_err());
    }

    #[tokio::test]
    async fn test_get_list_filters_and_projects() {
        let storage = MemoryStorage::new();
        let entity = links();
        storage.insert_row(&entity, row(json!({"POST_ID": 1, "VALUE": "a"})));
        storage.insert_row(&entity, row(json!({"POST_ID": 2, "VALUE": "b"})));
        storage.insert_row(&entity, row(json!({"POST_ID": 1, "VALUE": "c"})));

        let query = ListQuery::new().select(["ID", "VALUE"]).filter("POST_ID", 1);
        let rows = storage.get_list(&entity, &query).await.unwrap();

        assert_eq!(
            rows,
            vec![row(json!({"ID": 1, "VALUE": "a"})), row(json!({"ID": 3, "VALUE": "c"}))]
        );

        let bad = ListQuery::new().filter("COLOR", "red");
        assert!(storage.get_list(&entity, &bad).await.is_err());
    }
}
