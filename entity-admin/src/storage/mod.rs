//! Storage collaborator
//!
//! The managers never talk to a database directly. They go through
//! [`Storage`], which mirrors what the host ORM offers: list queries with an
//! equality filter, single-row writes that report success or failure, and
//! transaction boundaries on one shared connection.

pub mod memory;
pub mod operation;
pub mod sqlite;

pub use memory::MemoryStorage;
pub use operation::{Operation, OperationResult};
pub use sqlite::SqliteStorage;

use async_trait::async_trait;
use serde_json::Value;

use crate::record::{Record, loosely_equal};
use crate::schema::EntityDef;

/// Row selection for [`Storage::get_list`]
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    /// Columns to return; empty means every column
    pub select: Vec<String>,
    /// Column equalities that all have to hold
    pub filter: Record,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.select = columns.into_iter().map(Into::into).collect();
        self
    }

    pub fn filter(mut self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter.insert(column.into(), value.into());
        self
    }

    /// Check a row against the filter
    ///
    /// A null filter value matches a missing or null column.
    pub fn matches(&self, row: &Record) -> bool {
        self.filter.iter().all(|(column, expected)| match row.get(column) {
            None | Some(Value::Null) => expected.is_null(),
            Some(actual) => !expected.is_null() && loosely_equal(actual, expected),
        })
    }

    /// Keep only the selected columns of a row
    pub fn project(&self, row: &Record) -> Record {
        if self.select.is_empty() {
            return row.clone();
        }
        self.select
            .iter()
            .map(|column| (column.clone(), row.get(column).cloned().unwrap_or(Value::Null)))
            .collect()
    }
}

/// Storage operations used by the managers
///
/// Writes report ordinary failures (constraint violations, missing rows) as
/// failed [`OperationResult`]s; `Err` is reserved for infrastructure
/// problems.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn get_list(&self, entity: &EntityDef, query: &ListQuery) -> anyhow::Result<Vec<Record>>;

    /// Create a row; on success `data` holds the generated key
    async fn add(&self, entity: &EntityDef, data: &Record) -> OperationResult;

    async fn update(&self, entity: &EntityDef, id: &Value, data: &Record) -> OperationResult;

    async fn delete(&self, entity: &EntityDef, id: &Value) -> OperationResult;

    async fn start_transaction(&self) -> anyhow::Result<()>;

    async fn commit_transaction(&self) -> anyhow::Result<()>;

    async fn rollback_transaction(&self) -> anyhow::Result<()>;
}

/// Reject payload fields the entity does not store
pub(crate) fn unknown_columns<'a>(entity: &EntityDef, data: &'a Record) -> Vec<&'a str> {
    data.keys()
        .filter(|key| !entity.has_column(key))
        .map(|key| key.as_str())
        .collect()
}
