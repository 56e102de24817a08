//! Transactional save/delete of entities together with their relation data
//!
//! A parent row is written together with the child rows submitted under its
//! relation names. Child rows are reconciled against what is stored: new
//! rows are created, changed rows updated and rows that were not submitted
//! again are deleted, all inside one storage transaction.

pub mod cli;
pub mod config;
pub mod context;
pub mod error;
pub mod manager;
pub mod record;
pub mod relation;
pub mod schema;
pub mod storage;

pub use config::Settings;
pub use context::RequestContext;
pub use error::{EntityError, Result};
pub use manager::{EntityManager, Notes, ReconcileResult, RelativeDataManager};
pub use record::Record;
pub use schema::{EntityDef, JoinCondition, Relation, Schema};
pub use storage::{MemoryStorage, SqliteStorage, Storage};
