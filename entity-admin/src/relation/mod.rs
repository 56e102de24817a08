//! Relation handling shared by the save/delete managers
//!
//! - [`columns`]: resolves join conditions into child column assignments
//! - [`partition`]: splits submitted payloads into own fields and child rows

pub mod columns;
pub mod partition;

pub use columns::{ColumnMap, ColumnSource, ResolvedColumns, apply_columns, resolve_columns};
pub use partition::{RelatedData, partition};
