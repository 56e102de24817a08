//! Save/delete orchestration for a parent row and its relations
//!
//! [`EntityManager`] writes the parent row and reconciles the submitted child
//! rows of each relation against the stored ones: new rows are created,
//! changed rows updated, and rows that were not resubmitted deleted.
//! [`RelativeDataManager`] does the same for the relation data alone.

pub mod diff;
pub mod entity_manager;
pub mod relative;
pub mod result;

pub use diff::{ChildMatch, ChildMode, StaleRows, diff_fields, index_rows, match_child};
pub use entity_manager::EntityManager;
pub use relative::RelativeDataManager;
pub use result::{Notes, ReconcileResult};
