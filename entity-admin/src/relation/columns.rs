//! Relation condition resolution
//!
//! Turns a relation's join conditions into the child columns that
//! reconciliation fills in automatically: foreign keys copied from the
//! parent row and discriminator constants.

use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

use crate::record::Record;
use crate::schema::{JoinCondition, Operand};

/// Where a child column's value comes from
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnSource {
    /// Copied from this parent field
    ParentField(String),
    /// Fixed literal
    Constant(Value),
}

impl fmt::Display for ColumnSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnSource::ParentField(field) => write!(f, "parent.{}", field),
            ColumnSource::Constant(value) => write!(f, "{}", value),
        }
    }
}

/// Child column name → value source
pub type ColumnMap = BTreeMap<String, ColumnSource>;

/// Result of resolving a relation's conditions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResolvedColumns {
    pub columns: ColumnMap,
    /// Conditions that could not be expressed as a child column assignment
    pub dropped: Vec<JoinCondition>,
}

/// Resolve join conditions into a child column map
///
/// A condition is kept only when it names a child column and either a
/// parent field or a constant. Constants are only recognised on the right
/// side. When a child column appears twice the later condition wins.
pub fn resolve_columns(conditions: &[JoinCondition]) -> ResolvedColumns {
    let mut resolved = ResolvedColumns::default();

    for condition in conditions {
        let mut child: Option<&str> = None;
        let mut parent: Option<&str> = None;
        let mut constant: Option<&Value> = None;

        for (operand, is_right) in [(&condition.left, false), (&condition.right, true)] {
            match operand {
                Operand::ParentField(name) => parent = Some(name.as_str()),
                Operand::ChildField(name) => child = Some(name.as_str()),
                Operand::Constant(value) if is_right => constant = Some(value),
                Operand::Constant(_) | Operand::Unresolved(_) => {}
            }
        }

        let source = match (parent, constant) {
            (Some(field), _) => Some(ColumnSource::ParentField(field.to_string())),
            (None, Some(value)) => Some(ColumnSource::Constant(value.clone())),
            (None, None) => None,
        };

        match (child, source) {
            (Some(column), Some(source)) => {
                resolved.columns.insert(column.to_string(), source);
            }
            _ => resolved.dropped.push(condition.clone()),
        }
    }

    resolved
}

/// Fill the mapped columns of `row` from the parent values
///
/// Returns the names of parent fields that had no value; their columns are
/// set to null.
pub fn apply_columns(columns: &ColumnMap, parent: &Record, row: &mut Record) -> Vec<String> {
    let mut missing = Vec::new();
    for (column, source) in columns {
        let value = match source {
            ColumnSource::ParentField(field) => match parent.get(field) {
                Some(value) => value.clone(),
                None => {
                    missing.push(field.clone());
                    Value::Null
                }
            },
            ColumnSource::Constant(value) => value.clone(),
        };
        row.insert(column.clone(), value);
    }
    missing
}
