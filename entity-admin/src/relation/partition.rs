//! Payload partitioning
//!
//! Splits a flat submitted record into the parent's own fields and the
//! child row lists submitted under relation names.

use serde_json::Value;
use std::collections::BTreeMap;

use crate::error::{EntityError, Result};
use crate::record::{Record, describe};

/// Child rows submitted per relation name
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RelatedData {
    rows: BTreeMap<String, Vec<Record>>,
}

impl RelatedData {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rows submitted for a relation, if any
    pub fn get(&self, relation: &str) -> Option<&[Record]> {
        self.rows.get(relation).map(|rows| rows.as_slice())
    }

    pub fn insert(&mut self, relation: impl Into<String>, rows: Vec<Record>) {
        self.rows.insert(relation.into(), rows);
    }

    pub fn contains(&self, relation: &str) -> bool {
        self.rows.contains_key(relation)
    }

    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.rows.keys().map(|name| name.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn clear(&mut self) {
        self.rows.clear();
    }

    /// Put the rows back under their relation keys
    pub fn merge_into(&self, record: &mut Record) {
        for (relation, rows) in &self.rows {
            let list = rows.iter().cloned().map(Value::Object).collect();
            record.insert(relation.clone(), Value::Array(list));
        }
    }
}

/// Move every relation entry of `record` into a [`RelatedData`]
///
/// Validation runs over all relation keys before anything is removed, so a
/// malformed payload is left untouched.
pub fn partition<'a, I>(relation_names: I, record: &mut Record) -> Result<RelatedData>
where
    I: IntoIterator<Item = &'a str>,
{
    let names: Vec<&str> = relation_names
        .into_iter()
        .filter(|name| record.contains_key(*name))
        .collect();

    for name in &names {
        validate_rows(name, &record[*name])?;
    }

    let mut related = RelatedData::new();
    for name in names {
        let Some(Value::Array(items)) = record.remove(name) else {
            continue;
        };
        let rows = items
            .into_iter()
            .filter_map(|item| match item {
                Value::Object(row) => Some(row),
                _ => None,
            })
            .collect();
        related.insert(name, rows);
    }

    Ok(related)
}

fn validate_rows(relation: &str, value: &Value) -> Result<()> {
    let Value::Array(items) = value else {
        return Err(EntityError::InvalidRelationData {
            relation: relation.to_string(),
            found: describe(value).to_string(),
        });
    };

    if let Some(bad) = items.iter().find(|item| !item.is_object()) {
        return Err(EntityError::InvalidRelationData {
            relation: relation.to_string(),
            found: format!("a list containing {}", describe(bad)),
        });
    }

    Ok(())
}
