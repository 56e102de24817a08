//! Child row matching and diffing
//!
//! This module handles:
//! - Indexing the stored child rows of a relation by key
//! - Deciding whether a submitted child row is created, updated or left alone
//! - Diffing fields of a keyed row against its stored version

use serde_json::Value;
use std::collections::BTreeMap;

use crate::record::{Record, field_is_empty, key_text, loosely_equal};

/// Stored child rows keyed by the canonical text of their primary key
pub type StaleRows = BTreeMap<String, Record>;

/// What to do with one submitted child row
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChildMode {
    /// No key and a filled-in value field
    Create,
    /// Keyed row with at least one changed field
    Update,
    /// Keyed row identical to the stored one on every compared field
    Unchanged,
    /// Nothing to write
    Skip,
}

/// Result of matching a single submitted child row
#[derive(Debug, Clone, PartialEq)]
pub struct ChildMatch {
    pub mode: ChildMode,
    /// Key of the row, if it was submitted with one
    pub key: Option<String>,
    /// Fields that differ from the stored row
    pub changed: Vec<String>,
}

impl ChildMatch {
    fn new(mode: ChildMode, key: Option<String>) -> Self {
        Self {
            mode,
            key,
            changed: Vec::new(),
        }
    }

    /// Keyed rows are always kept, whatever their mode
    pub fn keeps_existing(&self) -> bool {
        self.key.is_some()
    }
}

/// Index stored rows by primary key; rows without a usable key are dropped
pub fn index_rows(rows: Vec<Record>, primary_key: &str) -> StaleRows {
    rows.into_iter()
        .filter_map(|row| {
            let key = row.get(primary_key).and_then(key_text)?;
            Some((key, row))
        })
        .collect()
}

/// Match a submitted child row against the stored rows
pub fn match_child(
    row: &Record,
    stale: &StaleRows,
    primary_key: &str,
    value_field: &str,
) -> ChildMatch {
    let value_empty = field_is_empty(row, value_field);

    let Some(key) = row.get(primary_key).and_then(key_text) else {
        if value_empty {
            log::debug!("New row has empty '{}', mode=Skip", value_field);
            return ChildMatch::new(ChildMode::Skip, None);
        }
        log::debug!("New row, mode=Create");
        return ChildMatch::new(ChildMode::Create, None);
    };

    if value_empty {
        // Kept as is: neither written nor deleted
        log::debug!("Row {}: empty '{}', mode=Skip", key, value_field);
        return ChildMatch::new(ChildMode::Skip, Some(key));
    }

    match stale.get(&key) {
        None => {
            // Not a row of this parent: nothing to compare, never written
            log::warn!("Row {}: no stored row with this key, mode=Unchanged", key);
            ChildMatch::new(ChildMode::Unchanged, Some(key))
        }
        Some(existing) => {
            let changed = diff_fields(row, existing);
            let mode = if changed.is_empty() {
                log::debug!("Row {}: No changes detected, mode=Unchanged", key);
                ChildMode::Unchanged
            } else {
                log::debug!("Row {}: Changes detected in {:?}, mode=Update", key, changed);
                ChildMode::Update
            };
            ChildMatch {
                mode,
                key: Some(key),
                changed,
            }
        }
    }
}

/// Fields present in both rows whose values differ
///
/// Fields missing from either side are not differences.
pub fn diff_fields(submitted: &Record, existing: &Record) -> Vec<String> {
    submitted
        .iter()
        .filter_map(|(field, new_value)| {
            let old_value: &Value = existing.get(field)?;
            if loosely_equal(old_value, new_value) {
                None
            } else {
                log::debug!("Field '{}' changed: {} -> {}", field, old_value, new_value);
                Some(field.clone())
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Record {
        value.as_object().unwrap().clone()
    }

    fn stale() -> StaleRows {
        index_rows(
            vec![
                row(json!({"ID": 1, "POST_ID": 12, "VALUE": "x.com"})),
                row(json!({"ID": 2, "POST_ID": 12, "VALUE": "y.com"})),
                row(json!({"POST_ID": 12, "VALUE": "no key"})),
            ],
            "ID",
        )
    }

    #[test]
    fn test_index_rows_by_key_text() {
        let stale = stale();
        assert_eq!(stale.keys().collect::<Vec<_>>(), vec!["1", "2"]);
    }

    #[test]
    fn test_new_rows() {
        let created = match_child(&row(json!({"VALUE": "z.com"})), &stale(), "ID", "VALUE");
        assert_eq!(created.mode, ChildMode::Create);
        assert!(!created.keeps_existing());

        let skipped = match_child(&row(json!({"VALUE": ""})), &stale(), "ID", "VALUE");
        assert_eq!(skipped.mode, ChildMode::Skip);
        assert!(skipped.key.is_none());

        let empty_key = match_child(&row(json!({"ID": "", "VALUE": "z"})), &stale(), "ID", "VALUE");
        assert_eq!(empty_key.mode, ChildMode::Create);
    }

    #[test]
    fn test_unchanged_row_with_string_key() {
        let matched = match_child(
            &row(json!({"ID": "1", "POST_ID": "12", "VALUE": "x.com"})),
            &stale(),
            "ID",
            "VALUE",
        );

        assert_eq!(matched.mode, ChildMode::Unchanged);
        assert_eq!(matched.key.as_deref(), Some("1"));
    }

    #[test]
    fn test_changed_row() {
        let matched = match_child(&row(json!({"ID": 2, "VALUE": "w.com"})), &stale(), "ID", "VALUE");

        assert_eq!(matched.mode, ChildMode::Update);
        assert_eq!(matched.changed, vec!["VALUE".to_string()]);
    }

    #[test]
    fn test_keyed_row_with_empty_value_is_kept() {
        let matched = match_child(&row(json!({"ID": 2, "VALUE": ""})), &stale(), "ID", "VALUE");

        assert_eq!(matched.mode, ChildMode::Skip);
        assert!(matched.keeps_existing());
    }

    #[test]
    fn test_unknown_key_is_left_alone() {
        let matched = match_child(&row(json!({"ID": 40, "VALUE": "q"})), &stale(), "ID", "VALUE");

        assert_eq!(matched.mode, ChildMode::Unchanged);
        assert_eq!(matched.key.as_deref(), Some("40"));
        assert!(matched.changed.is_empty());
    }

    #[test]
    fn test_diff_ignores_fields_missing_on_either_side() {
        let existing = row(json!({"ID": 1, "VALUE": "x", "NOTE": "kept"}));
        let submitted = row(json!({"ID": 1, "VALUE": "x", "EXTRA": "new"}));

        assert!(diff_fields(&submitted, &existing).is_empty());
    }
}
