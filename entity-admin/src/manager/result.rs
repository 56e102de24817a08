//! Reconciliation outcome types

use serde::Serialize;
use serde_json::Value;

use crate::storage::OperationResult;

/// Ordered map of note key → human-readable note
///
/// Keys look like `CREATE_LINKS` or `DELETE_AUDIT`. Only the first note for
/// a key is kept so a failing relation reports once.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Notes {
    entries: Vec<(String, String)>,
}

impl Notes {
    pub fn new() -> Self {
        Self::default()
    }

    /// Note key for an operation type on a relation, e.g. `UPDATE_LINKS`
    pub fn key(operation_type: &str, relation: &str) -> String {
        format!("{}_{}", operation_type.to_uppercase(), relation)
    }

    /// Record a note; returns false when the key already has one
    pub fn add(&mut self, key: impl Into<String>, note: impl Into<String>) -> bool {
        let key = key.into();
        if self.entries.iter().any(|(existing, _)| *existing == key) {
            return false;
        }
        self.entries.push((key, note.into()));
        true
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries
            .iter()
            .find(|(existing, _)| existing == key)
            .map(|(_, note)| note.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Outcome of a save or delete
///
/// `result` is the parent write's result on success, or the result of the
/// write that failed and caused the rollback.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ReconcileResult {
    pub result: OperationResult,
    pub notes: Notes,
}

impl ReconcileResult {
    pub fn is_success(&self) -> bool {
        self.result.is_success()
    }

    /// Key of the row the result refers to
    ///
    /// For a create this is the generated key.
    pub fn id(&self) -> Option<&Value> {
        match self.result.data.as_ref() {
            Some(id) if !id.is_null() => Some(id),
            _ => self.result.operation.id(),
        }
    }

    pub fn error_message(&self) -> Option<&str> {
        self.result.error.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::Record;
    use crate::storage::Operation;
    use serde_json::json;

    #[test]
    fn test_first_note_wins() {
        let mut notes = Notes::new();

        assert!(notes.add(Notes::key("create", "LINKS"), "first"));
        assert!(!notes.add("CREATE_LINKS", "second"));
        assert!(notes.add(Notes::key("delete", "LINKS"), "gone"));

        assert_eq!(notes.get("CREATE_LINKS"), Some("first"));
        assert_eq!(
            notes.iter().map(|(k, _)| k).collect::<Vec<_>>(),
            vec!["CREATE_LINKS", "DELETE_LINKS"]
        );
    }

    #[test]
    fn test_result_id() {
        let created = ReconcileResult {
            result: OperationResult::success(Operation::create("posts", Record::new()), Some(json!(9))),
            notes: Notes::new(),
        };
        assert_eq!(created.id(), Some(&json!(9)));

        let updated = ReconcileResult {
            result: OperationResult::success(Operation::update("posts", 4, Record::new()), None),
            notes: Notes::new(),
        };
        assert_eq!(updated.id(), Some(&json!(4)));
        assert!(updated.error_message().is_none());
    }
}
