//! Error taxonomy for entity save/delete orchestration
//!
//! Ordinary storage write failures are *not* errors: they come back as a
//! failed [`crate::storage::OperationResult`] inside a
//! [`crate::manager::ReconcileResult`]. The variants here cover malformed
//! input, programmer mistakes and infrastructure failures.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum EntityError {
    /// A relation key carried something other than a list of row objects
    #[error("Relation '{relation}' expects a list of rows, got {found}")]
    InvalidRelationData { relation: String, found: String },

    /// The relation has no resolvable join columns and cannot be reconciled
    #[error("Relation '{relation}' of entity '{entity}' has no resolvable join columns")]
    UnsupportedRelation { entity: String, relation: String },

    /// Caller passed arguments that contradict the requested operation
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Unknown entity: {0}")]
    UnknownEntity(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    /// Reading rows or driving the transaction failed
    #[error("Storage error: {0:#}")]
    Storage(#[from] anyhow::Error),
}

impl EntityError {
    /// Whether the error was raised before anything touched storage
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Self::InvalidRelationData { .. }
                | Self::UnsupportedRelation { .. }
                | Self::InvalidArgument(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, EntityError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_classification() {
        let err = EntityError::InvalidRelationData {
            relation: "LINKS".to_string(),
            found: "a string".to_string(),
        };
        assert!(err.is_validation());
        assert_eq!(
            err.to_string(),
            "Relation 'LINKS' expects a list of rows, got a string"
        );

        let err = EntityError::Storage(anyhow::anyhow!("disk full"));
        assert!(!err.is_validation());
        assert_eq!(err.to_string(), "Storage error: disk full");
    }
}
