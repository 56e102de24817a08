//! Core Operation types for storage writes

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::record::Record;

/// Represents a single write issued against storage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Operation {
    /// Create a new row
    Create {
        /// Entity name (e.g., "posts", "links")
        entity: String,
        /// Row data
        data: Record,
    },
    /// Update an existing row
    Update {
        /// Entity name
        entity: String,
        /// Primary key of the row
        id: Value,
        /// Updated field data
        data: Record,
    },
    /// Delete a row
    Delete {
        /// Entity name
        entity: String,
        /// Primary key of the row
        id: Value,
    },
}

/// Result of executing an Operation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationResult {
    /// The operation that was executed
    pub operation: Operation,
    /// Whether the operation succeeded
    pub success: bool,
    /// Response data (generated key for creates)
    pub data: Option<Value>,
    /// Error message if operation failed
    pub error: Option<String>,
}

impl Operation {
    /// Create a new Create operation
    pub fn create(entity: impl Into<String>, data: Record) -> Self {
        Self::Create {
            entity: entity.into(),
            data,
        }
    }

    /// Create a new Update operation
    pub fn update(entity: impl Into<String>, id: impl Into<Value>, data: Record) -> Self {
        Self::Update {
            entity: entity.into(),
            id: id.into(),
            data,
        }
    }

    /// Create a new Delete operation
    pub fn delete(entity: impl Into<String>, id: impl Into<Value>) -> Self {
        Self::Delete {
            entity: entity.into(),
            id: id.into(),
        }
    }

    /// Get the entity name for this operation
    pub fn entity(&self) -> &str {
        match self {
            Self::Create { entity, .. } => entity,
            Self::Update { entity, .. } => entity,
            Self::Delete { entity, .. } => entity,
        }
    }

    /// Get the row key, if the operation targets an existing row
    pub fn id(&self) -> Option<&Value> {
        match self {
            Self::Create { .. } => None,
            Self::Update { id, .. } | Self::Delete { id, .. } => Some(id),
        }
    }

    /// Get the operation type as a string
    pub fn operation_type(&self) -> &'static str {
        match self {
            Self::Create { .. } => "create",
            Self::Update { .. } => "update",
            Self::Delete { .. } => "delete",
        }
    }
}

impl OperationResult {
    /// Create a new successful result
    pub fn success(operation: Operation, data: Option<Value>) -> Self {
        Self {
            operation,
            success: true,
            data,
            error: None,
        }
    }

    /// Create a new error result
    pub fn error(operation: Operation, error: impl Into<String>) -> Self {
        Self {
            operation,
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }

    /// Check if this result represents a successful operation
    pub fn is_success(&self) -> bool {
        self.success
    }

    /// Check if this result represents a failed operation
    pub fn is_error(&self) -> bool {
        !self.success
    }

    /// Error text, or a generic message for failures without one
    pub fn error_message(&self) -> &str {
        self.error.as_deref().unwrap_or("Unknown error")
    }

    /// Get the result data, returning an error if the operation failed
    pub fn into_result(self) -> Result<Value, String> {
        if self.success {
            Ok(self.data.unwrap_or(Value::Null))
        } else {
            Err(self.error.unwrap_or_else(|| "Unknown error".to_string()))
        }
    }
}
