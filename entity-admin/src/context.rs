//! Per-request context handed to the managers
//!
//! Carries what the surrounding admin page knows about the request: which
//! fields its interface declares, and which designated value field new
//! child rows are checked against.

use std::collections::HashSet;

use crate::config::ReconcileConfig;
use crate::schema::EntityDef;

#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Fields declared by the edit interface (own fields and relation names)
    interface_fields: HashSet<String>,
    /// Value field used when a relation does not name its own
    pub value_field: String,
}

impl RequestContext {
    pub fn new<I, S>(interface_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            interface_fields: interface_fields.into_iter().map(Into::into).collect(),
            value_field: ReconcileConfig::default().value_field,
        }
    }

    /// Context declaring whatever the entity's schema entry declares
    ///
    /// Without an `interface` list every relation counts as declared.
    pub fn for_entity(entity: &EntityDef) -> Self {
        match &entity.interface {
            Some(fields) => Self::new(fields.iter().cloned()),
            None => Self::new(
                entity
                    .all_columns()
                    .into_iter()
                    .chain(entity.relation_names())
                    .map(str::to_string)
                    .collect::<Vec<_>>(),
            ),
        }
    }

    pub fn with_value_field(mut self, field: impl Into<String>) -> Self {
        self.value_field = field.into();
        self
    }

    pub fn with_settings(mut self, settings: &ReconcileConfig) -> Self {
        self.value_field = settings.value_field.clone();
        self
    }

    /// Check whether the interface declares a field
    pub fn declares(&self, field: &str) -> bool {
        self.interface_fields.contains(field)
    }
}
