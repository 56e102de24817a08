//! Entity metadata
//!
//! The schema is what the managers know about storage: each entity's primary
//! key, own columns, and relations to child entities with typed join
//! conditions.

pub mod condition;
pub mod entity;
pub mod file;

pub use condition::{ConditionDecl, ExprDecl, JoinCondition, Operand};
pub use entity::{DEFAULT_PRIMARY_KEY, EntityDef, Relation};
pub use file::{SchemaFile, load_schema};

use std::collections::HashSet;

use crate::error::{EntityError, Result};

/// Registry of entity definitions
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Schema {
    entities: Vec<EntityDef>,
}

impl Schema {
    /// Build a schema, verifying keys, names and relation targets
    pub fn new(entities: Vec<EntityDef>) -> Result<Self> {
        let mut names = HashSet::new();
        for entity in &entities {
            if entity.name.trim().is_empty() {
                return Err(EntityError::InvalidSchema("entity with empty name".to_string()));
            }
            if entity.primary_key.trim().is_empty() {
                return Err(EntityError::InvalidSchema(format!(
                    "entity '{}' has an empty primary key",
                    entity.name
                )));
            }
            if !names.insert(entity.name.as_str()) {
                return Err(EntityError::InvalidSchema(format!(
                    "entity '{}' is declared twice",
                    entity.name
                )));
            }
        }

        for entity in &entities {
            for relation in &entity.relations {
                if !names.contains(relation.target.as_str()) {
                    return Err(EntityError::InvalidSchema(format!(
                        "relation '{}' of entity '{}' targets unknown entity '{}'",
                        relation.name, entity.name, relation.target
                    )));
                }
                if entity.has_column(&relation.name) {
                    return Err(EntityError::InvalidSchema(format!(
                        "relation '{}' of entity '{}' shadows a column",
                        relation.name, entity.name
                    )));
                }
            }
        }

        Ok(Self { entities })
    }

    pub fn entity(&self, name: &str) -> Option<&EntityDef> {
        self.entities.iter().find(|e| e.name == name)
    }

    /// Look up an entity, failing for unknown names
    pub fn require(&self, name: &str) -> Result<&EntityDef> {
        self.entity(name)
            .ok_or_else(|| EntityError::UnknownEntity(name.to_string()))
    }

    pub fn entities(&self) -> impl Iterator<Item = &EntityDef> {
        self.entities.iter()
    }

    /// Child entity definition of a relation
    pub fn target_of(&self, relation: &Relation) -> Result<&EntityDef> {
        self.require(&relation.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_duplicate_entity_rejected() {
        let err = Schema::new(vec![EntityDef::new("posts"), EntityDef::new("posts")]).unwrap_err();
        assert!(matches!(err, EntityError::InvalidSchema(_)));
    }

    #[test]
    fn test_relation_shadowing_column_rejected() {
        let err = Schema::new(vec![
            EntityDef::new("posts")
                .with_columns(["LINKS"])
                .with_relation(Relation::new("LINKS", "links", vec![])),
            EntityDef::new("links"),
        ])
        .unwrap_err();
        assert!(err.to_string().contains("shadows a column"));
    }

    #[test]
    fn test_require_unknown_entity() {
        let schema = Schema::new(vec![EntityDef::new("posts")]).unwrap();
        assert!(schema.require("posts").is_ok());
        assert!(matches!(
            schema.require("pages"),
            Err(EntityError::UnknownEntity(name)) if name == "pages"
        ));
    }
}
