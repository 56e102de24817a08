//! Declarative schema files
//!
//! ```toml
//! [[entities]]
//! name = "posts"
//! columns = ["TITLE"]
//! interface = ["TITLE", "LINKS"]
//!
//! [[entities.relations]]
//! name = "LINKS"
//! target = "links"
//! conditions = [
//!     { left = "=this.ID", right = "ref.POST_ID" },
//!     { left = "ref.KIND", right = { expr = "'LINK'" } },
//! ]
//! ```

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

use super::condition::{ConditionDecl, JoinCondition};
use super::entity::{DEFAULT_PRIMARY_KEY, EntityDef, Relation};
use super::Schema;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SchemaFile {
    #[serde(default)]
    pub entities: Vec<EntityDecl>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDecl {
    pub name: String,
    #[serde(default = "default_primary_key")]
    pub primary_key: String,
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub relations: Vec<RelationDecl>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interface: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RelationDecl {
    pub name: String,
    pub target: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value_field: Option<String>,
    #[serde(default)]
    pub conditions: Vec<ConditionDecl>,
}

fn default_primary_key() -> String {
    DEFAULT_PRIMARY_KEY.to_string()
}

impl RelationDecl {
    pub fn to_relation(&self) -> Relation {
        let conditions = self.conditions.iter().map(JoinCondition::from_decl).collect();
        let relation = Relation::new(&self.name, &self.target, conditions);
        match &self.value_field {
            Some(field) => relation.with_value_field(field),
            None => relation,
        }
    }
}

impl EntityDecl {
    pub fn to_entity(&self) -> EntityDef {
        let mut entity = EntityDef::new(&self.name)
            .with_primary_key(&self.primary_key)
            .with_columns(self.columns.iter().cloned());
        for relation in &self.relations {
            entity = entity.with_relation(relation.to_relation());
        }
        if let Some(fields) = &self.interface {
            entity = entity.with_interface(fields.iter().cloned());
        }
        entity
    }
}

impl SchemaFile {
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse schema file")
    }

    pub fn into_schema(self) -> Result<Schema> {
        let entities = self.entities.iter().map(EntityDecl::to_entity).collect();
        Ok(Schema::new(entities)?)
    }
}

/// Load and verify a schema from a TOML file
pub fn load_schema(path: &Path) -> Result<Schema> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read schema file: {}", path.display()))?;
    let schema = SchemaFile::parse(&content)?
        .into_schema()
        .with_context(|| format!("Invalid schema in {}", path.display()))?;

    log::debug!(
        "Loaded schema from {} ({} entities)",
        path.display(),
        schema.entities().count()
    );
    Ok(schema)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relation::ColumnSource;
    use serde_json::json;

    const BLOG: &str = r#"
        [[entities]]
        name = "posts"
        columns = ["TITLE"]
        interface = ["TITLE", "LINKS"]

        [[entities.relations]]
        name = "LINKS"
        target = "links"
        value_field = "URL"
        conditions = [
            { left = "=this.ID", right = "ref.POST_ID" },
            { left = "ref.KIND", right = { expr = "'LINK'" } },
            { left = "ref.ID", right = "ref.ID" },
        ]

        [[entities.relations]]
        name = "AUDIT"
        target = "audit"
        conditions = [{ left = "=this.ID", right = "ref.POST_ID" }]

        [[entities]]
        name = "links"
        columns = ["POST_ID", "KIND", "URL"]

        [[entities]]
        name = "audit"
        primary_key = "AUDIT_ID"
        columns = ["POST_ID", "MESSAGE"]
    "#;

    #[test]
    fn test_parse_schema_file() {
        let schema = SchemaFile::parse(BLOG).unwrap().into_schema().unwrap();

        let posts = schema.entity("posts").unwrap();
        assert_eq!(posts.primary_key, "ID");
        assert_eq!(
            posts.interface.as_deref(),
            Some(&["TITLE".to_string(), "LINKS".to_string()][..])
        );

        let links = posts.relation("LINKS").unwrap();
        assert_eq!(links.value_field_or("VALUE"), "URL");
        assert_eq!(links.columns().len(), 2);
        assert_eq!(
            links.columns().get("KIND"),
            Some(&ColumnSource::Constant(json!("LINK")))
        );
        assert_eq!(links.dropped_conditions().len(), 1);

        assert_eq!(schema.entity("audit").unwrap().primary_key, "AUDIT_ID");
    }

    #[test]
    fn test_unknown_target_is_rejected() {
        let content = r#"
            [[entities]]
            name = "posts"

            [[entities.relations]]
            name = "LINKS"
            target = "missing"
        "#;

        let err = SchemaFile::parse(content).unwrap().into_schema().unwrap_err();
        assert!(format!("{err:#}").contains("missing"));
    }
}
