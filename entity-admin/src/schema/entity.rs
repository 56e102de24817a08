//! Entity and relation definitions

use crate::relation::{ColumnMap, ResolvedColumns, resolve_columns};

use super::condition::JoinCondition;

/// Default primary key column name
pub const DEFAULT_PRIMARY_KEY: &str = "ID";

/// A named link from a parent entity to rows of a child entity
#[derive(Debug, Clone, PartialEq)]
pub struct Relation {
    /// Relation name, also the payload key its rows are submitted under
    pub name: String,
    /// Child entity name
    pub target: String,
    pub conditions: Vec<JoinCondition>,
    /// Field whose emptiness decides whether a new child row is created
    pub value_field: Option<String>,
    resolved: ResolvedColumns,
}

impl Relation {
    /// Declare a relation, resolving its join conditions once
    pub fn new(
        name: impl Into<String>,
        target: impl Into<String>,
        conditions: Vec<JoinCondition>,
    ) -> Self {
        let name = name.into();
        let resolved = resolve_columns(&conditions);

        for condition in &resolved.dropped {
            log::warn!(
                "Relation '{}': condition `{}` cannot be resolved to a child column and is ignored",
                name,
                condition
            );
        }

        Self {
            name,
            target: target.into(),
            conditions,
            value_field: None,
            resolved,
        }
    }

    pub fn with_value_field(mut self, field: impl Into<String>) -> Self {
        self.value_field = Some(field.into());
        self
    }

    /// Child columns filled in from the parent row or constants
    pub fn columns(&self) -> &ColumnMap {
        &self.resolved.columns
    }

    pub fn dropped_conditions(&self) -> &[JoinCondition] {
        &self.resolved.dropped
    }

    /// A relation without resolvable columns cannot scope its child rows
    pub fn is_reconcilable(&self) -> bool {
        !self.resolved.columns.is_empty()
    }

    /// The value field, falling back to the configured default
    pub fn value_field_or<'a>(&'a self, default: &'a str) -> &'a str {
        self.value_field.as_deref().unwrap_or(default)
    }
}

/// Storage collection metadata: key, own columns and relations
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDef {
    pub name: String,
    pub primary_key: String,
    /// Own scalar columns, primary key excluded
    pub columns: Vec<String>,
    pub relations: Vec<Relation>,
    /// Fields the admin interface declares for this entity
    pub interface: Option<Vec<String>>,
}

impl EntityDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            primary_key: DEFAULT_PRIMARY_KEY.to_string(),
            columns: Vec::new(),
            relations: Vec::new(),
            interface: None,
        }
    }

    pub fn with_primary_key(mut self, primary_key: impl Into<String>) -> Self {
        self.primary_key = primary_key.into();
        self
    }

    pub fn with_columns<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn with_relation(mut self, relation: Relation) -> Self {
        self.relations.push(relation);
        self
    }

    pub fn with_interface<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.interface = Some(fields.into_iter().map(Into::into).collect());
        self
    }

    pub fn relation(&self, name: &str) -> Option<&Relation> {
        self.relations.iter().find(|r| r.name == name)
    }

    pub fn relation_names(&self) -> impl Iterator<Item = &str> {
        self.relations.iter().map(|r| r.name.as_str())
    }

    /// Check whether a field is a stored column (primary key included)
    pub fn has_column(&self, name: &str) -> bool {
        name == self.primary_key || self.columns.iter().any(|c| c == name)
    }

    /// Primary key followed by the own columns
    pub fn all_columns(&self) -> Vec<&str> {
        std::iter::once(self.primary_key.as_str())
            .chain(self.columns.iter().map(|c| c.as_str()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::Operand;

    #[test]
    fn test_relation_resolves_on_declaration() {
        let relation = Relation::new(
            "LINKS",
            "links",
            vec![
                JoinCondition::parent("ID", "POST_ID"),
                JoinCondition::new(Operand::parse("ref.ID"), Operand::parse("ref.ID")),
            ],
        );

        assert!(relation.is_reconcilable());
        assert_eq!(relation.columns().len(), 1);
        assert_eq!(relation.dropped_conditions().len(), 1);
        assert_eq!(relation.value_field_or("VALUE"), "VALUE");
        assert_eq!(
            relation.with_value_field("URL").value_field_or("VALUE"),
            "URL"
        );
    }

    #[test]
    fn test_entity_columns() {
        let entity = EntityDef::new("posts")
            .with_columns(["TITLE", "BODY"])
            .with_relation(Relation::new("LINKS", "links", vec![]));

        assert!(entity.has_column("ID"));
        assert!(entity.has_column("TITLE"));
        assert!(!entity.has_column("LINKS"));
        assert_eq!(entity.all_columns(), vec!["ID", "TITLE", "BODY"]);
        assert_eq!(entity.relation_names().collect::<Vec<_>>(), vec!["LINKS"]);
        assert!(!entity.relation("LINKS").unwrap().is_reconcilable());
    }
}
