//! Typed join conditions
//!
//! Relations are declared with the ORM's textual reference expressions:
//! `=this.<FIELD>` points at a column of the parent row, `ref.<FIELD>` at a
//! column of the child row, and a wrapped expression (`{ expr = "'X'" }`)
//! carries a literal. The text is parsed once, when the relation is
//! declared, into [`Operand`]s.

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

static PARENT_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^=this\.([A-Za-z_][A-Za-z0-9_]*)$").expect("valid regex"));
static CHILD_FIELD: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^ref\.([A-Za-z_][A-Za-z0-9_]*)$").expect("valid regex"));

/// One side of a join condition
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    /// Column of the parent row (`=this.ID`)
    ParentField(String),
    /// Column of the child row (`ref.POST_ID`)
    ChildField(String),
    /// Quoted literal from a constant expression
    Constant(Value),
    /// Anything else (SQL fragments, unknown prefixes)
    Unresolved(String),
}

impl Operand {
    /// Parse a reference expression
    pub fn parse(text: &str) -> Self {
        let trimmed = text.trim();
        if let Some(caps) = PARENT_FIELD.captures(trimmed) {
            return Self::ParentField(caps[1].to_string());
        }
        if let Some(caps) = CHILD_FIELD.captures(trimmed) {
            return Self::ChildField(caps[1].to_string());
        }
        Self::Unresolved(trimmed.to_string())
    }

    /// Interpret the compiled text of a constant expression
    ///
    /// Only a quoted literal is a constant: stripping one layer of matching
    /// quotes has to change the text. An unquoted fragment such as `NOW()`
    /// stays unresolved.
    pub fn from_expression(compiled: &str) -> Self {
        let stripped = strip_quotes(compiled);
        if stripped != compiled {
            Self::Constant(Value::String(stripped.to_string()))
        } else {
            Self::Unresolved(compiled.to_string())
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::ParentField(name) => write!(f, "=this.{}", name),
            Operand::ChildField(name) => write!(f, "ref.{}", name),
            Operand::Constant(value) => write!(f, "const({})", value),
            Operand::Unresolved(text) => write!(f, "{}", text),
        }
    }
}

fn strip_quotes(text: &str) -> &str {
    let bytes = text.as_bytes();
    if bytes.len() >= 2 {
        let (first, last) = (bytes[0], bytes[bytes.len() - 1]);
        if first == last && (first == b'\'' || first == b'"') {
            return &text[1..text.len() - 1];
        }
    }
    text
}

/// A single `left = right` entry of a relation's condition list
#[derive(Debug, Clone, PartialEq)]
pub struct JoinCondition {
    pub left: Operand,
    pub right: Operand,
}

impl JoinCondition {
    pub fn new(left: Operand, right: Operand) -> Self {
        Self { left, right }
    }

    /// `=this.<parent> = ref.<child>`
    pub fn parent(parent_field: impl Into<String>, child_field: impl Into<String>) -> Self {
        Self::new(
            Operand::ParentField(parent_field.into()),
            Operand::ChildField(child_field.into()),
        )
    }

    /// `ref.<child> = '<value>'`
    pub fn constant(child_field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new(
            Operand::ChildField(child_field.into()),
            Operand::Constant(value.into()),
        )
    }

    /// Build from the declarative form used in schema files
    pub fn from_decl(decl: &ConditionDecl) -> Self {
        Self::new(decl.left.to_operand(), decl.right.to_operand())
    }
}

impl fmt::Display for JoinCondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} => {}", self.left, self.right)
    }
}

/// Expression as written in a schema file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ExprDecl {
    /// Reference expression (`=this.ID`, `ref.POST_ID`)
    Reference(String),
    /// Wrapped expression whose text is compiled verbatim (`{ expr = "'LINK'" }`)
    Expression { expr: String },
}

impl ExprDecl {
    pub fn to_operand(&self) -> Operand {
        match self {
            ExprDecl::Reference(text) => Operand::parse(text),
            ExprDecl::Expression { expr } => Operand::from_expression(expr),
        }
    }
}

/// Condition entry as written in a schema file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionDecl {
    pub left: ExprDecl,
    pub right: ExprDecl,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_references() {
        assert_eq!(Operand::parse("=this.ID"), Operand::ParentField("ID".to_string()));
        assert_eq!(
            Operand::parse(" ref.POST_ID "),
            Operand::ChildField("POST_ID".to_string())
        );
        assert_eq!(
            Operand::parse("this.ID"),
            Operand::Unresolved("this.ID".to_string())
        );
        assert_eq!(
            Operand::parse("ref.POST.ID"),
            Operand::Unresolved("ref.POST.ID".to_string())
        );
    }

    #[test]
    fn test_constant_expression_requires_quotes() {
        assert_eq!(Operand::from_expression("'LINK'"), Operand::Constant(json!("LINK")));
        assert_eq!(Operand::from_expression("\"LINK\""), Operand::Constant(json!("LINK")));
        assert_eq!(Operand::from_expression("''"), Operand::Constant(json!("")));
        assert_eq!(
            Operand::from_expression("NOW()"),
            Operand::Unresolved("NOW()".to_string())
        );
        // Mismatched quotes are not a literal
        assert_eq!(
            Operand::from_expression("'LINK\""),
            Operand::Unresolved("'LINK\"".to_string())
        );
    }

    #[test]
    fn test_decl_from_toml() {
        #[derive(Deserialize)]
        struct Wrapper {
            conditions: Vec<ConditionDecl>,
        }

        let parsed: Wrapper = toml::from_str(
            r#"
            conditions = [
                { left = "=this.ID", right = "ref.POST_ID" },
                { left = "ref.KIND", right = { expr = "'LINK'" } },
            ]
            "#,
        )
        .unwrap();

        let conditions: Vec<JoinCondition> =
            parsed.conditions.iter().map(JoinCondition::from_decl).collect();
        assert_eq!(conditions[0], JoinCondition::parent("ID", "POST_ID"));
        assert_eq!(conditions[1], JoinCondition::constant("KIND", "LINK"));
        assert_eq!(conditions[1].to_string(), "ref.KIND => const(\"LINK\")");
    }
}
