//! Relations (tables and views) addressed as `schema.identifier`.

use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};

/// Kind of relation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationType {
    Table,
    View,
}

impl RelationType {
    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Table => "table",
            Self::View => "view",
        }
    }

    /// Classify the `Table Type:` value of `describe formatted` output.
    pub fn from_table_type(table_type: &str) -> Self {
        if table_type.to_uppercase().contains("VIEW") {
            Self::View
        } else {
            Self::Table
        }
    }
}

/// A table or view.
///
/// Impala has no database level and identifiers are never quoted, so a relation
/// always renders as `schema.identifier`.
#[derive(Debug, Clone)]
pub struct Relation {
    /// Schema (Impala database) containing the relation
    pub schema: String,
    /// Table or view name
    pub identifier: String,
    /// Relation type, resolved lazily when not known at listing time
    relation_type: OnceCell<RelationType>,
    /// Free-text table information cached from a previous listing
    pub information: Option<String>,
}

impl Relation {
    /// Create a relation whose type is not known yet.
    pub fn new(schema: impl Into<String>, identifier: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            identifier: identifier.into(),
            relation_type: OnceCell::new(),
            information: None,
        }
    }

    /// Set a known relation type.
    pub fn with_type(self, relation_type: RelationType) -> Self {
        let _ = self.relation_type.set(relation_type);
        self
    }

    /// Attach cached table information.
    pub fn with_information(mut self, information: impl Into<String>) -> Self {
        self.information = Some(information.into());
        self
    }

    /// Relation type, if already known.
    pub fn known_type(&self) -> Option<RelationType> {
        self.relation_type.get().copied()
    }

    /// Relation type, computing it with `resolve` on first access and caching it.
    pub fn relation_type_or_resolve<E>(
        &self,
        resolve: impl FnOnce() -> Result<RelationType, E>,
    ) -> Result<RelationType, E> {
        self.relation_type.get_or_try_init(resolve).copied()
    }

    /// Render as `schema.identifier`.
    pub fn render(&self) -> String {
        format!("{}.{}", self.schema, self.identifier)
    }
}

impl std::fmt::Display for Relation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.schema, self.identifier)
    }
}

impl PartialEq for Relation {
    fn eq(&self, other: &Self) -> bool {
        self.schema == other.schema && self.identifier == other.identifier
    }
}

impl Eq for Relation {}
