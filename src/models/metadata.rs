//! Resolved structural metadata for entity types.

use crate::models::ValueKind;
use serde::{Deserialize, Serialize};

/// Relationship kind carried by an association field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssociationKind {
    ManyToOne,
    OneToMany,
}

/// Sort direction applied to a one-to-many ORDER BY.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        }
    }
}

/// Association details for a relationship field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssociationSpec {
    pub kind: AssociationKind,
    /// Short type name of the related entity
    pub target: String,
    /// ManyToOne: fields on this entity. OneToMany: fields on the child entity.
    pub foreign_keys: Vec<String>,
    /// Extra SQL appended to a one-to-many WHERE clause
    pub condition: Option<String>,
    /// Bare field name or a verbatim ORDER BY fragment
    pub order_by: Option<String>,
    pub sort: SortOrder,
    pub lazy: bool,
}

/// A single declared field after resolution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDescriptor {
    pub name: String,
    pub declared_type: ValueKind,
    pub column: String,
    pub primary_key: bool,
    /// Inserted and read, never part of an UPDATE's SET clause
    pub immutable: bool,
    pub association: Option<AssociationSpec>,
}

impl FieldDescriptor {
    /// Column name as it appears in a cached row map.
    pub fn row_key(&self) -> String {
        self.column.to_uppercase()
    }

    pub fn is_lazy(&self) -> bool {
        self.association.as_ref().is_some_and(|a| a.lazy)
    }
}

/// Table mapping for one entity type. Immutable once resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityMetadata {
    pub type_name: String,
    pub table_name: String,
    pub auto_generate_keys: bool,
    /// In declared key order
    pub primary_keys: Vec<FieldDescriptor>,
    /// In field declaration order, primary keys included
    pub fields: Vec<FieldDescriptor>,
    pub associations: Vec<FieldDescriptor>,
}

impl EntityMetadata {
    pub fn field(&self, name: &str) -> Option<&FieldDescriptor> {
        self.fields.iter().find(|f| f.name == name)
    }

    /// Column for a persistable field name.
    pub fn column_of(&self, name: &str) -> Option<&str> {
        self.field(name).map(|f| f.column.as_str())
    }

    /// Fields that may appear in an UPDATE's SET clause.
    pub fn updatable_fields(&self) -> impl Iterator<Item = &FieldDescriptor> {
        self.fields.iter().filter(|f| !f.primary_key && !f.immutable)
    }

    /// Comma-separated column list in declaration order.
    pub fn column_list(&self) -> String {
        self.fields
            .iter()
            .map(|f| f.column.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// `pk1 = ? AND pk2 = ?` over the primary key columns.
    pub fn key_predicate(&self) -> String {
        self.primary_keys
            .iter()
            .map(|f| format!("{} = ?", f.column))
            .collect::<Vec<_>>()
            .join(" AND ")
    }
}
