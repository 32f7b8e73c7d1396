//! Data models shared across the crate.
//!
//! This module re-exports all model types used throughout the application.

pub mod connection;
pub mod metadata;
pub mod page;
pub mod value;

// Re-export commonly used types
pub use connection::{DatabaseType, ExecOutcome};
pub use metadata::{AssociationKind, AssociationSpec, EntityMetadata, FieldDescriptor, SortOrder};
pub use page::Page;
pub use value::{FromSqlValue, RowMap, SqlValue, ValueKind};
