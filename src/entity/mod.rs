//! The entity contract: how a Rust type exposes its fields to the DAO.

pub mod declare;
pub mod lazy;

pub use declare::EntityDecl;
pub use lazy::{Collection, Lazy, Loader, Reference};

use crate::error::DaoResult;
use crate::models::{EntityMetadata, SqlValue};

/// A type mapped to one table.
///
/// `value` and `assign` give the DAO field access by declared field name.
/// Association fields are not reached through them; they are wired through
/// the slot accessors given to [`EntityDecl::many_to_one`] and
/// [`EntityDecl::one_to_many`].
pub trait Entity: Default + Send + Sync + 'static {
    fn declare() -> EntityDecl<Self>;

    /// Current value of a persistable field. Unknown names yield NULL.
    fn value(&self, field: &str) -> SqlValue;

    /// Store a column value into a persistable field.
    fn assign(&mut self, field: &str, value: SqlValue) -> DaoResult<()>;

    /// Store database-generated key values, in primary key order.
    fn write_back_keys(&mut self, metadata: &EntityMetadata, keys: Vec<SqlValue>) -> DaoResult<()> {
        for (field, key) in metadata.primary_keys.iter().zip(keys) {
            self.assign(&field.name, key)?;
        }
        Ok(())
    }
}

/// Read access to field values without knowing the concrete entity type.
pub trait FieldSource {
    fn field_value(&self, field: &str) -> SqlValue;
}

impl<E: Entity> FieldSource for E {
    fn field_value(&self, field: &str) -> SqlValue {
        self.value(field)
    }
}
