//! Turns cached row maps into entity instances.

use crate::dao::Dao;
use crate::entity::Entity;
use crate::error::DaoResult;
use crate::mapping::association::WireMode;
use crate::mapping::converter::ConverterRegistry;
use crate::mapping::resolver::EntityMapping;
use crate::models::RowMap;

/// Build one entity from a row keyed by upper-cased column names.
///
/// Fields whose column is absent from the row keep their default. Eager
/// associations are loaded before returning; lazy ones are only wired when
/// `cascading` is on.
pub(crate) async fn build<E: Entity>(
    dao: &Dao,
    mapping: &EntityMapping<E>,
    row: &RowMap,
    converters: &ConverterRegistry,
    cascading: bool,
) -> DaoResult<E> {
    let metadata = mapping.metadata();
    let mut entity = E::default();

    for field in &metadata.fields {
        if let Some(raw) = row.get(&field.row_key()) {
            let value = converters.apply(raw.clone(), field.declared_type);
            entity.assign(&field.name, value)?;
        }
    }

    for binding in &mapping.associations {
        let mode = match (binding.spec().lazy, cascading) {
            (false, retry_on_access) => WireMode::Eager { retry_on_access },
            (true, true) => WireMode::Deferred,
            (true, false) => continue,
        };
        binding.wire(dao, metadata, &mut entity, mode).await;
    }

    Ok(entity)
}
