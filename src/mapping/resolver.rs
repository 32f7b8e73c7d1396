//! Entity metadata resolution with a process-wide per-type cache.

use crate::entity::declare::{FieldDecl, FieldRole, TableDecl};
use crate::entity::{Entity, EntityDecl};
use crate::error::{DaoError, DaoResult};
use crate::mapping::association::AssociationBinding;
use crate::models::{AssociationKind, EntityMetadata, FieldDescriptor, ValueKind};
use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::sync::{Arc, LazyLock, RwLock};
use tracing::debug;

type MappingCache = RwLock<HashMap<TypeId, Arc<dyn Any + Send + Sync>>>;

static CACHE: LazyLock<MappingCache> = LazyLock::new(|| RwLock::new(HashMap::new()));

/// Resolved metadata plus the association loaders of `E`.
pub struct EntityMapping<E> {
    metadata: EntityMetadata,
    pub(crate) associations: Vec<Box<dyn AssociationBinding<E>>>,
}

impl<E> EntityMapping<E> {
    pub fn metadata(&self) -> &EntityMetadata {
        &self.metadata
    }
}

impl<E> std::fmt::Debug for EntityMapping<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EntityMapping")
            .field("metadata", &self.metadata)
            .finish_non_exhaustive()
    }
}

/// Resolve the mapping of `E`, reusing the cached one when present.
///
/// Failed resolutions are not cached; every call repeats the error.
pub fn resolve<E: Entity>() -> DaoResult<Arc<EntityMapping<E>>> {
    let key = TypeId::of::<E>();
    let cached = CACHE
        .read()
        .unwrap_or_else(|e| e.into_inner())
        .get(&key)
        .cloned();
    if let Some(entry) = cached {
        return entry
            .downcast::<EntityMapping<E>>()
            .map_err(|_| DaoError::internal("Mapping cache holds a foreign type"));
    }

    let mapping = Arc::new(build_mapping(E::declare())?);
    debug!(
        entity = %mapping.metadata.type_name,
        table = %mapping.metadata.table_name,
        fields = mapping.metadata.fields.len(),
        "Resolved entity metadata"
    );

    let mut cache = CACHE.write().unwrap_or_else(|e| e.into_inner());
    // Two racing resolvers produce equal mappings; keep the first.
    let entry = cache
        .entry(key)
        .or_insert_with(|| mapping.clone() as Arc<dyn Any + Send + Sync>)
        .clone();
    drop(cache);
    entry
        .downcast::<EntityMapping<E>>()
        .map_err(|_| DaoError::internal("Mapping cache holds a foreign type"))
}

/// Shortcut for the resolved metadata of `E`.
pub fn metadata_of<E: Entity>() -> DaoResult<EntityMetadata> {
    Ok(resolve::<E>()?.metadata.clone())
}

fn build_mapping<E: Entity>(decl: EntityDecl<E>) -> DaoResult<EntityMapping<E>> {
    let entity = decl.type_name.clone();
    if let Some(problem) = decl.errors.first() {
        return Err(DaoError::mapping(&entity, problem.clone()));
    }

    let EntityDecl {
        table,
        auto_generate_keys,
        fields,
        associations,
        parent,
        ..
    } = decl;

    // One level only: a table-less entity takes its supertype's table and
    // fields; an entity with a table appends the supertype's fields.
    let (table, auto_generate_keys, fields, associations) = match (table, parent) {
        (Some(table), None) => (table, auto_generate_keys, fields, associations),
        (Some(table), Some(parent)) => {
            let parent = *parent;
            if let Some(problem) = parent.errors.first() {
                return Err(DaoError::mapping(&parent.type_name, problem.clone()));
            }
            let mut fields = fields;
            for field in parent.fields {
                if !fields.iter().any(|f| f.name == field.name) {
                    fields.push(field);
                }
            }
            let mut associations = associations;
            associations.extend(parent.associations);
            (table, auto_generate_keys, fields, associations)
        }
        (None, Some(parent)) => {
            let parent = *parent;
            if let Some(problem) = parent.errors.first() {
                return Err(DaoError::mapping(&parent.type_name, problem.clone()));
            }
            match parent.table {
                Some(table) => (table, parent.auto_generate_keys, parent.fields, parent.associations),
                None => {
                    return Err(DaoError::mapping(
                        &entity,
                        format!("no table declared on {} or its supertype {}", entity, parent.type_name),
                    ));
                }
            }
        }
        (None, None) => {
            return Err(DaoError::mapping(&entity, "no table declared"));
        }
    };

    let TableDecl { name: table_name, primary_keys } = table;
    if primary_keys.is_empty() {
        return Err(DaoError::mapping(&entity, "no primary key declared"));
    }

    let persistable: Vec<FieldDescriptor> = fields
        .iter()
        .filter(|f| f.role == FieldRole::Persistent)
        .map(|f| describe(f, &primary_keys))
        .collect();
    if persistable.is_empty() {
        return Err(DaoError::mapping(&entity, "no persistable fields"));
    }

    let mut key_fields = Vec::with_capacity(primary_keys.len());
    for key in &primary_keys {
        match persistable.iter().find(|f| &f.name == key) {
            Some(field) => key_fields.push(field.clone()),
            None => {
                return Err(DaoError::mapping(
                    &entity,
                    format!("primary key '{}' is not a persistable field", key),
                ));
            }
        }
    }

    let mut association_fields = Vec::with_capacity(associations.len());
    for binding in &associations {
        let spec = binding.spec();
        match spec.kind {
            AssociationKind::ManyToOne => {
                if let Some(fk) = spec
                    .foreign_keys
                    .iter()
                    .find(|fk| !persistable.iter().any(|f| &f.name == *fk))
                {
                    return Err(DaoError::mapping(
                        &entity,
                        format!("foreign key '{}' of '{}' is not a persistable field", fk, binding.name()),
                    ));
                }
            }
            AssociationKind::OneToMany => {
                if spec.foreign_keys.len() != key_fields.len() {
                    return Err(DaoError::mapping(
                        &entity,
                        format!(
                            "'{}' declares {} foreign keys for {} primary keys",
                            binding.name(),
                            spec.foreign_keys.len(),
                            key_fields.len()
                        ),
                    ));
                }
            }
        }
        if spec.foreign_keys.is_empty() {
            return Err(DaoError::mapping(
                &entity,
                format!("association '{}' declares no foreign keys", binding.name()),
            ));
        }
        association_fields.push(FieldDescriptor {
            name: binding.name().to_string(),
            declared_type: ValueKind::Any,
            column: binding.name().to_string(),
            primary_key: false,
            immutable: false,
            association: Some(spec.clone()),
        });
    }

    Ok(EntityMapping {
        metadata: EntityMetadata {
            type_name: entity,
            table_name,
            auto_generate_keys,
            primary_keys: key_fields,
            fields: persistable,
            associations: association_fields,
        },
        associations,
    })
}

fn describe(field: &FieldDecl, primary_keys: &[String]) -> FieldDescriptor {
    FieldDescriptor {
        name: field.name.clone(),
        declared_type: field.kind,
        column: field.column.clone().unwrap_or_else(|| field.name.clone()),
        primary_key: primary_keys.contains(&field.name),
        immutable: field.immutable,
        association: None,
    }
}
