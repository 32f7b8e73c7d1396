//! Loading of ManyToOne and OneToMany relations onto entity fields.

use crate::dao::Dao;
use crate::entity::{Collection, Entity, Lazy, Loader, Reference};
use crate::error::{DaoError, DaoResult};
use crate::mapping::resolver::resolve;
use crate::models::{AssociationSpec, EntityMetadata, SqlValue};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::warn;

/// How a freshly built entity gets its association fields populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum WireMode {
    /// Load now. On failure the cell stays pending when `retry_on_access`.
    Eager { retry_on_access: bool },
    /// Park a loader for the first access.
    Deferred,
}

/// One declared association of `E`, able to fill its own field.
#[async_trait]
pub(crate) trait AssociationBinding<E: Entity>: Send + Sync {
    fn name(&self) -> &str;

    fn spec(&self) -> &AssociationSpec;

    fn spec_mut(&mut self) -> &mut AssociationSpec;

    async fn wire(&self, dao: &Dao, owner: &EntityMetadata, entity: &mut E, mode: WireMode);
}

pub(crate) struct ManyToOneBinding<E, P> {
    name: String,
    spec: AssociationSpec,
    slot: fn(&mut E) -> &mut Reference<P>,
}

impl<E, P> ManyToOneBinding<E, P> {
    pub(crate) fn new(name: &str, spec: AssociationSpec, slot: fn(&mut E) -> &mut Reference<P>) -> Self {
        Self {
            name: name.to_string(),
            spec,
            slot,
        }
    }
}

#[async_trait]
impl<E: Entity, P: Entity> AssociationBinding<E> for ManyToOneBinding<E, P> {
    fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> &AssociationSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut AssociationSpec {
        &mut self.spec
    }

    async fn wire(&self, dao: &Dao, owner: &EntityMetadata, entity: &mut E, mode: WireMode) {
        // Foreign key values are captured now, not at load time.
        let keys: Vec<SqlValue> = self.spec.foreign_keys.iter().map(|fk| entity.value(fk)).collect();
        let loader = parent_loader::<P>(dao.clone(), keys);
        settle((self.slot)(entity), loader, mode, &owner.type_name, &self.name).await;
    }
}

pub(crate) struct OneToManyBinding<E, C> {
    name: String,
    spec: AssociationSpec,
    slot: fn(&mut E) -> &mut Collection<C>,
}

impl<E, C> OneToManyBinding<E, C> {
    pub(crate) fn new(name: &str, spec: AssociationSpec, slot: fn(&mut E) -> &mut Collection<C>) -> Self {
        Self {
            name: name.to_string(),
            spec,
            slot,
        }
    }
}

#[async_trait]
impl<E: Entity, C: Entity> AssociationBinding<E> for OneToManyBinding<E, C> {
    fn name(&self) -> &str {
        &self.name
    }

    fn spec(&self) -> &AssociationSpec {
        &self.spec
    }

    fn spec_mut(&mut self) -> &mut AssociationSpec {
        &mut self.spec
    }

    async fn wire(&self, dao: &Dao, owner: &EntityMetadata, entity: &mut E, mode: WireMode) {
        let keys: Vec<SqlValue> = owner
            .primary_keys
            .iter()
            .map(|pk| entity.value(&pk.name))
            .collect();
        let loader = children_loader::<C>(dao.clone(), self.spec.clone(), keys);
        settle((self.slot)(entity), loader, mode, &owner.type_name, &self.name).await;
    }
}

async fn settle<T>(cell: &mut Lazy<T>, loader: Loader<T>, mode: WireMode, owner: &str, field: &str) {
    match mode {
        WireMode::Deferred => cell.defer(loader),
        WireMode::Eager { retry_on_access } => {
            if !cell.resolve_now(loader, retry_on_access).await {
                warn!(
                    entity = owner,
                    association = field,
                    error = cell.failure().unwrap_or_default(),
                    "Association load failed"
                );
            }
        }
    }
}

/// Loads the parent row addressed by `keys`. A NULL key means no parent.
fn parent_loader<P: Entity>(dao: Dao, keys: Vec<SqlValue>) -> Loader<Option<P>> {
    Arc::new(move || {
        let dao = dao.clone();
        let keys = keys.clone();
        Box::pin(async move {
            if keys.is_empty() || keys.iter().any(SqlValue::is_null) {
                return Ok(None);
            }
            dao.find::<P>(&keys).await
        })
    })
}

/// Loads the children whose foreign keys match the owner's key values.
fn children_loader<C: Entity>(dao: Dao, spec: AssociationSpec, keys: Vec<SqlValue>) -> Loader<Vec<C>> {
    Arc::new(move || {
        let dao = dao.clone();
        let spec = spec.clone();
        let keys = keys.clone();
        Box::pin(async move {
            if keys.iter().any(SqlValue::is_null) {
                return Ok(Vec::new());
            }
            let child = resolve::<C>()?;
            let condition = children_condition(child.metadata(), &spec)?;
            dao.list::<C>(&condition, &keys).await
        })
    })
}

/// `WHERE fk1 = ? AND ... [AND condition] [ORDER BY col dir]` over the child table.
pub(crate) fn children_condition(child: &EntityMetadata, spec: &AssociationSpec) -> DaoResult<String> {
    let mut predicates = Vec::with_capacity(spec.foreign_keys.len());
    for fk in &spec.foreign_keys {
        let column = child.column_of(fk).ok_or_else(|| {
            DaoError::mapping(
                &child.type_name,
                format!("foreign key '{}' is not a persistable field", fk),
            )
        })?;
        predicates.push(format!("{} = ?", column));
    }

    let mut sql = format!("WHERE {}", predicates.join(" AND "));
    if let Some(condition) = spec.condition.as_deref().map(str::trim).filter(|c| !c.is_empty()) {
        sql.push_str(" AND ");
        sql.push_str(condition);
    }
    if let Some(order_by) = spec.order_by.as_deref().map(str::trim).filter(|o| !o.is_empty()) {
        let target = if is_identifier(order_by) {
            child.column_of(order_by).unwrap_or(order_by)
        } else {
            order_by
        };
        sql.push_str(&format!(" ORDER BY {} {}", target, spec.sort.as_sql()));
    }
    Ok(sql)
}

fn is_identifier(s: &str) -> bool {
    !s.is_empty() && s.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{AssociationKind, FieldDescriptor, SortOrder, ValueKind};

    fn field(name: &str, column: &str) -> FieldDescriptor {
        FieldDescriptor {
            name: name.into(),
            declared_type: ValueKind::Any,
            column: column.into(),
            primary_key: name == "id",
            immutable: false,
            association: None,
        }
    }

    fn employee() -> EntityMetadata {
        let fields = vec![
            field("id", "id"),
            field("deptId", "dept_id"),
            field("name", "full_name"),
        ];
        EntityMetadata {
            type_name: "Employee".into(),
            table_name: "employee".into(),
            auto_generate_keys: true,
            primary_keys: vec![fields[0].clone()],
            fields,
            associations: vec![],
        }
    }

    fn spec() -> AssociationSpec {
        AssociationSpec {
            kind: AssociationKind::OneToMany,
            target: "Employee".into(),
            foreign_keys: vec!["deptId".into()],
            condition: None,
            order_by: None,
            sort: SortOrder::Asc,
            lazy: false,
        }
    }

    #[test]
    fn test_children_condition_plain() {
        assert_eq!(
            children_condition(&employee(), &spec()).unwrap(),
            "WHERE dept_id = ?"
        );
    }

    #[test]
    fn test_children_condition_resolves_sort_field() {
        let mut spec = spec();
        spec.condition = Some("active = 1".into());
        spec.order_by = Some("name".into());
        spec.sort = SortOrder::Desc;
        assert_eq!(
            children_condition(&employee(), &spec).unwrap(),
            "WHERE dept_id = ? AND active = 1 ORDER BY full_name DESC"
        );
    }

    #[test]
    fn test_children_condition_verbatim_fragment() {
        let mut spec = spec();
        spec.order_by = Some("LOWER(full_name)".into());
        assert_eq!(
            children_condition(&employee(), &spec).unwrap(),
            "WHERE dept_id = ? ORDER BY LOWER(full_name) ASC"
        );
    }

    #[test]
    fn test_children_condition_unknown_foreign_key() {
        let mut spec = spec();
        spec.foreign_keys = vec!["department".into()];
        let err = children_condition(&employee(), &spec).unwrap_err();
        assert!(matches!(err, DaoError::Mapping { .. }));
    }
}
