//! SQL text for the entity operations.

use crate::entity::FieldSource;
use crate::error::{DaoError, DaoResult};
use crate::models::{EntityMetadata, SqlValue};

/// `SELECT cols FROM t WHERE pk = ? [AND ...]`
pub(crate) fn select_by_key(meta: &EntityMetadata) -> String {
    format!(
        "SELECT {} FROM {} WHERE {}",
        meta.column_list(),
        meta.table_name,
        meta.key_predicate()
    )
}

/// `SELECT t.* FROM t [condition]`
pub(crate) fn select_list(meta: &EntityMetadata, condition: &str) -> String {
    with_condition(format!("SELECT {0}.* FROM {0}", meta.table_name), condition)
}

/// `SELECT COUNT(0) FROM t [condition]`
pub(crate) fn count(meta: &EntityMetadata, condition: &str) -> String {
    with_condition(format!("SELECT COUNT(0) FROM {}", meta.table_name), condition)
}

/// `UPDATE t SET a = ?, b = ? WHERE pk = ?` with values in placeholder order.
pub(crate) fn update(meta: &EntityMetadata, entity: &dyn FieldSource) -> DaoResult<(String, Vec<SqlValue>)> {
    let fields: Vec<_> = meta.updatable_fields().collect();
    if fields.is_empty() {
        return Err(DaoError::mapping(&meta.type_name, "no updatable columns"));
    }
    let assignments = fields
        .iter()
        .map(|f| format!("{} = ?", f.column))
        .collect::<Vec<_>>()
        .join(", ");
    let mut values: Vec<SqlValue> = fields.iter().map(|f| entity.field_value(&f.name)).collect();
    values.extend(key_values(meta, entity));
    Ok((
        format!(
            "UPDATE {} SET {} WHERE {}",
            meta.table_name,
            assignments,
            meta.key_predicate()
        ),
        values,
    ))
}

/// `DELETE FROM t WHERE pk = ?`
pub(crate) fn delete_by_key(meta: &EntityMetadata) -> String {
    format!("DELETE FROM {} WHERE {}", meta.table_name, meta.key_predicate())
}

pub(crate) fn delete_all(meta: &EntityMetadata) -> String {
    format!("DELETE FROM {}", meta.table_name)
}

/// Primary key values in declared key order.
pub(crate) fn key_values(meta: &EntityMetadata, entity: &dyn FieldSource) -> Vec<SqlValue> {
    meta.primary_keys
        .iter()
        .map(|f| entity.field_value(&f.name))
        .collect()
}

fn with_condition(mut sql: String, condition: &str) -> String {
    let condition = condition.trim();
    if !condition.is_empty() {
        sql.push(' ');
        sql.push_str(condition);
    }
    sql
}
