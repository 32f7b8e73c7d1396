//! Engine-specific SQL generation.
//!
//! A dialect wraps a SELECT in the engine's pagination syntax, decides whether
//! several entities can be inserted with one statement, and builds INSERT
//! statements that skip or generate primary key values.

mod mysql;
mod oracle;
mod postgres;
mod sqlite;

pub use mysql::MySqlDialect;
pub use oracle::OracleDialect;
pub use postgres::PostgresDialect;
pub use sqlite::SqliteDialect;

use crate::config::DialectName;
use crate::entity::FieldSource;
use crate::error::{DaoError, DaoResult};
use crate::models::{EntityMetadata, FieldDescriptor, Page, SqlValue};
use std::borrow::Cow;
use std::collections::HashMap;
use std::fmt::Debug;
use std::sync::Arc;

/// A ready-to-run INSERT.
#[derive(Debug, Clone, PartialEq)]
pub struct InsertStatement {
    pub sql: String,
    /// Bound in order, row-major for multi-row inserts
    pub values: Vec<SqlValue>,
    /// Columns whose generated values the driver should report back
    pub generated_key_columns: Vec<String>,
}

pub trait Dialect: Send + Sync + Debug {
    fn name(&self) -> &'static str;

    /// Restrict a SELECT to `page`. Statements that are not SELECTs come back
    /// unchanged.
    fn paginate(&self, sql: &str, page: Page) -> String;

    /// Whether one INSERT may carry several rows.
    fn supports_batch_insert(&self) -> bool;

    /// INSERT for `entities` into `table`. More than one entity is only
    /// accepted when [`Dialect::supports_batch_insert`] is true.
    fn build_insert(
        &self,
        metadata: &EntityMetadata,
        table: &str,
        entities: &[&dyn FieldSource],
    ) -> DaoResult<InsertStatement>;

    /// Rewrite `?` placeholders into the engine's syntax.
    fn prepare<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        Cow::Borrowed(sql)
    }
}

/// Dialect instance for a configured name.
pub fn dialect_for(name: DialectName, properties: &HashMap<String, String>) -> Arc<dyn Dialect> {
    match name {
        DialectName::Mysql => Arc::new(MySqlDialect),
        DialectName::Postgres => Arc::new(PostgresDialect),
        DialectName::Sqlite => Arc::new(SqliteDialect),
        DialectName::Oracle => Arc::new(OracleDialect::with_properties(properties.clone())),
    }
}

/// First keyword of a statement, upper-cased.
pub(crate) fn leading_keyword(sql: &str) -> String {
    sql.trim_start()
        .trim_start_matches('(')
        .split(|c: char| !c.is_ascii_alphabetic())
        .next()
        .unwrap_or_default()
        .to_ascii_uppercase()
}

/// SELECT or WITH, the statements a LIMIT clause can be appended to.
pub(crate) fn is_limitable(sql: &str) -> bool {
    matches!(leading_keyword(sql).as_str(), "SELECT" | "WITH")
}

/// Columns written by an INSERT: generated key columns are left to the database.
pub(crate) fn insert_fields(metadata: &EntityMetadata) -> Vec<&FieldDescriptor> {
    metadata
        .fields
        .iter()
        .filter(|f| !(f.primary_key && metadata.auto_generate_keys))
        .collect()
}

pub(crate) fn generated_key_columns(metadata: &EntityMetadata) -> Vec<String> {
    if !metadata.auto_generate_keys {
        return Vec::new();
    }
    metadata.primary_keys.iter().map(|f| f.column.clone()).collect()
}

/// `INSERT INTO t (a, b) VALUES (?, ?), (?, ?)` shared by the LIMIT dialects.
pub(crate) fn multi_row_insert(
    metadata: &EntityMetadata,
    table: &str,
    entities: &[&dyn FieldSource],
) -> DaoResult<InsertStatement> {
    if entities.is_empty() {
        return Err(DaoError::invalid_input("Nothing to insert"));
    }
    let fields = insert_fields(metadata);
    if fields.is_empty() {
        return Err(DaoError::mapping(
            &metadata.type_name,
            "no insertable columns besides generated keys",
        ));
    }

    let columns = fields.iter().map(|f| f.column.as_str()).collect::<Vec<_>>().join(", ");
    let row = format!("({})", vec!["?"; fields.len()].join(", "));
    let rows = vec![row.as_str(); entities.len()].join(", ");

    let mut values = Vec::with_capacity(fields.len() * entities.len());
    for entity in entities {
        values.extend(fields.iter().map(|f| entity.field_value(&f.name)));
    }

    Ok(InsertStatement {
        sql: format!("INSERT INTO {} ({}) VALUES {}", table, columns, rows),
        values,
        generated_key_columns: generated_key_columns(metadata),
    })
}
