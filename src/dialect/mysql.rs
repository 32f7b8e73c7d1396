use super::{Dialect, InsertStatement, is_limitable, multi_row_insert};
use crate::entity::FieldSource;
use crate::error::DaoResult;
use crate::models::{EntityMetadata, Page};

/// Largest row count MySQL accepts, used when only an offset is wanted.
const MAX_ROWS: u64 = u64::MAX;

/// MySQL / MariaDB: `LIMIT offset, count`.
#[derive(Debug, Clone, Copy, Default)]
pub struct MySqlDialect;

impl Dialect for MySqlDialect {
    fn name(&self) -> &'static str {
        "mysql"
    }

    fn paginate(&self, sql: &str, page: Page) -> String {
        if page.is_unbounded() || !is_limitable(sql) {
            return sql.to_string();
        }
        format!("{} LIMIT {}, {}", sql, page.start, page.limit.unwrap_or(MAX_ROWS))
    }

    fn supports_batch_insert(&self) -> bool {
        true
    }

    fn build_insert(
        &self,
        metadata: &EntityMetadata,
        table: &str,
        entities: &[&dyn FieldSource],
    ) -> DaoResult<InsertStatement> {
        multi_row_insert(metadata, table, entities)
    }
}
