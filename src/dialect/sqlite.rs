use super::{Dialect, InsertStatement, is_limitable, multi_row_insert};
use crate::entity::FieldSource;
use crate::error::DaoResult;
use crate::models::{EntityMetadata, Page};

/// SQLite: `LIMIT count OFFSET offset`, with `-1` as "no limit".
#[derive(Debug, Clone, Copy, Default)]
pub struct SqliteDialect;

impl Dialect for SqliteDialect {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn paginate(&self, sql: &str, page: Page) -> String {
        if page.is_unbounded() || !is_limitable(sql) {
            return sql.to_string();
        }
        let limit = page.limit.map_or_else(|| "-1".to_string(), |l| l.to_string());
        if page.start == 0 {
            format!("{} LIMIT {}", sql, limit)
        } else {
            format!("{} LIMIT {} OFFSET {}", sql, limit, page.start)
        }
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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_paginate() {
        let d = SqliteDialect;
        assert_eq!(
            d.paginate("select * from t", Page::new(0, 2)),
            "select * from t LIMIT 2"
        );
        assert_eq!(
            d.paginate("select * from t", Page::new(4, 2)),
            "select * from t LIMIT 2 OFFSET 4"
        );
        assert_eq!(
            d.paginate("select * from t", Page::from_offsets(3, 0)),
            "select * from t LIMIT -1 OFFSET 3"
        );
        assert_eq!(
            d.paginate("WITH x AS (SELECT 1) SELECT * FROM x", Page::new(0, 1)),
            "WITH x AS (SELECT 1) SELECT * FROM x LIMIT 1"
        );
        assert_eq!(d.paginate("PRAGMA user_version", Page::new(0, 1)), "PRAGMA user_version");
    }
}
