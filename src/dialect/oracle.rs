use super::{Dialect, InsertStatement, generated_key_columns, leading_keyword};
use crate::entity::FieldSource;
use crate::error::{DaoError, DaoResult};
use crate::models::{EntityMetadata, Page};
use std::collections::HashMap;

/// Property suffix naming the SQL expression that produces a new key,
/// e.g. `Employee.pk_policy = EMPLOYEE_SEQ.NEXTVAL`.
pub const PK_POLICY_SUFFIX: &str = ".pk_policy";

/// Oracle: ROWNUM-ranked subquery pagination, single-row inserts only.
///
/// No sqlx driver exists for Oracle, so this dialect generates SQL for a
/// caller-supplied [`crate::db::Connection`].
#[derive(Debug, Clone, Default)]
pub struct OracleDialect {
    properties: HashMap<String, String>,
}

impl OracleDialect {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_properties(properties: HashMap<String, String>) -> Self {
        Self { properties }
    }

    /// Key expression configured for an entity type.
    pub fn pk_policy(&self, type_name: &str) -> Option<&str> {
        self.properties
            .get(&format!("{}{}", type_name, PK_POLICY_SUFFIX))
            .map(String::as_str)
            .filter(|p| !p.trim().is_empty())
    }
}

impl Dialect for OracleDialect {
    fn name(&self) -> &'static str {
        "oracle"
    }

    fn paginate(&self, sql: &str, page: Page) -> String {
        if page.is_unbounded() || leading_keyword(sql) != "SELECT" {
            return sql.to_string();
        }
        let mut paged = format!(
            "SELECT * FROM (SELECT ROWNUM AS RN__, T__.* FROM ({}) T__) WHERE RN__ > {}",
            sql, page.start
        );
        if let Some(limit) = page.limit {
            paged.push_str(&format!(" AND RN__ <= {}", page.start.saturating_add(limit)));
        }
        paged
    }

    fn supports_batch_insert(&self) -> bool {
        false
    }

    fn build_insert(
        &self,
        metadata: &EntityMetadata,
        table: &str,
        entities: &[&dyn FieldSource],
    ) -> DaoResult<InsertStatement> {
        let entity = match entities {
            [] => return Err(DaoError::invalid_input("Nothing to insert")),
            [entity] => *entity,
            _ => return Err(DaoError::unsupported("multi-row insert", self.name())),
        };

        let policy = self.pk_policy(&metadata.type_name);
        let mut columns = Vec::with_capacity(metadata.fields.len());
        let mut markers = Vec::with_capacity(metadata.fields.len());
        let mut values = Vec::new();
        for field in &metadata.fields {
            if field.primary_key && metadata.auto_generate_keys {
                // Without a policy the column is left to a default or trigger.
                if let Some(expr) = policy {
                    columns.push(field.column.as_str());
                    markers.push(expr.to_string());
                }
                continue;
            }
            columns.push(field.column.as_str());
            markers.push("?".to_string());
            values.push(entity.field_value(&field.name));
        }

        Ok(InsertStatement {
            sql: format!(
                "INSERT INTO {} ({}) VALUES ({})",
                table,
                columns.join(", "),
                markers.join(", ")
            ),
            values,
            generated_key_columns: generated_key_columns(metadata),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dialect::test_support::*;

    #[test]
    fn test_paginate_ranks_rows() {
        let d = OracleDialect::new();
        assert_eq!(
            d.paginate("SELECT * FROM emp", Page::new(10, 5)),
            "SELECT * FROM (SELECT ROWNUM AS RN__, T__.* FROM (SELECT * FROM emp) T__) WHERE RN__ > 10 AND RN__ <= 15"
        );
        assert_eq!(
            d.paginate("select * from emp", Page::from_offsets(3, 0)),
            "SELECT * FROM (SELECT ROWNUM AS RN__, T__.* FROM (select * from emp) T__) WHERE RN__ > 3"
        );
        // Only SELECT statements are wrapped
        assert_eq!(
            d.paginate("WITH x AS (SELECT 1 FROM dual) SELECT * FROM x", Page::new(0, 1)),
            "WITH x AS (SELECT 1 FROM dual) SELECT * FROM x"
        );
    }

    #[test]
    fn test_paginate_clamps_upper_bound() {
        let paged = OracleDialect::new().paginate("SELECT 1 FROM dual", Page::new(u64::MAX, 1));
        assert!(paged.ends_with(&format!("RN__ > {} AND RN__ <= {}", u64::MAX, u64::MAX)));
    }

    #[test]
    fn test_single_row_only() {
        let d = OracleDialect::new();
        assert!(!d.supports_batch_insert());
        let (a, b) = (ann(), bob());
        let err = d.build_insert(&person(true), "person", &[&a, &b]).unwrap_err();
        assert!(matches!(err, DaoError::Unsupported { .. }));
    }

    #[test]
    fn test_pk_policy_expression() {
        let b = bob();
        let plain = OracleDialect::new()
            .build_insert(&person(true), "person", &[&b])
            .unwrap();
        assert_eq!(plain.sql, "INSERT INTO person (full_name, age) VALUES (?, ?)");

        let props = HashMap::from([(
            "Person.pk_policy".to_string(),
            "PERSON_SEQ.NEXTVAL".to_string(),
        )]);
        let stmt = OracleDialect::with_properties(props)
            .build_insert(&person(true), "person", &[&b])
            .unwrap();
        assert_eq!(
            stmt.sql,
            "INSERT INTO person (id, full_name, age) VALUES (PERSON_SEQ.NEXTVAL, ?, ?)"
        );
        assert_eq!(stmt.values.len(), 2);
        assert_eq!(stmt.generated_key_columns, vec!["id".to_string()]);
    }
}
