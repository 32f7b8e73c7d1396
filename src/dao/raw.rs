//! Raw SQL: row maps, typed entities and scalar values from caller SQL.

use super::Dao;
use crate::db::CachedResultSet;
use crate::entity::Entity;
use crate::error::{DaoError, DaoResult};
use crate::mapping::resolver::resolve;
use crate::models::{Page, RowMap, SqlValue};

impl Dao {
    /// Run a SELECT and return each row keyed by upper-cased column name.
    pub async fn execute_query(&self, sql: &str, params: &[SqlValue]) -> DaoResult<Vec<RowMap>> {
        Ok(self.execute_query_cached(sql, None, params).await?.into_row_maps())
    }

    pub async fn execute_query_page(
        &self,
        sql: &str,
        page: Page,
        params: &[SqlValue],
    ) -> DaoResult<Vec<RowMap>> {
        Ok(self
            .execute_query_cached(sql, Some(page), params)
            .await?
            .into_row_maps())
    }

    /// The detached result set itself, for cursor-style reading.
    pub async fn execute_query_cached(
        &self,
        sql: &str,
        page: Option<Page>,
        params: &[SqlValue],
    ) -> DaoResult<CachedResultSet> {
        match page {
            Some(page) => self.run_query(&self.dialect().paginate(sql, page), params).await,
            None => self.run_query(sql, params).await,
        }
    }

    /// At most one row. More than one is an [`DaoError::AmbiguousResult`].
    pub async fn execute_unique_query(&self, sql: &str, params: &[SqlValue]) -> DaoResult<Option<RowMap>> {
        let rows = self.execute_query(sql, params).await?;
        unique(rows)
    }

    /// Run a SELECT and build entities of `E` from the rows.
    pub async fn execute_query_as<E: Entity>(&self, sql: &str, params: &[SqlValue]) -> DaoResult<Vec<E>> {
        let mapping = resolve::<E>()?;
        let rows = self.execute_query(sql, params).await?;
        self.materialize(&mapping, rows).await
    }

    pub async fn execute_query_page_as<E: Entity>(
        &self,
        sql: &str,
        page: Page,
        params: &[SqlValue],
    ) -> DaoResult<Vec<E>> {
        let mapping = resolve::<E>()?;
        let rows = self.execute_query_page(sql, page, params).await?;
        self.materialize(&mapping, rows).await
    }

    pub async fn execute_unique_query_as<E: Entity>(
        &self,
        sql: &str,
        params: &[SqlValue],
    ) -> DaoResult<Option<E>> {
        let mapping = resolve::<E>()?;
        let Some(row) = self.execute_unique_query(sql, params).await? else {
            return Ok(None);
        };
        Ok(self.materialize(&mapping, vec![row]).await?.pop())
    }

    /// Run INSERT/UPDATE/DELETE/DDL and return the affected row count.
    pub async fn execute_update(&self, sql: &str, params: &[SqlValue]) -> DaoResult<u64> {
        Ok(self.run_execute(sql, params, &[]).await?.rows_affected)
    }

    /// First column of the first row as an integer, 0 when there is no row
    /// or the value is NULL.
    pub async fn get_unique_value(&self, sql: &str, params: &[SqlValue]) -> DaoResult<i64> {
        let rs = self.run_query(sql, params).await?;
        first_as_i64(&rs)
    }
}

fn unique(mut rows: Vec<RowMap>) -> DaoResult<Option<RowMap>> {
    match rows.len() {
        0 | 1 => Ok(rows.pop()),
        n => Err(DaoError::ambiguous(n)),
    }
}

pub(super) fn first_as_i64(rs: &CachedResultSet) -> DaoResult<i64> {
    match rs.first_value() {
        None | Some(SqlValue::Null) => Ok(0),
        Some(value) => {
            let column = rs.column_name(1).unwrap_or("1").to_string();
            value.clone().decode::<i64>(&column)
        }
    }
}
