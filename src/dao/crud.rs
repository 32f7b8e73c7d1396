//! Entity operations: find, list, save, update, delete.

use super::{Dao, sql};
use crate::entity::{Entity, FieldSource};
use crate::error::{DaoError, DaoResult};
use crate::mapping::resolver::resolve;
use crate::models::{Page, SqlValue};
use serde::Serialize;
use tracing::warn;

/// Result of [`Dao::batch_save`].
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchOutcome {
    pub rows_affected: u64,
    /// Entities skipped by the one-at-a-time path
    pub failures: Vec<BatchFailure>,
}

/// An entity the one-at-a-time batch path could not insert.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BatchFailure {
    /// Position in the input slice
    pub index: usize,
    pub message: String,
}

/// What [`Dao::save_or_update`] did.
#[derive(Debug, Clone, PartialEq)]
pub enum Persisted<E> {
    /// New row; the entity as re-read after the insert
    Inserted(E),
    /// Existing row; number of rows updated
    Updated(u64),
}

impl Dao {
    /// Load one entity by primary key values, in key order.
    ///
    /// No keys, or a result that is not exactly one row, yields `None`.
    pub async fn find<E: Entity>(&self, keys: &[SqlValue]) -> DaoResult<Option<E>> {
        if keys.is_empty() {
            return Ok(None);
        }
        let mapping = resolve::<E>()?;
        let meta = mapping.metadata();
        if keys.len() != meta.primary_keys.len() {
            return Err(DaoError::invalid_input(format!(
                "{} has {} primary key(s), got {} value(s)",
                meta.type_name,
                meta.primary_keys.len(),
                keys.len()
            )));
        }

        let rs = self.run_query(&sql::select_by_key(meta), keys).await?;
        if rs.len() != 1 {
            return Ok(None);
        }
        let entity = self.materialize(&mapping, rs.into_row_maps()).await?.pop();
        Ok(entity)
    }

    /// Number of rows matching `condition` (empty for all).
    pub async fn count<E: Entity>(&self, condition: &str, params: &[SqlValue]) -> DaoResult<u64> {
        let mapping = resolve::<E>()?;
        let rs = self
            .run_query(&sql::count(mapping.metadata(), condition), params)
            .await?;
        Ok(super::raw::first_as_i64(&rs)?.max(0) as u64)
    }

    pub async fn list_all<E: Entity>(&self) -> DaoResult<Vec<E>> {
        self.list_page(Page::default(), "", &[]).await
    }

    /// Entities matching `condition`, a SQL tail such as `WHERE a = ? ORDER BY b`.
    pub async fn list<E: Entity>(&self, condition: &str, params: &[SqlValue]) -> DaoResult<Vec<E>> {
        self.list_page(Page::default(), condition, params).await
    }

    pub async fn list_page<E: Entity>(
        &self,
        page: Page,
        condition: &str,
        params: &[SqlValue],
    ) -> DaoResult<Vec<E>> {
        let mapping = resolve::<E>()?;
        let sql = self
            .dialect()
            .paginate(&sql::select_list(mapping.metadata(), condition), page);
        let rs = self.run_query(&sql, params).await?;
        self.materialize(&mapping, rs.into_row_maps()).await
    }

    /// Insert one entity.
    ///
    /// Generated keys are written back onto the entity, which is then re-read
    /// so database defaults are visible.
    pub async fn save<E: Entity>(&self, mut entity: E) -> DaoResult<E> {
        let mapping = resolve::<E>()?;
        let meta = mapping.metadata();
        let stmt = self
            .dialect()
            .build_insert(meta, &meta.table_name, &[&entity as &dyn FieldSource])?;
        let outcome = self
            .run_execute(&stmt.sql, &stmt.values, &stmt.generated_key_columns)
            .await?;

        if outcome.generated_keys.is_empty() {
            return Ok(entity);
        }
        entity.write_back_keys(meta, outcome.generated_keys)?;
        let keys = sql::key_values(meta, &entity);
        match self.find::<E>(&keys).await? {
            Some(reloaded) => Ok(reloaded),
            None => Ok(entity),
        }
    }

    /// Insert many entities of one type.
    ///
    /// Dialects with multi-row INSERT run a single statement. Otherwise each
    /// entity is inserted on its own and failures are skipped, logged and
    /// reported in [`BatchOutcome::failures`].
    pub async fn batch_save<E: Entity>(&self, entities: &[E]) -> DaoResult<BatchOutcome> {
        if entities.is_empty() {
            return Err(DaoError::invalid_input("batch_save needs at least one entity"));
        }
        let mapping = resolve::<E>()?;
        let meta = mapping.metadata();

        if self.dialect().supports_batch_insert() {
            let stmt = {
                let sources: Vec<&dyn FieldSource> =
                    entities.iter().map(|e| e as &dyn FieldSource).collect();
                self.dialect().build_insert(meta, &meta.table_name, &sources)?
            };
            let outcome = self.run_execute(&stmt.sql, &stmt.values, &[]).await?;
            return Ok(BatchOutcome {
                rows_affected: outcome.rows_affected,
                failures: Vec::new(),
            });
        }

        let mut result = BatchOutcome::default();
        for (index, entity) in entities.iter().enumerate() {
            let built = self
                .dialect()
                .build_insert(meta, &meta.table_name, &[entity as &dyn FieldSource]);
            let inserted = match built {
                Ok(stmt) => self.run_execute(&stmt.sql, &stmt.values, &[]).await,
                Err(e) => Err(e),
            };
            match inserted {
                Ok(outcome) => result.rows_affected += outcome.rows_affected,
                Err(e) => {
                    warn!(entity = %meta.type_name, index, error = %e, "Skipping entity in batch insert");
                    result.failures.push(BatchFailure {
                        index,
                        message: e.to_string(),
                    });
                }
            }
        }
        Ok(result)
    }

    /// Write every updatable field, addressed by primary key.
    pub async fn update<E: Entity>(&self, entity: &E) -> DaoResult<u64> {
        let mapping = resolve::<E>()?;
        let (sql, values) = sql::update(mapping.metadata(), entity)?;
        Ok(self.run_execute(&sql, &values, &[]).await?.rows_affected)
    }

    /// Update when the primary key is set and the row exists, else insert.
    pub async fn save_or_update<E: Entity>(&self, entity: E) -> DaoResult<Persisted<E>> {
        let mapping = resolve::<E>()?;
        let keys = sql::key_values(mapping.metadata(), &entity);
        let exists = !keys.iter().any(SqlValue::is_null) && self.find::<E>(&keys).await?.is_some();
        if exists {
            Ok(Persisted::Updated(self.update(&entity).await?))
        } else {
            Ok(Persisted::Inserted(self.save(entity).await?))
        }
    }

    /// Delete the row addressed by the entity's primary key.
    pub async fn delete<E: Entity>(&self, entity: &E) -> DaoResult<u64> {
        let mapping = resolve::<E>()?;
        let meta = mapping.metadata();
        let keys = sql::key_values(meta, entity);
        Ok(self
            .run_execute(&sql::delete_by_key(meta), &keys, &[])
            .await?
            .rows_affected)
    }

    /// Delete every row of the entity's table.
    pub async fn delete_all<E: Entity>(&self) -> DaoResult<u64> {
        let mapping = resolve::<E>()?;
        Ok(self
            .run_execute(&sql::delete_all(mapping.metadata()), &[], &[])
            .await?
            .rows_affected)
    }
}
