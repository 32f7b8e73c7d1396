//! Connection contracts consumed by the DAO engine.
//!
//! The engine only needs to acquire a connection (plain or inside a
//! transaction), run statements on it, and hand it back.
//! [`crate::db::SqlxConnectionFactory`] implements these over the sqlx pools;
//! tests substitute instrumented doubles.

use crate::db::CachedResultSet;
use crate::error::DaoResult;
use crate::models::{DatabaseType, ExecOutcome, SqlValue};
use async_trait::async_trait;

/// A single leased database connection.
#[async_trait]
pub trait Connection: Send {
    fn kind(&self) -> DatabaseType;

    /// Run a query and materialize every row before returning.
    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> DaoResult<CachedResultSet>;

    /// Run a write statement. When `generated_key_columns` is non-empty the
    /// values of those columns for the inserted row are returned.
    async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        generated_key_columns: &[String],
    ) -> DaoResult<ExecOutcome>;

    /// Commit the transaction this connection was leased with. Fails for a
    /// connection from [`ConnectionFactory::acquire`].
    async fn commit(&mut self) -> DaoResult<()>;

    async fn rollback(&mut self) -> DaoResult<()>;

    /// Cheap liveness probe used before a manual transaction starts.
    async fn is_valid(&mut self) -> bool;
}

/// Source of connections.
#[async_trait]
pub trait ConnectionFactory: Send + Sync {
    async fn acquire(&self) -> DaoResult<Box<dyn Connection>>;

    /// Lease a connection with a transaction already open. Dropping it
    /// before commit or rollback must roll the transaction back.
    async fn begin(&self) -> DaoResult<Box<dyn Connection>>;

    /// Give a connection back. Must not fail.
    async fn release(&self, conn: Box<dyn Connection>);
}
