//! The DAO engine.
//!
//! A [`Dao`] owns one connection slot. Outside a manual transaction every
//! operation leases a connection from the factory and hands it back when the
//! statement completes. Between [`Dao::begin_transaction`] and
//! [`Dao::end_transaction`] / [`Dao::rollback_transaction`] the leased
//! connection stays in the slot and every operation runs on it.
//!
//! Clones of a `Dao` share the slot, the transaction flag, the cascading flag
//! and the converter registry.

mod crud;
mod raw;
pub(crate) mod sql;

pub use crud::{BatchFailure, BatchOutcome, Persisted};

use crate::config::{DaoSettings, DatabaseConfig, DialectName};
use crate::db::{CachedResultSet, Connection, ConnectionFactory, DbPool, SqlxConnectionFactory};
use crate::dialect::{Dialect, dialect_for};
use crate::entity::Entity;
use crate::error::{DaoError, DaoResult};
use crate::mapping::builder;
use crate::mapping::converter::{ConverterRegistry, TypeConverter};
use crate::mapping::resolver::EntityMapping;
use crate::models::{ExecOutcome, RowMap, SqlValue};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Entity-level access to one database.
#[derive(Clone)]
pub struct Dao {
    inner: Arc<DaoInner>,
}

struct DaoInner {
    factory: Arc<dyn ConnectionFactory>,
    dialect: Arc<dyn Dialect>,
    converters: RwLock<ConverterRegistry>,
    cascading: AtomicBool,
    session: Mutex<Session>,
}

/// Connection slot. Occupied exactly while a transaction is open.
#[derive(Default)]
struct Session {
    conn: Option<Box<dyn Connection>>,
}

impl Drop for DaoInner {
    fn drop(&mut self) {
        // The leased connection rolls its transaction back when dropped
        if self.session.get_mut().conn.is_some() {
            warn!(dialect = self.dialect.name(), "DAO dropped with an open transaction, rolling back");
        }
    }
}

impl std::fmt::Debug for Dao {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dao")
            .field("dialect", &self.inner.dialect.name())
            .field("cascading", &self.is_cascading())
            .finish_non_exhaustive()
    }
}

impl Dao {
    pub fn new(factory: Arc<dyn ConnectionFactory>, dialect: Arc<dyn Dialect>) -> Self {
        Self {
            inner: Arc::new(DaoInner {
                factory,
                dialect,
                converters: RwLock::new(ConverterRegistry::new()),
                cascading: AtomicBool::new(false),
                session: Mutex::new(Session::default()),
            }),
        }
    }

    /// Engine configured from settings. The dialect defaults to the one
    /// matching the database type.
    pub fn with_settings(
        factory: Arc<dyn ConnectionFactory>,
        default_dialect: DialectName,
        settings: &DaoSettings,
    ) -> DaoResult<Self> {
        let name = settings.dialect.unwrap_or(default_dialect);
        let dao = Self::new(factory, dialect_for(name, &settings.dialect_properties));
        dao.set_type_converters(ConverterRegistry::from_names(&settings.type_converters)?);
        dao.set_cascading(settings.cascading);
        Ok(dao)
    }

    /// Open a sqlx pool for `url` and build an engine over it.
    pub async fn connect(url: &str, settings: &DaoSettings) -> DaoResult<Self> {
        let config = DatabaseConfig::parse(url).map_err(|e| {
            DaoError::connection(e, "Check the connection URL and its pool options")
        })?;
        let factory = SqlxConnectionFactory::new(DbPool::connect(&config).await?);
        let default_dialect = DialectName::for_database(factory.db_type());
        info!(
            url = %config.masked_connection_string(),
            dialect = %settings.dialect.unwrap_or(default_dialect),
            "DAO connected"
        );
        Self::with_settings(Arc::new(factory), default_dialect, settings)
    }

    pub fn dialect(&self) -> &dyn Dialect {
        self.inner.dialect.as_ref()
    }

    // ===== Settings =====

    /// When on, lazy associations of returned entities are wired for loading
    /// on first access, and failed eager loads are retried on access.
    pub fn set_cascading(&self, enabled: bool) {
        self.inner.cascading.store(enabled, Ordering::SeqCst);
    }

    pub fn is_cascading(&self) -> bool {
        self.inner.cascading.load(Ordering::SeqCst)
    }

    /// Append a converter after the registered ones.
    pub fn add_type_converter(&self, converter: Arc<dyn TypeConverter>) {
        self.inner
            .converters
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .register(converter);
    }

    /// Replace the whole registry.
    pub fn set_type_converters(&self, registry: ConverterRegistry) {
        *self.inner.converters.write().unwrap_or_else(|e| e.into_inner()) = registry;
    }

    pub fn type_converters(&self) -> ConverterRegistry {
        self.inner
            .converters
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }

    // ===== Transactions =====

    /// Lease a connection with a transaction open and keep it for every
    /// operation until the transaction ends.
    pub async fn begin_transaction(&self) -> DaoResult<()> {
        let mut session = self.inner.session.lock().await;
        if session.conn.is_some() {
            return Err(DaoError::connection(
                "A transaction is already open on this DAO",
                "Commit or roll back the open transaction first",
            ));
        }

        let mut conn = self.inner.factory.begin().await?;
        if !conn.is_valid().await {
            if let Err(e) = conn.rollback().await {
                debug!(error = %e, "Rollback on unusable connection failed");
            }
            self.inner.factory.release(conn).await;
            return Err(DaoError::connection(
                "Leased connection is not usable",
                "Check that the database is reachable",
            ));
        }

        session.conn = Some(conn);
        info!(dialect = self.inner.dialect.name(), "Transaction started");
        Ok(())
    }

    /// Commit. The slot is cleared and the connection released even when the
    /// commit fails.
    pub async fn end_transaction(&self) -> DaoResult<()> {
        self.finish_transaction(true).await
    }

    /// Roll back. The slot is cleared and the connection released even when
    /// the rollback fails.
    pub async fn rollback_transaction(&self) -> DaoResult<()> {
        self.finish_transaction(false).await
    }

    pub async fn is_transaction_open(&self) -> bool {
        self.inner.session.lock().await.conn.is_some()
    }

    async fn finish_transaction(&self, commit: bool) -> DaoResult<()> {
        let Some(mut conn) = self.inner.session.lock().await.conn.take() else {
            return Err(DaoError::connection(
                "No transaction is open on this DAO",
                "Call begin_transaction first",
            ));
        };

        let result = if commit {
            conn.commit().await
        } else {
            conn.rollback().await
        };
        self.inner.factory.release(conn).await;

        match (&result, commit) {
            (Ok(()), true) => info!("Transaction committed"),
            (Ok(()), false) => info!("Transaction rolled back"),
            (Err(e), _) => warn!(error = %e, commit, "Transaction did not finish cleanly"),
        }
        result
    }

    // ===== Statement primitives =====
    //
    // Inside a transaction the statement runs on the connection in the slot,
    // which stays there even if the caller's future is dropped. Otherwise a
    // connection is leased for the one statement.

    pub(crate) async fn run_query(&self, sql: &str, params: &[SqlValue]) -> DaoResult<CachedResultSet> {
        let sql = self.inner.dialect.prepare(sql);
        debug!(sql = %sql, params = params.len(), "Preparing query");

        let mut session = self.inner.session.lock().await;
        let result = match session.conn.as_mut() {
            Some(conn) => conn.query(&sql, params).await,
            None => {
                let mut conn = self.inner.factory.acquire().await?;
                let result = conn.query(&sql, params).await;
                self.inner.factory.release(conn).await;
                result
            }
        };
        drop(session);

        if let Ok(rs) = &result {
            debug!(rows = rs.len(), "Query finished");
        }
        result
    }

    pub(crate) async fn run_execute(
        &self,
        sql: &str,
        params: &[SqlValue],
        generated_key_columns: &[String],
    ) -> DaoResult<ExecOutcome> {
        let sql = self.inner.dialect.prepare(sql);
        debug!(sql = %sql, params = params.len(), "Preparing statement");

        let mut session = self.inner.session.lock().await;
        let result = match session.conn.as_mut() {
            Some(conn) => conn.execute(&sql, params, generated_key_columns).await,
            None => {
                let mut conn = self.inner.factory.acquire().await?;
                let result = conn.execute(&sql, params, generated_key_columns).await;
                self.inner.factory.release(conn).await;
                result
            }
        };
        drop(session);

        if let Ok(outcome) = &result {
            debug!(
                rows_affected = outcome.rows_affected,
                generated_keys = outcome.generated_keys.len(),
                "Statement finished"
            );
        }
        result
    }

    /// Build entities from row maps. Runs with the slot unlocked so eager
    /// association loads can issue their own statements.
    pub(crate) async fn materialize<E: Entity>(
        &self,
        mapping: &EntityMapping<E>,
        rows: Vec<RowMap>,
    ) -> DaoResult<Vec<E>> {
        let converters = self.type_converters();
        let cascading = self.is_cascading();
        let mut entities = Vec::with_capacity(rows.len());
        for row in &rows {
            entities.push(builder::build(self, mapping, row, &converters, cascading).await?);
        }
        Ok(entities)
    }
}
