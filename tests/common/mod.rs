//! Shared fixtures for the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use entity_dao::db::{CachedResultSet, Connection, ConnectionFactory, SqlxConnectionFactory};
use entity_dao::dialect::SqliteDialect;
use entity_dao::models::{DatabaseType, ExecOutcome};
use entity_dao::{Collection, Dao, DaoError, DaoResult, Entity, EntityDecl, Reference, SqlValue, ValueKind};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tempfile::NamedTempFile;

// =============================================================================
// Entities
// =============================================================================

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Department {
    pub id: Option<i64>,
    pub name: String,
    pub employees: Collection<Employee>,
}

impl Department {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Default::default()
        }
    }
}

impl Entity for Department {
    fn declare() -> EntityDecl<Self> {
        EntityDecl::<Self>::new()
            .table("department", &["id"])
            .field("id", ValueKind::Int)
            .field("name", ValueKind::Text)
            .one_to_many::<Employee>("employees", &["deptId"], |d| &mut d.employees)
            .order_by("name")
            .lazy()
    }

    fn value(&self, field: &str) -> SqlValue {
        match field {
            "id" => self.id.into(),
            "name" => self.name.as_str().into(),
            _ => SqlValue::Null,
        }
    }

    fn assign(&mut self, field: &str, value: SqlValue) -> DaoResult<()> {
        match field {
            "id" => self.id = value.decode(field)?,
            "name" => self.name = value.decode(field)?,
            _ => {}
        }
        Ok(())
    }
}

#[derive(Debug, Default, Clone, PartialEq)]
pub struct Employee {
    pub id: Option<i64>,
    pub name: String,
    pub salary: f64,
    pub dept_id: Option<i64>,
    /// Never stored
    pub scratch: String,
    pub department: Reference<Department>,
}

impl Employee {
    pub fn new(name: &str, salary: f64, dept_id: Option<i64>) -> Self {
        Self {
            name: name.to_string(),
            salary,
            dept_id,
            ..Default::default()
        }
    }
}

impl Entity for Employee {
    fn declare() -> EntityDecl<Self> {
        EntityDecl::<Self>::new()
            .table("employee", &["id"])
            .field("id", ValueKind::Int)
            .field("name", ValueKind::Text)
            .field("salary", ValueKind::Float)
            .column("deptId", "dept_id", ValueKind::Int)
            .transient("scratch")
            .many_to_one::<Department>("department", &["deptId"], |e| &mut e.department)
    }

    fn value(&self, field: &str) -> SqlValue {
        match field {
            "id" => self.id.into(),
            "name" => self.name.as_str().into(),
            "salary" => self.salary.into(),
            "deptId" => self.dept_id.into(),
            "scratch" => self.scratch.as_str().into(),
            _ => SqlValue::Null,
        }
    }

    fn assign(&mut self, field: &str, value: SqlValue) -> DaoResult<()> {
        match field {
            "id" => self.id = value.decode(field)?,
            "name" => self.name = value.decode(field)?,
            "salary" => self.salary = value.decode(field)?,
            "deptId" => self.dept_id = value.decode(field)?,
            "scratch" => self.scratch = value.decode(field)?,
            _ => {}
        }
        Ok(())
    }
}

pub const SCHEMA: &[&str] = &[
    "CREATE TABLE department (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL)",
    "CREATE TABLE employee (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        name TEXT NOT NULL,
        salary REAL NOT NULL DEFAULT 0,
        dept_id INTEGER
    )",
];

// =============================================================================
// SQLite setup
// =============================================================================

/// Temp-file SQLite factory. Keep the returned file alive for the test.
pub async fn sqlite_factory() -> (SqlxConnectionFactory, NamedTempFile) {
    let file = NamedTempFile::new().unwrap();
    let url = format!("sqlite:{}", file.path().display());
    let factory = SqlxConnectionFactory::connect(&url).await.unwrap();
    (factory, file)
}

pub async fn create_schema(dao: &Dao) {
    for ddl in SCHEMA {
        dao.execute_update(ddl, &[]).await.unwrap();
    }
}

/// DAO over a fresh SQLite database with the department/employee schema.
pub async fn sqlite_dao() -> (Dao, NamedTempFile) {
    let (factory, file) = sqlite_factory().await;
    let dao = Dao::new(Arc::new(factory), Arc::new(SqliteDialect));
    create_schema(&dao).await;
    (dao, file)
}

// =============================================================================
// Instrumented connections
// =============================================================================

/// Wraps a real factory and records every statement it runs.
pub struct RecordingFactory {
    inner: Arc<dyn ConnectionFactory>,
    pub log: Arc<Mutex<Vec<String>>>,
}

impl RecordingFactory {
    pub fn new(inner: Arc<dyn ConnectionFactory>) -> Self {
        Self {
            inner,
            log: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Statements seen so far that contain `needle`.
    pub fn count_matching(&self, needle: &str) -> usize {
        self.log
            .lock()
            .unwrap()
            .iter()
            .filter(|sql| sql.contains(needle))
            .count()
    }

    pub fn clear(&self) {
        self.log.lock().unwrap().clear();
    }
}

struct RecordingConnection {
    inner: Box<dyn Connection>,
    log: Arc<Mutex<Vec<String>>>,
}

#[async_trait]
impl ConnectionFactory for RecordingFactory {
    async fn acquire(&self) -> DaoResult<Box<dyn Connection>> {
        let inner = self.inner.acquire().await?;
        Ok(Box::new(RecordingConnection {
            inner,
            log: self.log.clone(),
        }))
    }

    async fn begin(&self) -> DaoResult<Box<dyn Connection>> {
        self.log.lock().unwrap().push("BEGIN".to_string());
        let inner = self.inner.begin().await?;
        Ok(Box::new(RecordingConnection {
            inner,
            log: self.log.clone(),
        }))
    }

    async fn release(&self, conn: Box<dyn Connection>) {
        drop(conn);
    }
}

#[async_trait]
impl Connection for RecordingConnection {
    fn kind(&self) -> DatabaseType {
        self.inner.kind()
    }

    async fn query(&mut self, sql: &str, params: &[SqlValue]) -> DaoResult<CachedResultSet> {
        self.log.lock().unwrap().push(sql.to_string());
        self.inner.query(sql, params).await
    }

    async fn execute(
        &mut self,
        sql: &str,
        params: &[SqlValue],
        generated_key_columns: &[String],
    ) -> DaoResult<ExecOutcome> {
        self.log.lock().unwrap().push(sql.to_string());
        self.inner.execute(sql, params, generated_key_columns).await
    }

    async fn commit(&mut self) -> DaoResult<()> {
        self.inner.commit().await
    }

    async fn rollback(&mut self) -> DaoResult<()> {
        self.inner.rollback().await
    }

    async fn is_valid(&mut self) -> bool {
        self.inner.is_valid().await
    }
}

/// In-memory factory that counts leases and can be told to fail.
///
/// Statements containing `STALL` never complete. A transaction connection
/// dropped before it finishes records `ROLLBACK ON DROP`.
#[derive(Default)]
pub struct ScriptedFactory {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub fail_commit: bool,
    pub invalid: bool,
    pub calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedFactory {
    pub fn outstanding(&self) -> usize {
        self.acquired.load(Ordering::SeqCst) - self.released.load(Ordering::SeqCst)
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

struct ScriptedConnection {
    fail_commit: bool,
    invalid: bool,
    in_transaction: bool,
    calls: Arc<Mutex<Vec<String>>>,
}

impl ScriptedConnection {
    fn record(&self, sql: &str) {
        self.calls.lock().unwrap().push(sql.to_string());
    }
}

impl Drop for ScriptedConnection {
    fn drop(&mut self) {
        if self.in_transaction {
            self.record("ROLLBACK ON DROP");
        }
    }
}

impl ScriptedFactory {
    fn lease(&self, in_transaction: bool) -> Box<dyn Connection> {
        self.acquired.fetch_add(1, Ordering::SeqCst);
        Box::new(ScriptedConnection {
            fail_commit: self.fail_commit,
            invalid: self.invalid,
            in_transaction,
            calls: self.calls.clone(),
        })
    }
}

#[async_trait]
impl ConnectionFactory for ScriptedFactory {
    async fn acquire(&self) -> DaoResult<Box<dyn Connection>> {
        Ok(self.lease(false))
    }

    async fn begin(&self) -> DaoResult<Box<dyn Connection>> {
        self.calls.lock().unwrap().push("BEGIN".to_string());
        Ok(self.lease(true))
    }

    async fn release(&self, conn: Box<dyn Connection>) {
        self.released.fetch_add(1, Ordering::SeqCst);
        drop(conn);
    }
}

#[async_trait]
impl Connection for ScriptedConnection {
    fn kind(&self) -> DatabaseType {
        DatabaseType::SQLite
    }

    async fn query(&mut self, sql: &str, _params: &[SqlValue]) -> DaoResult<CachedResultSet> {
        self.record(sql);
        if sql.contains("STALL") {
            std::future::pending::<()>().await;
        }
        Ok(CachedResultSet::empty())
    }

    async fn execute(
        &mut self,
        sql: &str,
        _params: &[SqlValue],
        _generated_key_columns: &[String],
    ) -> DaoResult<ExecOutcome> {
        self.record(sql);
        Ok(ExecOutcome {
            rows_affected: 1,
            generated_keys: Vec::new(),
        })
    }

    async fn commit(&mut self) -> DaoResult<()> {
        self.in_transaction = false;
        self.record("COMMIT");
        if self.fail_commit {
            return Err(DaoError::query("commit refused", None, "retry the transaction"));
        }
        Ok(())
    }

    async fn rollback(&mut self) -> DaoResult<()> {
        self.in_transaction = false;
        self.record("ROLLBACK");
        Ok(())
    }

    async fn is_valid(&mut self) -> bool {
        !self.invalid
    }
}
