//! Entity DAO Library
//!
//! A data-access engine that maps Rust types onto relational tables through
//! declared metadata and runs find / list / save / update / delete, raw SQL
//! and manual transactions against SQLite, PostgreSQL and MySQL, with
//! engine-specific SQL supplied by a pluggable dialect.

pub mod config;
pub mod dao;
pub mod db;
pub mod dialect;
pub mod entity;
pub mod error;
pub mod mapping;
pub mod models;

pub use config::{Config, DaoSettings};
pub use dao::{BatchFailure, BatchOutcome, Dao, Persisted};
pub use db::{CachedResultSet, Connection, ConnectionFactory, SqlxConnectionFactory};
pub use dialect::{Dialect, dialect_for};
pub use entity::{Collection, Entity, EntityDecl, Lazy, Reference};
pub use error::{DaoError, DaoResult};
pub use models::{EntityMetadata, Page, RowMap, SqlValue, ValueKind};
