//! Database access layer.
//!
//! This module provides:
//! - The connection contracts the DAO engine runs on
//! - sqlx pool management and the pooled connection implementation
//! - Parameter binding and per-driver row decoding
//! - Detached, cursor-style result sets

pub mod connection;
pub mod params;
pub mod pool;
pub mod result_set;
pub mod types;

pub use connection::{Connection, ConnectionFactory};
pub use pool::{DbPool, SqlxConnection, SqlxConnectionFactory};
pub use result_set::{CachedResultSet, ColumnRef};
