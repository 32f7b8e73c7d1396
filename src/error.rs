//! Error types for the entity DAO.
//!
//! Every fallible operation in the crate returns [`DaoResult`]. Variants carry
//! enough context (entity type, SQLSTATE, a suggestion) for callers to decide
//! whether to retry, fix their mapping, or fix their SQL.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DaoError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Mapping error for {entity}: {message}")]
    Mapping { message: String, entity: String },

    #[error("Query failed: {message}")]
    Query {
        message: String,
        /// e.g., "23505" for unique violation
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Result not unique: expected at most one row, got {rows}")]
    AmbiguousResult { rows: usize },

    #[error("Operation '{operation}' is not supported by the {dialect} dialect")]
    Unsupported { operation: String, dialect: String },

    #[error("Cannot convert field '{field}': {message}")]
    Conversion { field: String, message: String },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DaoError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a mapping error for an entity type.
    pub fn mapping(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mapping {
            message: message.into(),
            entity: entity.into(),
        }
    }

    /// Create a query error with optional SQL state.
    pub fn query(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Query {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    pub fn ambiguous(rows: usize) -> Self {
        Self::AmbiguousResult { rows }
    }

    pub fn unsupported(operation: impl Into<String>, dialect: impl Into<String>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
            dialect: dialect.into(),
        }
    }

    pub fn conversion(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Conversion {
            field: field.into(),
            message: message.into(),
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Query { suggestion, .. } => Some(suggestion),
            Self::Mapping { .. } => Some("Check the entity declaration for table and key fields"),
            Self::AmbiguousResult { .. } => {
                Some("Narrow the query conditions or use a list operation")
            }
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Connection { .. })
    }
}

/// Convert sqlx errors to DaoError.
impl From<sqlx::Error> for DaoError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DaoError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DaoError::query(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DaoError::query(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DaoError::connection(
                "Timed out acquiring a pooled connection",
                "Increase acquire_timeout or max_connections",
            ),
            sqlx::Error::PoolClosed => {
                DaoError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DaoError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DaoError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DaoError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::ColumnNotFound(col) => DaoError::query(
                format!("Column not found: {}", col),
                None,
                "Check the selected columns",
            ),
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DaoError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DaoError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DaoError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DaoError::internal("Database worker crashed"),
            _ => DaoError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for DAO operations.
pub type DaoResult<T> = Result<T, DaoError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DaoError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));

        let err = DaoError::mapping("Employee", "no primary key declared");
        assert_eq!(
            err.to_string(),
            "Mapping error for Employee: no primary key declared"
        );
    }

    #[test]
    fn test_error_suggestion() {
        let err = DaoError::query("Syntax error", Some("42601".to_string()), "Check SQL syntax");
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert!(DaoError::invalid_input("x").suggestion().is_none());
    }

    #[test]
    fn test_error_retryable() {
        assert!(DaoError::connection("err", "sugg").is_retryable());
        assert!(!DaoError::ambiguous(2).is_retryable());
        assert!(!DaoError::unsupported("batch insert", "oracle").is_retryable());
    }

    #[test]
    fn test_ambiguous_result_mentions_row_count() {
        assert!(DaoError::ambiguous(3).to_string().contains("got 3"));
    }

    #[test]
    fn test_from_sqlx_pool_closed() {
        let err: DaoError = sqlx::Error::PoolClosed.into();
        assert!(matches!(err, DaoError::Connection { .. }));
    }

    #[test]
    fn test_from_sqlx_row_not_found() {
        let err: DaoError = sqlx::Error::RowNotFound.into();
        assert!(matches!(err, DaoError::Query { sql_state: None, .. }));
    }
}
