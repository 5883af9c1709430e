//! Error types for the database access layer.
//!
//! Every failure surfaced by this crate is a [`DbError`]. Driver failures from
//! sqlx are normalized into [`DbError::Access`], which keeps the original
//! message so callers can see what the store actually reported.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    /// Fatal wiring problem detected before touching a connection.
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    /// Uniform error for anything that went wrong while talking to the store.
    #[error("Database access error: {message}")]
    Access {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        #[source]
        source: Option<Box<DbError>>,
    },

    /// Positional data did not have the shape the operation requires.
    #[error("Data shape error: {message}")]
    DataShape { message: String },

    /// Unexpected failure raised by application code inside a unit of work.
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DbError {
    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create an access error without SQL state.
    pub fn access(message: impl Into<String>) -> Self {
        Self::Access {
            message: message.into(),
            sql_state: None,
            source: None,
        }
    }

    /// Create an access error carrying the store's SQL state.
    pub fn access_with_state(message: impl Into<String>, sql_state: Option<String>) -> Self {
        Self::Access {
            message: message.into(),
            sql_state,
            source: None,
        }
    }

    /// Create a data shape error.
    pub fn data_shape(message: impl Into<String>) -> Self {
        Self::DataShape {
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Wrap a failure that escaped a unit of work into the uniform access error.
    ///
    /// The wrapped message always contains the original message.
    pub fn unit_of_work_failed(cause: DbError) -> Self {
        let sql_state = cause.sql_state().map(String::from);
        Self::Access {
            message: format!("unit of work failed: {}", cause),
            sql_state,
            source: Some(Box::new(cause)),
        }
    }

    /// SQLSTATE reported by the store, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Access { sql_state, .. } => sql_state.as_deref(),
            _ => None,
        }
    }

    /// Check if a caller may reasonably retry the operation.
    ///
    /// Covers connection-level failures (SQLSTATE class 08), transaction
    /// rollbacks such as serialization failures and deadlocks (class 40), and
    /// pool acquire timeouts. Nothing in this crate retries on its own.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Access {
                sql_state: Some(code),
                ..
            } => code.starts_with("08") || code.starts_with("40"),
            Self::Access {
                source: Some(inner),
                ..
            } => inner.is_transient(),
            Self::Access { message, .. } => message.starts_with(POOL_TIMEOUT_MESSAGE),
            _ => false,
        }
    }
}

const POOL_TIMEOUT_MESSAGE: &str = "Timed out acquiring a pooled connection";

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::configuration(msg.to_string()),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::access_with_state(db_err.message(), code)
            }
            sqlx::Error::RowNotFound => DbError::access("No rows returned"),
            sqlx::Error::PoolTimedOut => DbError::access(POOL_TIMEOUT_MESSAGE),
            sqlx::Error::PoolClosed => DbError::access("Connection pool is closed"),
            sqlx::Error::Io(io_err) => DbError::access(format!("I/O error: {}", io_err)),
            sqlx::Error::Tls(tls_err) => DbError::access(format!("TLS error: {}", tls_err)),
            sqlx::Error::Protocol(msg) => DbError::access(format!("Protocol error: {}", msg)),
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::access(format!("Type not found: {}", type_name))
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::access(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::access(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::access(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::access(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::access("Database worker crashed"),
            _ => DbError::access(format!("Unknown database error: {}", err)),
        }
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = DbError::configuration("no connection source");
        assert!(err.to_string().contains("Configuration error"));
        assert!(err.to_string().contains("no connection source"));
    }

    #[test]
    fn test_unit_of_work_failed_keeps_original_message() {
        let original = DbError::internal("inventory underflow for sku 42");
        let wrapped = DbError::unit_of_work_failed(original);
        assert!(matches!(wrapped, DbError::Access { .. }));
        assert!(wrapped.to_string().contains("inventory underflow for sku 42"));
        let source = std::error::Error::source(&wrapped).unwrap();
        assert!(source.to_string().contains("inventory underflow"));
    }

    #[test]
    fn test_unit_of_work_failed_keeps_sql_state() {
        let original = DbError::access_with_state("deadlock detected", Some("40P01".to_string()));
        let wrapped = DbError::unit_of_work_failed(original);
        assert_eq!(wrapped.sql_state(), Some("40P01"));
        assert!(wrapped.is_transient());
    }

    #[test]
    fn test_transient_classification() {
        assert!(DbError::access_with_state("gone", Some("08006".to_string())).is_transient());
        assert!(DbError::from(sqlx::Error::PoolTimedOut).is_transient());
        assert!(!DbError::access_with_state("syntax", Some("42601".to_string())).is_transient());
        assert!(!DbError::data_shape("short key set").is_transient());
        assert!(!DbError::configuration("missing").is_transient());
    }

    #[test]
    fn test_sqlx_configuration_maps_to_configuration() {
        let err = DbError::from(sqlx::Error::Configuration("bad url".into()));
        assert!(matches!(err, DbError::Configuration { .. }));
    }

    #[test]
    fn test_sqlx_row_not_found_maps_to_access() {
        let err = DbError::from(sqlx::Error::RowNotFound);
        assert!(matches!(err, DbError::Access { .. }));
        assert!(err.sql_state().is_none());
    }
}
