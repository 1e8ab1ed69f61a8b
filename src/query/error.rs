//! Error types for warehouse queries

use thiserror::Error;

/// Errors that can occur while building or running a query
#[derive(Error, Debug)]
pub enum QueryError {
    /// Argument rejected before any SQL runs
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Product update carried neither a name nor a price
    #[error("No fields to update")]
    NoFields,

    /// Product does not exist
    #[error("Product {0} not found")]
    NotFound(i64),

    /// Could not obtain a connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement failed
    #[error("Database error: {0}")]
    Database(String),
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;

impl QueryError {
    /// Create an invalid argument error
    pub fn invalid(message: impl Into<String>) -> Self {
        Self::InvalidArgument(message.into())
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            QueryError::NoFields => {
                "No fields to update\n\nHint: Pass --name, --price or both.".to_string()
            }
            QueryError::Connection(msg) => format!(
                "Connection error: {msg}\n\nHint: Check DATABASE_HOST, DATABASE_PORT and the credentials in your configuration."
            ),
            _ => self.to_string(),
        }
    }
}

impl From<tokio_postgres::Error> for QueryError {
    fn from(err: tokio_postgres::Error) -> Self {
        QueryError::Database(err.to_string())
    }
}

impl From<deadpool_postgres::PoolError> for QueryError {
    fn from(err: deadpool_postgres::PoolError) -> Self {
        QueryError::Connection(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_message() {
        assert!(QueryError::NoFields.user_message().contains("Hint:"));
        assert_eq!(
            QueryError::NotFound(42).user_message(),
            "Product 42 not found"
        );
        assert!(
            QueryError::invalid("limit must not be negative")
                .to_string()
                .contains("limit")
        );
    }
}
