//! Error types for transformation

use thiserror::Error;

/// Errors that can occur while transforming a frame
#[derive(Error, Debug, PartialEq)]
pub enum TransformError {
    /// Required column missing from the source
    #[error("Column '{column}' required by {table} is missing from the source")]
    MissingColumn { table: String, column: String },

    /// A value could not be cast to the column's type
    #[error("Invalid {expected} value {value:?} in {table}.{column} at row {row}")]
    InvalidValue {
        table: String,
        column: String,
        row: usize,
        value: String,
        expected: &'static str,
    },
}

/// Result type for transformation
pub type TransformResult<T> = Result<T, TransformError>;

impl TransformError {
    pub(crate) fn invalid(
        table: &str,
        column: &str,
        row: usize,
        value: &str,
        expected: &'static str,
    ) -> Self {
        TransformError::InvalidValue {
            table: table.to_string(),
            column: column.to_string(),
            row: row + 1,
            value: value.to_string(),
            expected,
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            TransformError::MissingColumn { table, column } => format!(
                "{self}\n\nHint: The {table} source file needs a '{column}' header column."
            ),
            _ => self.to_string(),
        }
    }
}
