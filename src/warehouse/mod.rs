//! Warehouse backends
//!
//! The pipeline only needs two operations from the relational store: a bulk
//! insert that skips rows whose key already exists, and a materialized view
//! refresh. Both run on one connection inside one transaction; a failure
//! rolls the whole call back.
//!
//! - [`PostgresWarehouse`]: pooled PostgreSQL connections
//! - [`MemoryWarehouse`]: in-process tables for tests and local runs

mod memory;
mod postgres;

pub use memory::MemoryWarehouse;
pub use postgres::{PostgresWarehouse, insert_statement, rows_to_json};

use async_trait::async_trait;
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::frame::Row;

/// Errors raised by a warehouse backend
#[derive(Error, Debug)]
pub enum WarehouseError {
    /// Table, column or view name is not a plain identifier
    #[error("Invalid SQL identifier: {0:?}")]
    InvalidIdentifier(String),

    /// Row width does not match the column list
    #[error("Row {row} of {table} has {found} values, expected {expected}")]
    RowWidth {
        table: String,
        row: usize,
        expected: usize,
        found: usize,
    },

    /// Could not obtain a connection
    #[error("Connection error: {0}")]
    Connection(String),

    /// Statement failed; the transaction was rolled back
    #[error("Database error: {0}")]
    Database(String),

    /// Table is unknown to the backend
    #[error("Unknown table: {0}")]
    UnknownTable(String),
}

/// Result type for warehouse operations
pub type WarehouseResult<T> = Result<T, WarehouseError>;

impl WarehouseError {
    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            WarehouseError::Connection(msg) => format!(
                "Connection error: {msg}\n\nHint: Check DATABASE_HOST, DATABASE_PORT and the credentials in your configuration."
            ),
            WarehouseError::UnknownTable(table) => format!(
                "Unknown table: {table}\n\nHint: Create the warehouse schema before running the pipeline."
            ),
            _ => self.to_string(),
        }
    }
}

static IDENTIFIER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[a-z_][a-z0-9_]*$").unwrap());

/// Check that a name is a plain lower-case SQL identifier
pub fn validate_identifier(name: &str) -> WarehouseResult<&str> {
    if IDENTIFIER.is_match(name) {
        Ok(name)
    } else {
        Err(WarehouseError::InvalidIdentifier(name.to_string()))
    }
}

/// A bulk insert into one table
///
/// Phases run in order as separate statements inside the same transaction,
/// so rows of a later phase may reference rows of an earlier one.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub table: String,
    pub columns: Vec<String>,
    pub phases: Vec<Vec<Row>>,
    /// Empty the table before inserting
    pub truncate_first: bool,
}

impl LoadRequest {
    /// Single-phase insert
    pub fn new(table: impl Into<String>, columns: &[&str], rows: Vec<Row>) -> Self {
        Self {
            table: table.into(),
            columns: columns.iter().map(|c| c.to_string()).collect(),
            phases: vec![rows],
            truncate_first: false,
        }
    }

    /// Replace the phases
    pub fn with_phases(mut self, phases: Vec<Vec<Row>>) -> Self {
        self.phases = phases;
        self
    }

    /// Empty the table first
    pub fn with_truncate(mut self, truncate: bool) -> Self {
        self.truncate_first = truncate;
        self
    }

    /// Rows submitted across all phases
    pub fn submitted(&self) -> usize {
        self.phases.iter().map(Vec::len).sum()
    }

    /// Check identifiers and row widths
    pub fn validate(&self) -> WarehouseResult<()> {
        validate_identifier(&self.table)?;
        for column in &self.columns {
            validate_identifier(column)?;
        }
        for (index, row) in self.phases.iter().flatten().enumerate() {
            if row.len() != self.columns.len() {
                return Err(WarehouseError::RowWidth {
                    table: self.table.clone(),
                    row: index + 1,
                    expected: self.columns.len(),
                    found: row.len(),
                });
            }
        }
        Ok(())
    }
}

/// Result of a bulk insert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadOutcome {
    /// Rows handed to the warehouse
    pub submitted: usize,
    /// Rows actually inserted; conflicts are not counted
    pub inserted: u64,
}

impl LoadOutcome {
    /// Rows skipped because their key already existed
    pub fn skipped(&self) -> u64 {
        (self.submitted as u64).saturating_sub(self.inserted)
    }
}

/// A relational store the pipeline loads into
#[async_trait]
pub trait Warehouse: Send + Sync {
    /// Insert all rows of a request in one transaction, skipping key conflicts
    async fn load(&self, request: LoadRequest) -> WarehouseResult<LoadOutcome>;

    /// Recompute a materialized view
    async fn refresh_view(&self, name: &str) -> WarehouseResult<()>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_identifier() {
        assert!(validate_identifier("order_items").is_ok());
        assert!(validate_identifier("_tmp1").is_ok());
        assert!(validate_identifier("1table").is_err());
        assert!(validate_identifier("orders; DROP TABLE orders").is_err());
        assert!(validate_identifier("Orders").is_err());
        assert!(validate_identifier("").is_err());
    }

    #[test]
    fn test_request_validation() {
        let request = LoadRequest::new("t", &["a", "b"], vec![vec![Some("1".into()), None]]);
        assert!(request.validate().is_ok());
        assert_eq!(request.submitted(), 1);

        let request = LoadRequest::new("t", &["a", "b"], vec![vec![Some("1".into())]]);
        assert!(matches!(
            request.validate(),
            Err(WarehouseError::RowWidth { expected: 2, found: 1, .. })
        ));

        let request = LoadRequest::new("t", &["a\"b"], vec![]);
        assert!(matches!(
            request.validate(),
            Err(WarehouseError::InvalidIdentifier(_))
        ));
    }

    #[test]
    fn test_outcome_skipped() {
        let outcome = LoadOutcome {
            submitted: 5,
            inserted: 3,
        };
        assert_eq!(outcome.skipped(), 2);
    }
}
