//! CLI error type

use thiserror::Error;

use crate::config::ConfigError;
use crate::pipeline::PipelineError;
use crate::query::QueryError;
use crate::warehouse::WarehouseError;

/// Errors surfaced by CLI commands
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Pipeline(#[from] PipelineError),

    #[error(transparent)]
    Query(#[from] QueryError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error("Failed to write output: {0}")]
    Output(#[from] serde_json::Error),
}

impl CliError {
    /// Get a user-friendly error message
    pub fn user_message(&self) -> String {
        match self {
            CliError::Config(e) => e.user_message(),
            CliError::Pipeline(e) => e.user_message(),
            CliError::Query(e) => e.user_message(),
            CliError::Warehouse(e) => e.user_message(),
            _ => self.to_string(),
        }
    }
}
