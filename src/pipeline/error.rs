//! Error types for pipeline operations
//!
//! Stage errors wrap the error of the task that failed, so the chain can be
//! walked for debugging while `user_message()` gives CLI-friendly output.

use std::path::PathBuf;
use thiserror::Error;

use crate::aggregate::AggregateError;
use crate::extract::ExtractError;
use crate::frame::RowWidthError;
use crate::load::LoadError;
use crate::transform::TransformError;

/// Error raised by the work inside one stage
#[derive(Error, Debug)]
pub enum TaskError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Transform(#[from] TransformError),

    #[error(transparent)]
    Aggregate(#[from] AggregateError),

    #[error(transparent)]
    Load(#[from] LoadError),

    #[error(transparent)]
    Frame(#[from] RowWidthError),

    /// An upstream stage output is not available
    #[error("Input from stage '{0}' is not available")]
    MissingInput(&'static str),
}

impl TaskError {
    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            TaskError::Extract(e) => e.user_message(),
            TaskError::Transform(e) => e.user_message(),
            TaskError::Load(LoadError::Warehouse(e)) => e.user_message(),
            _ => self.to_string(),
        }
    }
}

/// Errors that can occur during pipeline execution
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Pipeline configuration error
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Stage failed with underlying cause
    #[error("Stage '{stage}' failed: {source}")]
    StageFailure {
        stage: String,
        #[source]
        source: TaskError,
    },

    /// Run record error
    #[error("Run record error: {0}")]
    RecordError(String),

    /// IO error with path context
    #[error("IO error with {path}: {message}")]
    IoErrorWithPath {
        path: PathBuf,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// JSON error
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// File not found
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),
}

/// Result type for pipeline operations
pub type PipelineResult<T> = Result<T, PipelineError>;

impl PipelineError {
    /// Create a stage failure with underlying error
    pub fn stage_failure(stage: impl Into<String>, source: impl Into<TaskError>) -> Self {
        Self::StageFailure {
            stage: stage.into(),
            source: source.into(),
        }
    }

    /// Create an IO error with path context
    pub fn io_with_path(
        path: impl Into<PathBuf>,
        message: impl Into<String>,
        source: std::io::Error,
    ) -> Self {
        Self::IoErrorWithPath {
            path: path.into(),
            message: message.into(),
            source,
        }
    }

    /// Get the stage name if this is a stage error
    pub fn stage_name(&self) -> Option<&str> {
        match self {
            PipelineError::StageFailure { stage, .. } => Some(stage),
            _ => None,
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            PipelineError::ConfigError(msg) => {
                format!(
                    "Configuration error: {msg}\n\nHint: Check your pipeline configuration file and stage selection."
                )
            }
            PipelineError::StageFailure { stage, source } => {
                format!("Stage '{stage}' failed: {}", source.user_message())
            }
            PipelineError::FileNotFound(path) => {
                format!(
                    "File not found: {}\n\nHint: Check that the file exists and the path is correct.",
                    path.display()
                )
            }
            PipelineError::RecordError(msg) => {
                format!(
                    "Run record error: {msg}\n\nHint: Run the pipeline at least once, or pass the record path explicitly."
                )
            }
            _ => self.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_failure() {
        let err = PipelineError::stage_failure(
            "extract",
            ExtractError::FileNotFound(PathBuf::from("/data/sample_orders.csv")),
        );
        assert!(err.to_string().contains("extract"));
        assert!(err.to_string().contains("sample_orders.csv"));
        assert_eq!(err.stage_name(), Some("extract"));
        assert!(err.user_message().contains("Hint:"));
    }

    #[test]
    fn test_io_with_path() {
        let io_err = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = PipelineError::io_with_path("/path/to/file", "writing run record", io_err);
        let display = err.to_string();
        assert!(display.contains("/path/to/file"));
        assert!(display.contains("writing run record"));
        assert_eq!(err.stage_name(), None);
    }

    #[test]
    fn test_user_message() {
        let err = PipelineError::ConfigError("bad selection".to_string());
        let msg = err.user_message();
        assert!(msg.contains("bad selection"));
        assert!(msg.contains("Hint:"));

        let err = PipelineError::FileNotFound(PathBuf::from("/data/pipeline.run.json"));
        let msg = err.user_message();
        assert!(msg.contains("/data/pipeline.run.json"));
        assert!(msg.contains("Hint:"));
    }

    #[test]
    fn test_missing_input() {
        let err = PipelineError::stage_failure("aggregate", TaskError::MissingInput("extract"));
        assert!(err.to_string().contains("Input from stage 'extract'"));
    }
}
