//! Error types for extraction

use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while reading a CSV source
#[derive(Error, Debug)]
pub enum ExtractError {
    /// Source file missing
    #[error("File not found: {0}")]
    FileNotFound(PathBuf),

    /// Chunk size of zero
    #[error("Invalid chunk size: {0}")]
    InvalidChunkSize(usize),

    /// Malformed CSV
    #[error("Malformed CSV in {path} at line {line}: {message}")]
    Malformed {
        path: PathBuf,
        line: u64,
        message: String,
    },

    /// Chunks with different headers cannot be concatenated
    #[error("Header mismatch while concatenating chunks: expected {expected:?}, found {found:?}")]
    HeaderMismatch {
        expected: Vec<String>,
        found: Vec<String>,
    },

    /// IO error with path context
    #[error("IO error reading {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Result type for extraction
pub type ExtractResult<T> = Result<T, ExtractError>;

impl ExtractError {
    /// Build an extraction error from a csv reader error
    pub(crate) fn from_csv(path: &std::path::Path, err: csv::Error) -> Self {
        let line = err.position().map(|p| p.line()).unwrap_or(0);
        let message = err.to_string();
        match err.into_kind() {
            csv::ErrorKind::Io(source) => ExtractError::Io {
                path: path.to_path_buf(),
                source,
            },
            _ => ExtractError::Malformed {
                path: path.to_path_buf(),
                line,
                message,
            },
        }
    }

    /// Get a user-friendly error message for CLI output
    pub fn user_message(&self) -> String {
        match self {
            ExtractError::FileNotFound(path) => format!(
                "File not found: {}\n\nHint: Generate the dataset first or pass the file path explicitly.",
                path.display()
            ),
            ExtractError::Malformed { path, line, .. } => format!(
                "{self}\n\nHint: Check {} around line {line}; every row needs one value per header column.",
                path.display()
            ),
            _ => self.to_string(),
        }
    }
}
