//! Run record written after every stage transition
//!
//! The record is a status report for operators and for `pipeline status`.
//! Runs always start from the first selected stage; the record is never used
//! to skip work.

use std::collections::BTreeMap;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::config::PipelineStage;
use super::error::{PipelineError, PipelineResult};
use crate::warehouse::LoadOutcome;

/// Pipeline run state
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunRecord {
    /// Unique pipeline run ID
    pub run_id: String,
    /// When the pipeline started
    pub started_at: DateTime<Utc>,
    /// When the record was last updated
    pub updated_at: DateTime<Utc>,
    /// Current status
    pub status: PipelineStatus,
    /// Completed stages, in completion order
    pub completed_stages: Vec<PipelineStage>,
    /// Current stage (if running)
    pub current_stage: Option<PipelineStage>,
    /// Stage outputs keyed by stage name
    pub stage_outputs: BTreeMap<String, StageOutput>,
    /// Error message if failed
    pub error: Option<String>,
    /// SHA-256 of the effective configuration
    pub config_hash: String,
}

impl RunRecord {
    /// Create a new record for a pipeline run
    pub fn new(run_id: impl Into<String>, config_hash: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            run_id: run_id.into(),
            started_at: now,
            updated_at: now,
            status: PipelineStatus::Running,
            completed_stages: Vec::new(),
            current_stage: None,
            stage_outputs: BTreeMap::new(),
            error: None,
            config_hash: config_hash.into(),
        }
    }

    /// Mark a stage as started
    pub fn start_stage(&mut self, stage: PipelineStage) {
        self.current_stage = Some(stage);
        self.updated_at = Utc::now();
    }

    /// Mark a stage as completed
    pub fn complete_stage(&mut self, stage: PipelineStage, output: StageOutput) {
        self.completed_stages.push(stage);
        self.stage_outputs.insert(stage.name().to_string(), output);
        self.current_stage = None;
        self.updated_at = Utc::now();
    }

    /// Mark pipeline as completed
    pub fn complete(&mut self) {
        self.status = PipelineStatus::Completed;
        self.current_stage = None;
        self.updated_at = Utc::now();
    }

    /// Mark pipeline as failed; the failing stage stays current
    pub fn fail(&mut self, error: impl Into<String>) {
        self.status = PipelineStatus::Failed;
        self.error = Some(error.into());
        self.updated_at = Utc::now();
    }

    /// Check if a stage has been completed
    pub fn is_stage_completed(&self, stage: PipelineStage) -> bool {
        self.completed_stages.contains(&stage)
    }

    /// Get output from a completed stage
    pub fn get_stage_output(&self, stage: PipelineStage) -> Option<&StageOutput> {
        self.stage_outputs.get(stage.name())
    }

    /// Calculate duration so far
    pub fn duration(&self) -> chrono::Duration {
        self.updated_at - self.started_at
    }

    /// Save the record to a file, creating its directory if needed
    pub fn save(&self, path: &Path) -> PipelineResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| {
                PipelineError::io_with_path(parent, "creating run record directory", e)
            })?;
        }
        let json = serde_json::to_string_pretty(self)?;
        std::fs::write(path, json)
            .map_err(|e| PipelineError::io_with_path(path, "writing run record", e))?;
        Ok(())
    }

    /// Load a record from file
    pub fn load(path: &Path) -> PipelineResult<Self> {
        if !path.exists() {
            return Err(PipelineError::FileNotFound(path.to_path_buf()));
        }
        let json = std::fs::read_to_string(path)
            .map_err(|e| PipelineError::io_with_path(path, "reading run record", e))?;
        let record: Self = serde_json::from_str(&json)?;
        Ok(record)
    }
}

/// Pipeline execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PipelineStatus {
    /// Pipeline is running
    Running,
    /// Pipeline completed successfully
    Completed,
    /// Pipeline failed
    Failed,
}

impl std::fmt::Display for PipelineStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

/// Output from a pipeline stage
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageOutput {
    /// Stage-specific metadata (row counts, tables)
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Duration in milliseconds
    pub duration_ms: u64,
    /// Timestamp
    pub timestamp: DateTime<Utc>,
}

impl StageOutput {
    /// Create an empty stage output
    pub fn success() -> Self {
        Self {
            metadata: BTreeMap::new(),
            duration_ms: 0,
            timestamp: Utc::now(),
        }
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Record transformation counts
    pub fn with_rows(self, rows_in: usize, rows_dropped: usize) -> Self {
        self.with_metadata("rows_in", serde_json::json!(rows_in))
            .with_metadata("rows_dropped", serde_json::json!(rows_dropped))
    }

    /// Record a load outcome
    pub fn with_load(self, outcome: &LoadOutcome) -> Self {
        self.with_metadata("submitted", serde_json::json!(outcome.submitted))
            .with_metadata("inserted", serde_json::json!(outcome.inserted))
    }

    /// Set duration
    pub fn with_duration(mut self, ms: u64) -> Self {
        self.duration_ms = ms;
        self
    }

    /// Read an integer metadata value
    pub fn count(&self, key: &str) -> Option<u64> {
        self.metadata.get(key).and_then(serde_json::Value::as_u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_record_new() {
        let record = RunRecord::new("run-123", "config-hash");
        assert_eq!(record.run_id, "run-123");
        assert_eq!(record.status, PipelineStatus::Running);
        assert!(record.completed_stages.is_empty());
    }

    #[test]
    fn test_record_stage_lifecycle() {
        let mut record = RunRecord::new("run-123", "hash");

        record.start_stage(PipelineStage::Extract);
        assert_eq!(record.current_stage, Some(PipelineStage::Extract));

        record.complete_stage(
            PipelineStage::Extract,
            StageOutput::success().with_metadata("orders", serde_json::json!(1000)),
        );
        assert!(record.is_stage_completed(PipelineStage::Extract));
        assert!(record.current_stage.is_none());
        assert_eq!(
            record
                .get_stage_output(PipelineStage::Extract)
                .unwrap()
                .count("orders"),
            Some(1000)
        );
    }

    #[test]
    fn test_record_fail_keeps_current_stage() {
        let mut record = RunRecord::new("run-123", "hash");
        record.start_stage(PipelineStage::LoadOrders);
        record.fail("Database connection failed");
        assert_eq!(record.status, PipelineStatus::Failed);
        assert_eq!(record.current_stage, Some(PipelineStage::LoadOrders));
        assert_eq!(record.error, Some("Database connection failed".to_string()));
    }

    #[test]
    fn test_stage_output_counts() {
        let outcome = LoadOutcome {
            submitted: 10,
            inserted: 7,
        };
        let output = StageOutput::success()
            .with_rows(12, 2)
            .with_load(&outcome)
            .with_duration(1500);

        assert_eq!(output.count("rows_in"), Some(12));
        assert_eq!(output.count("rows_dropped"), Some(2));
        assert_eq!(output.count("submitted"), Some(10));
        assert_eq!(output.count("inserted"), Some(7));
        assert_eq!(output.duration_ms, 1500);
    }

    #[test]
    fn test_save_and_load() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("nested").join("pipeline.run.json");

        let mut record = RunRecord::new("run-1", "hash");
        record.complete_stage(PipelineStage::DimTime, StageOutput::success());
        record.complete();
        record.save(&path).unwrap();

        let loaded = RunRecord::load(&path).unwrap();
        assert_eq!(loaded.run_id, "run-1");
        assert_eq!(loaded.status, PipelineStatus::Completed);
        assert_eq!(loaded.completed_stages, vec![PipelineStage::DimTime]);

        assert!(matches!(
            RunRecord::load(&temp.path().join("missing.json")),
            Err(PipelineError::FileNotFound(_))
        ));
    }
}
