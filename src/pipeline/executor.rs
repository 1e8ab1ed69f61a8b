//! Pipeline executor for running the ETL stages

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Instant;

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::{Instrument, debug, error, info, info_span, warn};
use uuid::Uuid;

use super::config::{PipelineConfig, PipelineStage};
use super::error::{PipelineError, PipelineResult, TaskError};
use super::record::{PipelineStatus, RunRecord, StageOutput};
use crate::aggregate::daily_sales_rows;
use crate::extract::read_table;
use crate::frame::{Frame, Row};
use crate::load;
use crate::schema::Entity;
use crate::transform::transform_entity;
use crate::warehouse::Warehouse;

/// Consolidated source tables, shared read-only between stages
pub type SourceTables = BTreeMap<Entity, Frame>;

/// Outputs handed from one stage to the next
#[derive(Debug, Default)]
struct StageData {
    sources: Option<Arc<SourceTables>>,
    daily_sales: Option<Arc<Vec<Row>>>,
}

/// Pipeline executor that runs the selected stages in declared order
pub struct PipelineExecutor {
    config: PipelineConfig,
    warehouse: Arc<dyn Warehouse>,
    record: RunRecord,
    data: StageData,
}

impl PipelineExecutor {
    /// Create a new pipeline executor
    pub fn new(config: PipelineConfig, warehouse: Arc<dyn Warehouse>) -> PipelineResult<Self> {
        config.validate().map_err(PipelineError::ConfigError)?;

        let config_hash = Self::hash_config(&config)?;
        let run_id = Uuid::new_v4().to_string();

        Ok(Self {
            config,
            warehouse,
            record: RunRecord::new(run_id, config_hash),
            data: StageData::default(),
        })
    }

    /// Get the current run record
    pub fn record(&self) -> &RunRecord {
        &self.record
    }

    /// Run the pipeline
    pub async fn run(&mut self) -> PipelineResult<PipelineReport> {
        let span = info_span!(
            "pipeline_run",
            run_id = %self.record.run_id,
            dry_run = self.config.dry_run
        );
        self.run_inner().instrument(span).await
    }

    async fn run_inner(&mut self) -> PipelineResult<PipelineReport> {
        let start = Instant::now();
        let stages = self.config.effective_stages();

        info!(
            run_id = %self.record.run_id,
            stages = ?stages.iter().map(|s| s.name()).collect::<Vec<_>>(),
            dry_run = self.config.dry_run,
            "Starting pipeline"
        );

        if self.config.verbose {
            eprintln!("Pipeline run: {}", self.record.run_id);
            eprintln!(
                "Stages to run: {:?}",
                stages.iter().map(|s| s.name()).collect::<Vec<_>>()
            );
            if self.config.dry_run {
                eprintln!("DRY RUN MODE - no changes will be made");
            }
        }

        if self.config.dry_run {
            return self.dry_run(&stages);
        }

        for stage in &stages {
            let stage_span = info_span!("pipeline_stage", stage = stage.name());
            info!(
                parent: &stage_span,
                stage = stage.name(),
                index = stage.index(),
                "Starting stage"
            );

            if self.config.verbose {
                eprintln!("Running stage {} ({})...", stage.name(), stage.description());
            }

            self.record.start_stage(*stage);
            self.save_record()?;

            match self.run_stage(*stage).instrument(stage_span.clone()).await {
                Ok(output) => {
                    info!(
                        parent: &stage_span,
                        stage = stage.name(),
                        duration_ms = output.duration_ms,
                        "Stage completed"
                    );
                    if self.config.verbose {
                        eprintln!(
                            "Stage {} completed in {}ms",
                            stage.name(),
                            output.duration_ms
                        );
                    }
                    self.record.complete_stage(*stage, output);
                    self.save_record()?;
                }
                Err(e) => {
                    error!(parent: &stage_span, stage = stage.name(), error = %e, "Stage failed");
                    return Err(self.fail_run(e));
                }
            }
        }

        self.record.complete();
        self.save_record()?;

        let duration = start.elapsed();
        info!(
            run_id = %self.record.run_id,
            duration_ms = duration.as_millis() as u64,
            stages_completed = self.record.completed_stages.len(),
            "Pipeline completed"
        );

        Ok(PipelineReport {
            run_id: self.record.run_id.clone(),
            status: self.record.status,
            stages_completed: self.record.completed_stages.clone(),
            duration_ms: duration.as_millis() as u64,
            outputs: self.record.stage_outputs.clone(),
        })
    }

    /// Run a single stage
    async fn run_stage(&mut self, stage: PipelineStage) -> PipelineResult<StageOutput> {
        let start = Instant::now();

        let result = match stage {
            PipelineStage::DimTime => self.run_dim_time().await,
            PipelineStage::Extract => self.run_extract(),
            PipelineStage::LoadCategories
            | PipelineStage::LoadProducts
            | PipelineStage::LoadCustomers
            | PipelineStage::LoadOrders
            | PipelineStage::LoadOrderItems => self.run_load_entity(stage).await,
            PipelineStage::Aggregate => self.run_aggregate(),
            PipelineStage::LoadDailySales => self.run_load_daily_sales().await,
            PipelineStage::RefreshViews => self.run_refresh_views().await,
        };

        result
            .map(|output| output.with_duration(start.elapsed().as_millis() as u64))
            .map_err(|e| PipelineError::stage_failure(stage.name(), e))
    }

    /// Regenerate the time dimension
    async fn run_dim_time(&self) -> Result<StageOutput, TaskError> {
        let (start, end) = (self.config.dim_start, self.config.dim_end);
        let rows = load::populate_dim_time(self.warehouse.as_ref(), start, end).await?;

        Ok(StageOutput::success()
            .with_metadata("start", serde_json::json!(start.to_string()))
            .with_metadata("end", serde_json::json!(end.to_string()))
            .with_metadata("rows", serde_json::json!(rows)))
    }

    /// Read and consolidate every source file
    fn run_extract(&mut self) -> Result<StageOutput, TaskError> {
        let mut tables = SourceTables::new();
        let mut output = StageOutput::success();

        for entity in Entity::all() {
            let path = self.config.source_path(entity);
            debug!(table = entity.table_name(), path = %path.display(), "Extracting source");
            let frame = read_table(&path, self.config.chunk_size)?;

            info!(table = entity.table_name(), rows = frame.len(), "Extracted source");
            if self.config.verbose {
                eprintln!("  {}: {} rows", entity.table_name(), frame.len());
            }
            output = output.with_metadata(entity.table_name(), serde_json::json!(frame.len()));
            tables.insert(entity, frame);
        }

        self.data.sources = Some(Arc::new(tables));
        Ok(output)
    }

    fn sources(&self) -> Result<Arc<SourceTables>, TaskError> {
        self.data
            .sources
            .clone()
            .ok_or(TaskError::MissingInput(PipelineStage::Extract.name()))
    }

    /// Transform and load one entity
    async fn run_load_entity(&self, stage: PipelineStage) -> Result<StageOutput, TaskError> {
        let Some(entity) = stage.entity() else {
            return Err(TaskError::MissingInput(stage.name()));
        };
        let sources = self.sources()?;
        let frame = sources
            .get(&entity)
            .ok_or(TaskError::MissingInput(PipelineStage::Extract.name()))?;
        let orders = match entity {
            Entity::Customers => sources.get(&Entity::Orders),
            _ => None,
        };

        let transformed = transform_entity(entity, frame, orders)?;
        let warehouse = self.warehouse.as_ref();
        let outcome = match entity {
            Entity::ProductCategories => load::load_categories(warehouse, &transformed).await?,
            _ => load::load_rows(warehouse, &transformed).await?,
        };

        if outcome.skipped() > 0 {
            debug!(
                table = entity.table_name(),
                skipped = outcome.skipped(),
                "Skipped rows with existing keys"
            );
        }
        if self.config.verbose {
            eprintln!(
                "  {}: {} submitted, {} inserted, {} dropped",
                entity.table_name(),
                outcome.submitted,
                outcome.inserted,
                transformed.rows_dropped
            );
        }

        Ok(StageOutput::success()
            .with_metadata("table", serde_json::json!(entity.table_name()))
            .with_rows(transformed.rows_in, transformed.rows_dropped)
            .with_load(&outcome))
    }

    /// Compute the daily sales rollup over the cleaned order items
    ///
    /// Items are cleaned the same way the order item load cleans them, so
    /// revenue and units match the loaded fact rows.
    fn run_aggregate(&mut self) -> Result<StageOutput, TaskError> {
        let sources = self.sources()?;
        let table = |entity: Entity| {
            sources
                .get(&entity)
                .ok_or(TaskError::MissingInput(PipelineStage::Extract.name()))
        };

        let order_items = transform_entity(Entity::OrderItems, table(Entity::OrderItems)?, None)?
            .into_frame()?;
        let rows = daily_sales_rows(
            &order_items,
            table(Entity::Products)?,
            table(Entity::Orders)?,
        )?;
        let groups = rows.len();
        let null_keys = rows.iter().filter(|r| r[..3].iter().any(Option::is_none)).count();
        if null_keys > 0 {
            warn!(groups = null_keys, "Daily sales groups with unjoinable keys");
        }

        self.data.daily_sales = Some(Arc::new(rows));
        Ok(StageOutput::success().with_metadata("groups", serde_json::json!(groups)))
    }

    /// Load the daily sales rollup
    async fn run_load_daily_sales(&self) -> Result<StageOutput, TaskError> {
        let rows = self
            .data
            .daily_sales
            .clone()
            .ok_or(TaskError::MissingInput(PipelineStage::Aggregate.name()))?;
        let outcome = load::load_daily_sales(self.warehouse.as_ref(), rows.to_vec()).await?;

        Ok(StageOutput::success()
            .with_metadata("table", serde_json::json!(crate::schema::DAILY_SALES_TABLE))
            .with_load(&outcome))
    }

    /// Refresh the sales summary view
    async fn run_refresh_views(&self) -> Result<StageOutput, TaskError> {
        let inserted = self
            .record
            .get_stage_output(PipelineStage::LoadOrderItems)
            .and_then(|o| o.count("inserted"))
            .unwrap_or(0);
        info!(view = %self.config.view_name, order_items_inserted = inserted, "Refreshing view");

        load::refresh_view(self.warehouse.as_ref(), &self.config.view_name).await?;
        Ok(StageOutput::success().with_metadata("view", serde_json::json!(self.config.view_name)))
    }

    /// Run in dry-run mode (validation only)
    fn dry_run(&self, stages: &[PipelineStage]) -> PipelineResult<PipelineReport> {
        let mut validation_errors = Vec::new();

        for stage in stages {
            if let Err(e) = self.validate_stage(*stage) {
                validation_errors.push(format!("{}: {}", stage.name(), e));
            }
        }

        if !validation_errors.is_empty() {
            return Err(PipelineError::ConfigError(format!(
                "Validation errors:\n  {}",
                validation_errors.join("\n  ")
            )));
        }

        info!(stages = stages.len(), "Dry run validation passed");
        if self.config.verbose {
            eprintln!("Dry run validation passed for all stages");
        }

        Ok(PipelineReport {
            run_id: self.record.run_id.clone(),
            status: PipelineStatus::Completed,
            stages_completed: Vec::new(),
            duration_ms: 0,
            outputs: BTreeMap::new(),
        })
    }

    /// Validate a stage's inputs
    fn validate_stage(&self, stage: PipelineStage) -> PipelineResult<()> {
        if stage == PipelineStage::Extract {
            for entity in Entity::all() {
                let path = self.config.source_path(entity);
                if !path.is_file() {
                    return Err(PipelineError::FileNotFound(path));
                }
            }
        }
        Ok(())
    }

    /// Save the run record to disk
    fn save_record(&self) -> PipelineResult<()> {
        self.record.save(&self.config.record_path())
    }

    /// Mark the run failed and persist the record
    ///
    /// A record that cannot be written is only logged; the stage error is
    /// returned either way.
    fn fail_run(&mut self, error: PipelineError) -> PipelineError {
        self.record.fail(&error.to_string());
        if let Err(save_err) = self.save_record() {
            warn!(error = %save_err, "Failed to save run record after stage failure");
        }
        error
    }

    /// Hash the effective config for the run record
    fn hash_config(config: &PipelineConfig) -> PipelineResult<String> {
        let mut hasher = Sha256::new();
        hasher.update(serde_json::to_vec(config)?);
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Report from a pipeline run
#[derive(Debug, Clone, Serialize)]
pub struct PipelineReport {
    /// Run ID
    pub run_id: String,
    /// Final status
    pub status: PipelineStatus,
    /// Completed stages
    pub stages_completed: Vec<PipelineStage>,
    /// Total duration in milliseconds
    pub duration_ms: u64,
    /// Stage outputs keyed by stage name
    pub outputs: BTreeMap<String, StageOutput>,
}

impl PipelineReport {
    /// Check if pipeline was successful
    pub fn is_success(&self) -> bool {
        self.status == PipelineStatus::Completed
    }

    /// Output of one stage
    pub fn output(&self, stage: PipelineStage) -> Option<&StageOutput> {
        self.outputs.get(stage.name())
    }

    /// Get formatted duration
    pub fn duration_formatted(&self) -> String {
        let secs = self.duration_ms / 1000;
        let mins = secs / 60;
        let remaining_secs = secs % 60;

        if mins > 0 {
            format!("{}m {}s", mins, remaining_secs)
        } else {
            format!("{}s", secs)
        }
    }

    /// Print summary to stderr
    pub fn print_summary(&self) {
        eprintln!();
        eprintln!("Pipeline {} - {}", self.run_id, self.status);
        eprintln!("Duration: {}", self.duration_formatted());
        eprintln!("Stages completed: {}", self.stages_completed.len());

        for stage in &self.stages_completed {
            if let Some(output) = self.output(*stage) {
                let mut line = format!("  - {}: ok ({}ms)", stage.name(), output.duration_ms);
                if let (Some(submitted), Some(inserted)) =
                    (output.count("submitted"), output.count("inserted"))
                {
                    line.push_str(&format!(", {submitted} submitted, {inserted} inserted"));
                }
                if let Some(dropped) = output.count("rows_dropped").filter(|d| *d > 0) {
                    line.push_str(&format!(", {dropped} dropped"));
                }
                eprintln!("{line}");
            }
        }
    }
}
