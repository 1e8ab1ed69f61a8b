//! CLI commands for pipeline operations

use std::path::PathBuf;
use std::sync::Arc;

use chrono::NaiveDate;
use clap::Args;
use tracing::info;

use crate::cli::error::CliError;
use crate::cli::output::format_run_record;
use crate::config::AppConfig;
use crate::pipeline::{PipelineError, PipelineExecutor, PipelineStage, RunRecord};
use crate::schema::Entity;
use crate::warehouse::PostgresWarehouse;

/// Arguments for the `pipeline run` command
#[derive(Args, Debug, Clone, Default)]
pub struct PipelineRunArgs {
    /// Directory holding the source CSV files
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Product categories CSV
    #[arg(long)]
    pub categories: Option<PathBuf>,

    /// Products CSV
    #[arg(long)]
    pub products: Option<PathBuf>,

    /// Customers CSV
    #[arg(long)]
    pub customers: Option<PathBuf>,

    /// Orders CSV
    #[arg(long)]
    pub orders: Option<PathBuf>,

    /// Order items CSV
    #[arg(long)]
    pub order_items: Option<PathBuf>,

    /// Rows per extraction chunk
    #[arg(long)]
    pub chunk_size: Option<usize>,

    /// First date of the time dimension (YYYY-MM-DD)
    #[arg(long)]
    pub dim_start: Option<NaiveDate>,

    /// Last date of the time dimension (YYYY-MM-DD)
    #[arg(long)]
    pub dim_end: Option<NaiveDate>,

    /// Stages to run, by name or 1-based index (default: all)
    #[arg(long, value_delimiter = ',')]
    pub stages: Vec<PipelineStage>,

    /// Where to write the run record
    #[arg(long)]
    pub record: Option<PathBuf>,

    /// Validate inputs without touching the warehouse
    #[arg(long)]
    pub dry_run: bool,

    /// Log per-stage detail
    #[arg(short, long)]
    pub verbose: bool,
}

/// Arguments for the `pipeline status` command
#[derive(Args, Debug, Clone, Default)]
pub struct PipelineStatusArgs {
    /// Directory the run wrote its record to
    #[arg(long)]
    pub data_dir: Option<PathBuf>,

    /// Run record to read (default: the configured data directory)
    #[arg(long)]
    pub record: Option<PathBuf>,

    /// Print the raw record as JSON
    #[arg(long)]
    pub json: bool,
}

/// Layer command-line flags over the loaded configuration
pub fn apply_run_args(app: &mut AppConfig, args: &PipelineRunArgs) {
    let mut config = std::mem::take(&mut app.pipeline);

    if let Some(dir) = &args.data_dir {
        config = config.with_data_dir(dir);
    }
    let sources = [
        (Entity::ProductCategories, &args.categories),
        (Entity::Products, &args.products),
        (Entity::Customers, &args.customers),
        (Entity::Orders, &args.orders),
        (Entity::OrderItems, &args.order_items),
    ];
    for (entity, path) in sources {
        if let Some(path) = path {
            config = config.with_source(entity, path);
        }
    }
    if let Some(chunk_size) = args.chunk_size {
        config = config.with_chunk_size(chunk_size);
    }
    let start = args.dim_start.unwrap_or(config.dim_start);
    let end = args.dim_end.unwrap_or(config.dim_end);
    config = config.with_dim_range(start, end);

    if !args.stages.is_empty() {
        config = config.with_stages(args.stages.clone());
    }
    if let Some(record) = &args.record {
        config = config.with_record_path(record);
    }
    if args.dry_run {
        config = config.with_dry_run(true);
    }
    if args.verbose {
        config = config.with_verbose(true);
    }

    app.pipeline = config;
}

/// Handle the `pipeline run` command
pub async fn handle_pipeline_run(mut app: AppConfig, args: &PipelineRunArgs) -> Result<(), CliError> {
    apply_run_args(&mut app, args);

    let warehouse = Arc::new(PostgresWarehouse::new(&app.warehouse)?);
    let mut executor = PipelineExecutor::new(app.pipeline, warehouse)?;

    info!(run_id = %executor.record().run_id, "Starting pipeline run");

    let report = executor.run().await?;
    report.print_summary();

    eprintln!();
    if report.stages_completed.is_empty() {
        eprintln!("Dry run passed; no stages were executed.");
    } else {
        eprintln!("Pipeline completed successfully!");
    }
    Ok(())
}

/// Record path for `pipeline status`, resolved the way `pipeline run` writes it
pub fn status_record_path(app: &AppConfig, args: &PipelineStatusArgs) -> PathBuf {
    if let Some(path) = &args.record {
        return path.clone();
    }
    match &args.data_dir {
        Some(dir) => app.pipeline.clone().with_data_dir(dir).record_path(),
        None => app.pipeline.record_path(),
    }
}

/// Handle the `pipeline status` command
pub fn handle_pipeline_status(app: &AppConfig, args: &PipelineStatusArgs) -> Result<(), CliError> {
    let path = status_record_path(app, args);

    if !path.exists() {
        eprintln!("No run record found at {}", path.display());
        eprintln!("Run 'shop-etl pipeline run' to start a new pipeline.");
        return Ok(());
    }

    let record = RunRecord::load(&path).map_err(|e| {
        PipelineError::RecordError(format!("Failed to load {}: {e}", path.display()))
    })?;

    if args.json {
        crate::cli::output::print_json(&record)?;
    } else {
        eprint!("{}", format_run_record(&record));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pipeline::RUN_RECORD_FILE;

    #[test]
    fn test_apply_run_args() {
        let mut app = AppConfig::default();
        let args = PipelineRunArgs {
            data_dir: Some(PathBuf::from("/srv/exports")),
            orders: Some(PathBuf::from("/tmp/orders.csv")),
            chunk_size: Some(500),
            dim_end: NaiveDate::from_ymd_opt(2022, 12, 31),
            stages: vec![PipelineStage::DimTime],
            dry_run: true,
            ..Default::default()
        };

        apply_run_args(&mut app, &args);
        let config = &app.pipeline;
        assert_eq!(config.data_dir, PathBuf::from("/srv/exports"));
        assert_eq!(config.source_path(Entity::Orders), PathBuf::from("/tmp/orders.csv"));
        assert_eq!(
            config.source_path(Entity::Products),
            PathBuf::from("/srv/exports/sample_products.csv")
        );
        assert_eq!(config.chunk_size, 500);
        assert_eq!(config.dim_start.to_string(), "2021-01-01");
        assert_eq!(config.dim_end.to_string(), "2022-12-31");
        assert_eq!(config.stages, vec![PipelineStage::DimTime]);
        assert!(config.dry_run);
        assert!(!config.verbose);
    }

    #[test]
    fn test_status_without_record() {
        let temp = tempfile::TempDir::new().unwrap();
        let app = AppConfig::default();
        let args = PipelineStatusArgs {
            record: Some(temp.path().join("pipeline.run.json")),
            ..Default::default()
        };
        assert!(handle_pipeline_status(&app, &args).is_ok());
    }

    #[test]
    fn test_status_reads_record_from_run_data_dir() {
        let temp = tempfile::TempDir::new().unwrap();
        let run_args = PipelineRunArgs {
            data_dir: Some(temp.path().to_path_buf()),
            ..Default::default()
        };
        let mut run_app = AppConfig::default();
        apply_run_args(&mut run_app, &run_args);
        let mut record = RunRecord::new("run-42", "hash");
        record.complete();
        record.save(&run_app.pipeline.record_path()).unwrap();

        let app = AppConfig::default();
        let args = PipelineStatusArgs {
            data_dir: Some(temp.path().to_path_buf()),
            json: true,
            ..Default::default()
        };
        let path = status_record_path(&app, &args);
        assert_eq!(path, temp.path().join(RUN_RECORD_FILE));
        assert_eq!(RunRecord::load(&path).unwrap().run_id, "run-42");
        assert!(handle_pipeline_status(&app, &args).is_ok());

        let explicit = PipelineStatusArgs {
            record: Some(PathBuf::from("/tmp/other.run.json")),
            ..args
        };
        assert_eq!(
            status_record_path(&app, &explicit),
            PathBuf::from("/tmp/other.run.json")
        );
    }
}
