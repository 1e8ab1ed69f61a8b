//! ETL pipeline orchestration
//!
//! This module runs the static stage graph that moves the e-commerce CSV
//! sources into the warehouse:
//! - Calendar dimension regeneration
//! - Extraction and consolidation of the five source files
//! - Per-entity transformation and load, in foreign-key order
//! - Daily sales aggregation and load
//! - Materialized view refresh
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use shop_etl::pipeline::{PipelineConfig, PipelineExecutor};
//! use shop_etl::warehouse::PostgresWarehouse;
//!
//! let warehouse = Arc::new(PostgresWarehouse::new(&app.warehouse)?);
//! let config = PipelineConfig::new()
//!     .with_data_dir("ecommerce_data")
//!     .with_chunk_size(5_000);
//!
//! let mut executor = PipelineExecutor::new(config, warehouse)?;
//! let report = executor.run().await?;
//!
//! println!("Pipeline completed in {}", report.duration_formatted());
//! ```
//!
//! # Pipeline Stages
//!
//! 1. **dim-time**: Truncate and regenerate `dim_time`
//! 2. **extract**: Read every source in chunks and consolidate
//! 3. **load-categories**: Root categories first, then children
//! 4. **load-products**
//! 5. **load-customers**: With `lifetime_value` derived from orders
//! 6. **load-orders**
//! 7. **load-order-items**: With `total` recomputed
//! 8. **aggregate**: Daily sales per date, product and category
//! 9. **load-daily-sales**
//! 10. **refresh-views**: `REFRESH MATERIALIZED VIEW product_sales_summary`
//!
//! Stages run sequentially in this order. A selection of stages must include
//! every dependency of the selected stages. The first failure aborts the run;
//! stages committed before it stay committed, and a rerun is safe because
//! loads skip existing keys.
//!
//! # Dry Run
//!
//! Validate inputs without touching the warehouse:
//!
//! ```rust,ignore
//! let config = PipelineConfig::new().with_dry_run(true);
//! let mut executor = PipelineExecutor::new(config, warehouse)?;
//! executor.run().await?;
//! ```

mod config;
mod error;
mod executor;
mod graph;
mod record;

pub use config::{PipelineConfig, PipelineStage, RUN_RECORD_FILE, SourcePaths};
pub use error::{PipelineError, PipelineResult, TaskError};
pub use executor::{PipelineExecutor, PipelineReport, SourceTables};
pub use graph::{stage_graph, validate_declared_order, validate_selection};
pub use record::{PipelineStatus, RunRecord, StageOutput};

use std::sync::Arc;

use crate::warehouse::Warehouse;

/// Run a pipeline with the given configuration
///
/// This is a convenience function for simple pipeline execution.
pub async fn run_pipeline(
    config: PipelineConfig,
    warehouse: Arc<dyn Warehouse>,
) -> PipelineResult<PipelineReport> {
    let mut executor = PipelineExecutor::new(config, warehouse)?;
    executor.run().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::MemoryWarehouse;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_run_pipeline_dry_run() {
        let temp = TempDir::new().unwrap();
        let orders = temp.path().join("orders.csv");
        std::fs::write(&orders, "order_id\n1\n").unwrap();

        let config = PipelineConfig::new()
            .with_data_dir(temp.path())
            .with_source(crate::schema::Entity::Orders, &orders)
            .with_dry_run(true)
            .with_stages(vec![PipelineStage::DimTime]);

        let report = run_pipeline(config, Arc::new(MemoryWarehouse::new()))
            .await
            .unwrap();
        assert!(report.is_success());
        assert!(report.stages_completed.is_empty());
    }
}
