//! shop-etl - ETL pipeline and query layer for an e-commerce analytics warehouse
//!
//! Provides:
//! - Chunked CSV extraction and consolidation
//! - Per-entity cleaning and typing
//! - Calendar dimension generation
//! - Daily sales aggregation
//! - Conflict-skipping bulk loads into PostgreSQL (or an in-memory store)
//! - A staged pipeline executor with a persisted run record
//! - Parameterized reporting queries and product updates

pub mod aggregate;
pub mod config;
pub mod dimension;
pub mod extract;
pub mod frame;
pub mod load;
pub mod pipeline;
pub mod query;
pub mod schema;
pub mod transform;
pub mod warehouse;

#[cfg(feature = "cli")]
pub mod cli;

// Re-export commonly used types
pub use aggregate::{AggregateError, DailySales, daily_sales, daily_sales_rows};
pub use config::{AppConfig, ConfigError, WarehouseConfig};
pub use dimension::{CalendarDay, DimensionError, calendar, dim_time_rows};
pub use extract::{CsvChunks, ExtractError, extract_csv, read_table};
pub use frame::{Cell, Frame, Row, RowWidthError};
pub use load::{LoadError, load_categories, load_daily_sales, load_rows, populate_dim_time};
pub use pipeline::{
    PipelineConfig, PipelineError, PipelineExecutor, PipelineReport, PipelineStage, RunRecord,
    run_pipeline,
};
pub use query::{QueryError, QueryService};
pub use schema::Entity;
pub use transform::{TransformError, Transformed, transform_entity};
pub use warehouse::{
    LoadOutcome, LoadRequest, MemoryWarehouse, PostgresWarehouse, Warehouse, WarehouseError,
};
