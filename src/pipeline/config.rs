//! Pipeline configuration types

use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::graph;
use crate::dimension;
use crate::extract::DEFAULT_CHUNK_SIZE;
use crate::schema::{DEFAULT_DATA_DIR, Entity, PRODUCT_SALES_VIEW};
use crate::warehouse::validate_identifier;

/// File name of the run record inside the data directory
pub const RUN_RECORD_FILE: &str = "pipeline.run.json";

/// Main pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Directory holding the source CSV files
    pub data_dir: PathBuf,
    /// Per-entity source paths overriding the data directory defaults
    pub sources: SourcePaths,
    /// Rows per extraction chunk
    pub chunk_size: usize,
    /// First date of the time dimension
    pub dim_start: NaiveDate,
    /// Last date of the time dimension (inclusive)
    pub dim_end: NaiveDate,
    /// Materialized view refreshed at the end of a run
    pub view_name: String,
    /// Where the run record is written (defaults to the data directory)
    pub record_path: Option<PathBuf>,
    /// Stages to run (empty = all)
    pub stages: Vec<PipelineStage>,
    /// Enable dry-run mode
    pub dry_run: bool,
    /// Verbose output
    pub verbose: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let (dim_start, dim_end) = dimension::default_range();
        Self {
            data_dir: PathBuf::from(DEFAULT_DATA_DIR),
            sources: SourcePaths::default(),
            chunk_size: DEFAULT_CHUNK_SIZE,
            dim_start,
            dim_end,
            view_name: PRODUCT_SALES_VIEW.to_string(),
            record_path: None,
            stages: Vec::new(),
            dry_run: false,
            verbose: false,
        }
    }
}

impl PipelineConfig {
    /// Create a new pipeline config
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the data directory
    pub fn with_data_dir(mut self, path: impl Into<PathBuf>) -> Self {
        self.data_dir = path.into();
        self
    }

    /// Set the source file of one entity
    pub fn with_source(mut self, entity: Entity, path: impl Into<PathBuf>) -> Self {
        *self.sources.slot_mut(entity) = Some(path.into());
        self
    }

    /// Set the extraction chunk size
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    /// Set the time dimension range
    pub fn with_dim_range(mut self, start: NaiveDate, end: NaiveDate) -> Self {
        self.dim_start = start;
        self.dim_end = end;
        self
    }

    /// Set the materialized view to refresh
    pub fn with_view_name(mut self, name: impl Into<String>) -> Self {
        self.view_name = name.into();
        self
    }

    /// Set the run record path
    pub fn with_record_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.record_path = Some(path.into());
        self
    }

    /// Set specific stages to run
    pub fn with_stages(mut self, stages: Vec<PipelineStage>) -> Self {
        self.stages = stages;
        self
    }

    /// Enable dry-run mode
    pub fn with_dry_run(mut self, dry_run: bool) -> Self {
        self.dry_run = dry_run;
        self
    }

    /// Enable verbose output
    pub fn with_verbose(mut self, verbose: bool) -> Self {
        self.verbose = verbose;
        self
    }

    /// Source path of an entity
    pub fn source_path(&self, entity: Entity) -> PathBuf {
        self.sources
            .get(entity)
            .cloned()
            .unwrap_or_else(|| self.data_dir.join(entity.default_file_name()))
    }

    /// Path of the run record
    pub fn record_path(&self) -> PathBuf {
        self.record_path
            .clone()
            .unwrap_or_else(|| self.data_dir.join(RUN_RECORD_FILE))
    }

    /// Get stages to run in execution order (all if empty)
    pub fn effective_stages(&self) -> Vec<PipelineStage> {
        if self.stages.is_empty() {
            PipelineStage::all()
        } else {
            PipelineStage::all()
                .into_iter()
                .filter(|s| self.stages.contains(s))
                .collect()
        }
    }

    /// Check if a specific stage should run
    pub fn should_run_stage(&self, stage: PipelineStage) -> bool {
        self.stages.is_empty() || self.stages.contains(&stage)
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.chunk_size == 0 {
            return Err("Chunk size must be greater than zero".to_string());
        }

        if self.should_run_stage(PipelineStage::DimTime) && self.dim_end < self.dim_start {
            return Err(format!(
                "Time dimension end {} is before start {}",
                self.dim_end, self.dim_start
            ));
        }

        if self.should_run_stage(PipelineStage::RefreshViews) {
            validate_identifier(&self.view_name).map_err(|e| e.to_string())?;
        }

        graph::validate_selection(&self.effective_stages())
    }
}

/// Explicit source file per entity
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourcePaths {
    pub product_categories: Option<PathBuf>,
    pub products: Option<PathBuf>,
    pub customers: Option<PathBuf>,
    pub orders: Option<PathBuf>,
    pub order_items: Option<PathBuf>,
}

impl SourcePaths {
    /// Explicit path of an entity, if set
    pub fn get(&self, entity: Entity) -> Option<&PathBuf> {
        match entity {
            Entity::ProductCategories => self.product_categories.as_ref(),
            Entity::Products => self.products.as_ref(),
            Entity::Customers => self.customers.as_ref(),
            Entity::Orders => self.orders.as_ref(),
            Entity::OrderItems => self.order_items.as_ref(),
        }
    }

    fn slot_mut(&mut self, entity: Entity) -> &mut Option<PathBuf> {
        match entity {
            Entity::ProductCategories => &mut self.product_categories,
            Entity::Products => &mut self.products,
            Entity::Customers => &mut self.customers,
            Entity::Orders => &mut self.orders,
            Entity::OrderItems => &mut self.order_items,
        }
    }
}

/// Pipeline stages
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    /// Regenerate the calendar dimension
    DimTime,
    /// Read and consolidate all source files
    Extract,
    /// Load categories, roots first
    LoadCategories,
    /// Load products
    LoadProducts,
    /// Load customers with their lifetime value
    LoadCustomers,
    /// Load orders
    LoadOrders,
    /// Load order items with recomputed totals
    LoadOrderItems,
    /// Compute the daily sales rollup
    Aggregate,
    /// Load the daily sales rollup
    LoadDailySales,
    /// Refresh the sales summary view
    RefreshViews,
}

impl PipelineStage {
    /// Get all stages in execution order
    pub fn all() -> Vec<Self> {
        vec![
            Self::DimTime,
            Self::Extract,
            Self::LoadCategories,
            Self::LoadProducts,
            Self::LoadCustomers,
            Self::LoadOrders,
            Self::LoadOrderItems,
            Self::Aggregate,
            Self::LoadDailySales,
            Self::RefreshViews,
        ]
    }

    /// Get stage name
    pub fn name(&self) -> &'static str {
        match self {
            Self::DimTime => "dim-time",
            Self::Extract => "extract",
            Self::LoadCategories => "load-categories",
            Self::LoadProducts => "load-products",
            Self::LoadCustomers => "load-customers",
            Self::LoadOrders => "load-orders",
            Self::LoadOrderItems => "load-order-items",
            Self::Aggregate => "aggregate",
            Self::LoadDailySales => "load-daily-sales",
            Self::RefreshViews => "refresh-views",
        }
    }

    /// Get stage description
    pub fn description(&self) -> &'static str {
        match self {
            Self::DimTime => "Regenerate the time dimension",
            Self::Extract => "Extract and consolidate source files",
            Self::LoadCategories => "Load product categories",
            Self::LoadProducts => "Load products",
            Self::LoadCustomers => "Load customers with lifetime value",
            Self::LoadOrders => "Load orders",
            Self::LoadOrderItems => "Load order items",
            Self::Aggregate => "Aggregate daily sales",
            Self::LoadDailySales => "Load daily sales aggregation",
            Self::RefreshViews => "Refresh materialized views",
        }
    }

    /// Stages whose outputs or committed rows this stage needs
    pub fn dependencies(&self) -> &'static [PipelineStage] {
        use PipelineStage::*;
        match self {
            DimTime | Extract => &[],
            LoadCategories => &[Extract],
            LoadProducts => &[Extract, LoadCategories],
            LoadCustomers => &[Extract],
            LoadOrders => &[Extract, LoadCustomers],
            LoadOrderItems => &[Extract, LoadOrders, LoadProducts],
            Aggregate => &[Extract],
            LoadDailySales => &[Aggregate, LoadProducts],
            RefreshViews => &[LoadOrderItems],
        }
    }

    /// Entity loaded by this stage, if any
    pub fn entity(&self) -> Option<Entity> {
        match self {
            Self::LoadCategories => Some(Entity::ProductCategories),
            Self::LoadProducts => Some(Entity::Products),
            Self::LoadCustomers => Some(Entity::Customers),
            Self::LoadOrders => Some(Entity::Orders),
            Self::LoadOrderItems => Some(Entity::OrderItems),
            _ => None,
        }
    }

    /// Get stage index (1-based)
    pub fn index(&self) -> usize {
        Self::all()
            .iter()
            .position(|s| s == self)
            .map_or(0, |i| i + 1)
    }
}

impl std::fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for PipelineStage {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim().to_lowercase().replace('_', "-");
        if let Ok(index) = s.parse::<usize>() {
            return Self::all()
                .get(index.wrapping_sub(1))
                .copied()
                .ok_or_else(|| format!("Unknown stage: {}", s));
        }
        Self::all()
            .into_iter()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| format!("Unknown stage: {}", s))
    }
}
