//! In-memory warehouse

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use tracing::debug;

use super::{LoadOutcome, LoadRequest, Warehouse, WarehouseError, WarehouseResult, validate_identifier};
use crate::frame::{Frame, Row};
use crate::schema;

#[derive(Debug, Clone)]
struct Table {
    frame: Frame,
    keys: HashSet<Vec<String>>,
}

#[derive(Debug, Default)]
struct State {
    tables: HashMap<String, Table>,
    refreshed: Vec<String>,
    failures: HashMap<String, String>,
}

/// Warehouse that keeps tables in process memory
///
/// Rows are keyed by the primary keys of the table catalogue and a row whose
/// key already exists is skipped. Keys with a null part never conflict.
/// Every call works on a staged copy that replaces the table only when the
/// whole request succeeded.
#[derive(Debug, Default)]
pub struct MemoryWarehouse {
    state: Mutex<State>,
}

impl MemoryWarehouse {
    /// Create an empty warehouse
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call touching `name` (table or view) fail
    pub fn with_failure(self, name: impl Into<String>, message: impl Into<String>) -> Self {
        self.fail(name, message);
        self
    }

    /// Make every call touching `name` (table or view) fail from now on
    pub fn fail(&self, name: impl Into<String>, message: impl Into<String>) {
        self.lock().failures.insert(name.into(), message.into());
    }

    /// Stop failing calls touching `name`
    pub fn clear_failure(&self, name: &str) {
        self.lock().failures.remove(name);
    }

    /// Snapshot of a table, rows in insertion order
    pub fn table(&self, name: &str) -> Option<Frame> {
        self.lock().tables.get(name).map(|t| t.frame.clone())
    }

    /// Number of rows in a table; zero when it was never loaded
    pub fn row_count(&self, name: &str) -> usize {
        self.lock().tables.get(name).map_or(0, |t| t.frame.len())
    }

    /// Views refreshed so far, in call order
    pub fn refreshed_views(&self) -> Vec<String> {
        self.lock().refreshed.clone()
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn key_of(row: &Row, positions: &[usize]) -> Option<Vec<String>> {
    positions.iter().map(|&i| row[i].clone()).collect()
}

#[async_trait]
impl Warehouse for MemoryWarehouse {
    async fn load(&self, request: LoadRequest) -> WarehouseResult<LoadOutcome> {
        request.validate()?;
        let submitted = request.submitted();
        let key_columns = schema::key_columns(&request.table)
            .ok_or_else(|| WarehouseError::UnknownTable(request.table.clone()))?;
        let positions = key_columns
            .iter()
            .map(|key| {
                request
                    .columns
                    .iter()
                    .position(|c| c == key)
                    .ok_or_else(|| {
                        WarehouseError::Database(format!(
                            "key column {key} of {} missing from insert",
                            request.table
                        ))
                    })
            })
            .collect::<WarehouseResult<Vec<_>>>()?;

        let mut state = self.lock();
        if let Some(message) = state.failures.get(&request.table) {
            return Err(WarehouseError::Database(message.clone()));
        }

        let mut staged = match state.tables.get(&request.table) {
            Some(table) if !request.truncate_first => table.clone(),
            _ => Table {
                frame: Frame::new(request.columns.clone()),
                keys: HashSet::new(),
            },
        };
        if staged.frame.columns() != request.columns.as_slice() {
            return Err(WarehouseError::Database(format!(
                "column list of {} does not match the stored table",
                request.table
            )));
        }

        let mut inserted = 0u64;
        for (index, row) in request.phases.into_iter().flatten().enumerate() {
            if let Some(key) = key_of(&row, &positions) {
                if !staged.keys.insert(key) {
                    continue;
                }
            }
            staged
                .frame
                .push_row(row)
                .map_err(|e| WarehouseError::RowWidth {
                    table: request.table.clone(),
                    row: index + 1,
                    expected: e.expected,
                    found: e.found,
                })?;
            inserted += 1;
        }

        debug!(table = %request.table, inserted, "Committed in-memory load");
        state.tables.insert(request.table, staged);
        Ok(LoadOutcome {
            submitted,
            inserted,
        })
    }

    async fn refresh_view(&self, name: &str) -> WarehouseResult<()> {
        let name = validate_identifier(name)?;
        let mut state = self.lock();
        if let Some(message) = state.failures.get(name) {
            return Err(WarehouseError::Database(message.clone()));
        }
        state.refreshed.push(name.to_string());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::{DIM_TIME_COLUMNS, DIM_TIME_TABLE};

    fn row(values: &[&str]) -> Row {
        values.iter().map(|v| Some(v.to_string())).collect()
    }

    fn categories(rows: Vec<Row>) -> LoadRequest {
        LoadRequest::new("product_categories", &["category_id", "name"], rows)
    }

    #[tokio::test]
    async fn test_conflicting_keys_are_skipped() {
        let warehouse = MemoryWarehouse::new();
        let first = warehouse
            .load(categories(vec![row(&["1", "Books"]), row(&["2", "Toys"])]))
            .await
            .unwrap();
        assert_eq!(first.inserted, 2);

        let second = warehouse
            .load(categories(vec![row(&["1", "Books again"]), row(&["3", "Garden"])]))
            .await
            .unwrap();
        assert_eq!(second.submitted, 2);
        assert_eq!(second.inserted, 1);
        assert_eq!(second.skipped(), 1);

        let table = warehouse.table("product_categories").unwrap();
        assert_eq!(table.len(), 3);
        assert_eq!(table.rows()[0][1].as_deref(), Some("Books"));
    }

    #[tokio::test]
    async fn test_duplicate_keys_within_one_request() {
        let warehouse = MemoryWarehouse::new();
        let outcome = warehouse
            .load(categories(vec![row(&["1", "a"]), row(&["1", "b"])]))
            .await
            .unwrap();
        assert_eq!(outcome.inserted, 1);
    }

    #[tokio::test]
    async fn test_failure_leaves_table_untouched() {
        let warehouse = MemoryWarehouse::new();
        warehouse
            .load(categories(vec![row(&["1", "Books"])]))
            .await
            .unwrap();

        warehouse.fail("product_categories", "connection reset");
        let err = warehouse
            .load(categories(vec![row(&["2", "Toys"])]))
            .await
            .unwrap_err();
        assert!(matches!(err, WarehouseError::Database(ref m) if m == "connection reset"));
        assert_eq!(warehouse.row_count("product_categories"), 1);

        warehouse.clear_failure("product_categories");
        assert!(warehouse.load(categories(vec![row(&["2", "Toys"])])).await.is_ok());
    }

    #[tokio::test]
    async fn test_truncate_replaces_rows() {
        let warehouse = MemoryWarehouse::new();
        let day = |date: &str| {
            let mut r = row(&[date]);
            r.resize(DIM_TIME_COLUMNS.len(), Some("1".into()));
            r
        };
        let request = |dates: &[&str]| {
            LoadRequest::new(DIM_TIME_TABLE, DIM_TIME_COLUMNS, dates.iter().map(|d| day(d)).collect())
                .with_truncate(true)
        };

        warehouse.load(request(&["2021-01-01", "2021-01-02"])).await.unwrap();
        let outcome = warehouse.load(request(&["2021-01-02"])).await.unwrap();
        assert_eq!(outcome.inserted, 1);
        assert_eq!(warehouse.row_count(DIM_TIME_TABLE), 1);
    }

    #[tokio::test]
    async fn test_unknown_table() {
        let warehouse = MemoryWarehouse::new();
        let err = warehouse
            .load(LoadRequest::new("audit_log", &["id"], vec![row(&["1"])]))
            .await
            .unwrap_err();
        assert!(matches!(err, WarehouseError::UnknownTable(_)));
    }

    #[tokio::test]
    async fn test_refresh_view() {
        let warehouse = MemoryWarehouse::new().with_failure("broken_view", "missing relation");
        warehouse.refresh_view("product_sales_summary").await.unwrap();
        assert!(warehouse.refresh_view("broken_view").await.is_err());
        assert!(warehouse.refresh_view("bad name").await.is_err());
        assert_eq!(warehouse.refreshed_views(), vec!["product_sales_summary"]);
    }
}
