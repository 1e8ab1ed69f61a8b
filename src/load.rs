//! Load tasks
//!
//! Thin wrappers that turn transformed rows into [`LoadRequest`]s with the
//! right shape for each destination: plain bulk inserts for most entities,
//! a two-phase insert for the self-referencing category table, and a
//! truncate-then-insert for the calendar dimension.

use chrono::NaiveDate;
use thiserror::Error;
use tracing::info;

use crate::dimension::{DimensionError, dim_time_rows};
use crate::frame::Row;
use crate::schema::{DAILY_SALES_COLUMNS, DAILY_SALES_TABLE, DIM_TIME_COLUMNS, DIM_TIME_TABLE};
use crate::transform::Transformed;
use crate::warehouse::{LoadOutcome, LoadRequest, Warehouse, WarehouseError};

/// Errors raised by a load task
#[derive(Error, Debug)]
pub enum LoadError {
    #[error(transparent)]
    Dimension(#[from] DimensionError),

    #[error(transparent)]
    Warehouse(#[from] WarehouseError),
}

/// Result type for load tasks
pub type LoadResult<T> = Result<T, LoadError>;

/// Bulk insert transformed rows, skipping existing keys
pub async fn load_rows<W>(warehouse: &W, data: &Transformed) -> LoadResult<LoadOutcome>
where
    W: Warehouse + ?Sized,
{
    let request = LoadRequest::new(data.table.as_str(), &data.column_refs(), data.rows.clone());
    Ok(warehouse.load(request).await?)
}

/// Split category rows into root rows and child rows
///
/// Rows without a `parent_id` column are all treated as roots.
pub fn category_phases(data: &Transformed) -> (Vec<Row>, Vec<Row>) {
    match data.columns.iter().position(|c| c == "parent_id") {
        Some(parent) => data
            .rows
            .iter()
            .cloned()
            .partition(|row| row[parent].is_none()),
        None => (data.rows.clone(), Vec::new()),
    }
}

/// Insert categories in two passes: null-parent rows first, then the rest
///
/// Both passes share one transaction, so a child row can reference a root
/// inserted by the first pass.
pub async fn load_categories<W>(warehouse: &W, data: &Transformed) -> LoadResult<LoadOutcome>
where
    W: Warehouse + ?Sized,
{
    let (roots, children) = category_phases(data);
    info!(
        table = %data.table,
        roots = roots.len(),
        children = children.len(),
        "Loading categories in two passes"
    );
    let request = LoadRequest::new(data.table.as_str(), &data.column_refs(), Vec::new())
        .with_phases(vec![roots, children]);
    Ok(warehouse.load(request).await?)
}

/// Regenerate the calendar dimension for `[start, end]`
///
/// The table is truncated and refilled in one transaction. Returns the
/// number of rows generated.
pub async fn populate_dim_time<W>(warehouse: &W, start: NaiveDate, end: NaiveDate) -> LoadResult<usize>
where
    W: Warehouse + ?Sized,
{
    let rows = dim_time_rows(start, end)?;
    let generated = rows.len();
    let request = LoadRequest::new(DIM_TIME_TABLE, DIM_TIME_COLUMNS, rows).with_truncate(true);
    warehouse.load(request).await?;
    info!(%start, %end, rows = generated, "Populated time dimension");
    Ok(generated)
}

/// Insert daily rollup rows, skipping existing keys
pub async fn load_daily_sales<W>(warehouse: &W, rows: Vec<Row>) -> LoadResult<LoadOutcome>
where
    W: Warehouse + ?Sized,
{
    let request = LoadRequest::new(DAILY_SALES_TABLE, DAILY_SALES_COLUMNS, rows);
    Ok(warehouse.load(request).await?)
}

/// Refresh a materialized view
pub async fn refresh_view<W>(warehouse: &W, name: &str) -> LoadResult<()>
where
    W: Warehouse + ?Sized,
{
    warehouse.refresh_view(name).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::MemoryWarehouse;

    fn categories() -> Transformed {
        let row = |id: &str, parent: Option<&str>| {
            vec![Some(id.to_string()), Some(format!("c{id}")), parent.map(str::to_string)]
        };
        Transformed {
            table: "product_categories".into(),
            columns: vec!["category_id".into(), "name".into(), "parent_id".into()],
            rows: vec![row("3", Some("1")), row("1", None), row("4", Some("2")), row("2", None)],
            rows_in: 4,
            rows_dropped: 0,
        }
    }

    #[test]
    fn test_category_phases() {
        let (roots, children) = category_phases(&categories());
        let ids = |rows: &[Row]| rows.iter().map(|r| r[0].clone().unwrap()).collect::<Vec<_>>();
        assert_eq!(ids(&roots), vec!["1", "2"]);
        assert_eq!(ids(&children), vec!["3", "4"]);
    }

    #[tokio::test]
    async fn test_roots_inserted_before_children() {
        let warehouse = MemoryWarehouse::new();
        let outcome = load_categories(&warehouse, &categories()).await.unwrap();
        assert_eq!(outcome.inserted, 4);

        let table = warehouse.table("product_categories").unwrap();
        let parents: Vec<_> = table.column_values(2).collect();
        assert_eq!(parents, vec![None, None, Some("1"), Some("2")]);
    }

    #[tokio::test]
    async fn test_dim_time_rerun_is_idempotent() {
        let warehouse = MemoryWarehouse::new();
        let start = NaiveDate::from_ymd_opt(2024, 2, 27).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();

        assert_eq!(populate_dim_time(&warehouse, start, end).await.unwrap(), 4);
        assert_eq!(populate_dim_time(&warehouse, start, end).await.unwrap(), 4);
        assert_eq!(warehouse.row_count(DIM_TIME_TABLE), 4);
    }

    #[tokio::test]
    async fn test_dim_time_inverted_range() {
        let warehouse = MemoryWarehouse::new();
        let start = NaiveDate::from_ymd_opt(2024, 3, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2024, 2, 1).unwrap();
        let err = populate_dim_time(&warehouse, start, end).await.unwrap_err();
        assert!(matches!(err, LoadError::Dimension(_)));
        assert_eq!(warehouse.row_count(DIM_TIME_TABLE), 0);
    }
}
