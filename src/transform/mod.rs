//! Business-rule transformation of consolidated frames
//!
//! Turns a source [`Frame`] into load-ready rows for one destination table:
//! entity rules first, then null-row elision, then consistent numeric typing
//! per column.
//!
//! Entity rules:
//! - `product_categories`: `parent_id` is an integer or null
//! - `order_items`: `total = price * quantity - discount`, always recomputed
//! - `customers`: `lifetime_value` summed from the orders frame when given
//!
//! Nullable columns (`parent_id`, the derived `lifetime_value`) never cause
//! a row to be dropped; every other output column is required.

mod error;

pub use error::{TransformError, TransformResult};

use std::collections::HashMap;

use serde::Serialize;
use tracing::{debug, warn};

use crate::frame::{
    ColumnType, Frame, Row, RowWidthError, format_float, join_key, parse_float, parse_int,
};
use crate::schema::Entity;

/// Load-ready output of a transformation
#[derive(Debug, Clone, Serialize)]
pub struct Transformed {
    /// Destination table
    pub table: String,
    /// Output columns, in insert order
    pub columns: Vec<String>,
    /// Stringified rows
    pub rows: Vec<Row>,
    /// Rows in the source frame
    pub rows_in: usize,
    /// Rows dropped for missing required values
    pub rows_dropped: usize,
}

impl Transformed {
    /// Column names as string slices
    pub fn column_refs(&self) -> Vec<&str> {
        self.columns.iter().map(String::as_str).collect()
    }

    /// Cleaned rows as a frame, for stages that read them back
    pub fn into_frame(self) -> Result<Frame, RowWidthError> {
        Frame::from_rows(self.columns, self.rows)
    }
}

/// Where an output cell comes from
#[derive(Debug, Clone, Copy)]
enum Source {
    Column(usize),
    LineTotal {
        price: usize,
        quantity: usize,
        discount: usize,
    },
    LifetimeValue {
        customer: usize,
    },
}

/// Transform a frame for one of the known entities
pub fn transform_entity(
    entity: Entity,
    frame: &Frame,
    orders: Option<&Frame>,
) -> TransformResult<Transformed> {
    transform(frame, entity.table_name(), entity.columns(), orders)
}

/// Transform a frame into load-ready rows for `table`
///
/// `orders` is only consulted for `customers`, to derive `lifetime_value`.
/// Row order of the input is preserved after filtering.
pub fn transform(
    frame: &Frame,
    table: &str,
    columns: &[&str],
    orders: Option<&Frame>,
) -> TransformResult<Transformed> {
    let entity = Entity::from_table_name(table);
    debug!(table, rows = frame.len(), "Transforming frame");

    let sources = columns
        .iter()
        .map(|column| resolve_source(frame, table, entity, column, orders.is_some()))
        .collect::<TransformResult<Vec<_>>>()?;
    let required: Vec<bool> = columns
        .iter()
        .map(|column| !is_nullable(entity, column))
        .collect();

    let lifetime_values = match orders {
        Some(orders) if entity == Some(Entity::Customers) => Some(lifetime_values(orders)?),
        _ => None,
    };

    let mut rows = Vec::with_capacity(frame.len());
    let mut origins = Vec::with_capacity(frame.len());
    for (index, source_row) in frame.rows().iter().enumerate() {
        let mut row = Vec::with_capacity(sources.len());
        for source in &sources {
            let cell = match *source {
                Source::Column(i) => source_row[i].clone(),
                Source::LineTotal {
                    price,
                    quantity,
                    discount,
                } => line_total(frame, table, source_row, index, price, quantity, discount)?
                    .map(format_float),
                Source::LifetimeValue { customer } => {
                    let total = source_row[customer]
                        .as_deref()
                        .and_then(|id| lifetime_values.as_ref()?.get(&join_key(id)).copied())
                        .unwrap_or(0.0);
                    Some(format_float(total))
                }
            };
            row.push(cell);
        }

        let complete = row
            .iter()
            .zip(&required)
            .all(|(cell, required)| !required || cell.is_some());
        if complete {
            rows.push(row);
            origins.push(index);
        }
    }

    for (position, column) in columns.iter().enumerate() {
        let ty = forced_type(entity, column)
            .unwrap_or_else(|| ColumnType::infer(rows.iter().map(|r| r[position].as_deref())));
        for (row, origin) in rows.iter_mut().zip(&origins) {
            if let Some(value) = row[position].take() {
                row[position] = Some(render(&value, ty, table, column, *origin)?);
            }
        }
    }

    let rows_dropped = frame.len() - rows.len();
    if rows_dropped > 0 {
        warn!(table, rows_dropped, "Dropped rows with missing required values");
    }

    Ok(Transformed {
        table: table.to_string(),
        columns: columns.iter().map(|c| c.to_string()).collect(),
        rows,
        rows_in: frame.len(),
        rows_dropped,
    })
}

fn resolve_source(
    frame: &Frame,
    table: &str,
    entity: Option<Entity>,
    column: &str,
    has_orders: bool,
) -> TransformResult<Source> {
    let index = |name: &str| {
        frame
            .column_index(name)
            .ok_or_else(|| TransformError::MissingColumn {
                table: table.to_string(),
                column: name.to_string(),
            })
    };

    match (entity, column) {
        (Some(Entity::OrderItems), "total") => Ok(Source::LineTotal {
            price: index("price")?,
            quantity: index("quantity")?,
            discount: index("discount")?,
        }),
        (Some(Entity::Customers), "lifetime_value")
            if has_orders || frame.column_index(column).is_none() =>
        {
            Ok(Source::LifetimeValue {
                customer: index("customer_id")?,
            })
        }
        _ => index(column).map(Source::Column),
    }
}

fn is_nullable(entity: Option<Entity>, column: &str) -> bool {
    entity.is_some_and(|e| {
        e.columns().contains(&column) && !e.required_columns().contains(&column)
    })
}

fn forced_type(entity: Option<Entity>, column: &str) -> Option<ColumnType> {
    match (entity?, column) {
        (Entity::OrderItems, "price" | "discount" | "total") => Some(ColumnType::Float),
        (Entity::OrderItems, "quantity") => Some(ColumnType::Integer),
        (Entity::Customers, "lifetime_value") => Some(ColumnType::Float),
        (Entity::ProductCategories, "parent_id") => Some(ColumnType::Integer),
        _ => None,
    }
}

fn render(
    value: &str,
    ty: ColumnType,
    table: &str,
    column: &str,
    row: usize,
) -> TransformResult<String> {
    match ty {
        ColumnType::Integer => parse_int(value)
            .map(|v| v.to_string())
            .ok_or_else(|| TransformError::invalid(table, column, row, value, "integer")),
        ColumnType::Float => parse_float(value)
            .map(format_float)
            .ok_or_else(|| TransformError::invalid(table, column, row, value, "float")),
        ColumnType::Text => Ok(value.to_string()),
    }
}

/// Revenue of one order item, or `None` when an input is null
#[allow(clippy::too_many_arguments)]
fn line_total(
    frame: &Frame,
    table: &str,
    row: &Row,
    index: usize,
    price: usize,
    quantity: usize,
    discount: usize,
) -> TransformResult<Option<f64>> {
    let cell = |i: usize| row[i].as_deref();
    let name = |i: usize| frame.columns()[i].as_str();

    let (Some(p), Some(q), Some(d)) = (cell(price), cell(quantity), cell(discount)) else {
        return Ok(None);
    };
    let p = parse_float(p)
        .ok_or_else(|| TransformError::invalid(table, name(price), index, p, "float"))?;
    let q = parse_int(q)
        .ok_or_else(|| TransformError::invalid(table, name(quantity), index, q, "integer"))?;
    let d = parse_float(d)
        .ok_or_else(|| TransformError::invalid(table, name(discount), index, d, "float"))?;

    Ok(Some(p * q as f64 - d))
}

/// Sum of `total_amount` per `customer_id`
///
/// Null amounts contribute nothing; keys are normalized with [`join_key`].
pub fn lifetime_values(orders: &Frame) -> TransformResult<HashMap<String, f64>> {
    let missing = |column: &str| TransformError::MissingColumn {
        table: Entity::Orders.table_name().to_string(),
        column: column.to_string(),
    };
    let customer = orders
        .column_index("customer_id")
        .ok_or_else(|| missing("customer_id"))?;
    let amount = orders
        .column_index("total_amount")
        .ok_or_else(|| missing("total_amount"))?;

    let mut totals: HashMap<String, f64> = HashMap::new();
    for (index, row) in orders.rows().iter().enumerate() {
        let Some(id) = row[customer].as_deref() else {
            continue;
        };
        let entry = totals.entry(join_key(id)).or_insert(0.0);
        if let Some(value) = row[amount].as_deref() {
            *entry += parse_float(value).ok_or_else(|| {
                TransformError::invalid("orders", "total_amount", index, value, "float")
            })?;
        }
    }
    Ok(totals)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame(columns: &[&str], rows: &[&[Option<&str>]]) -> Frame {
        Frame::from_rows(
            columns.iter().map(|c| c.to_string()).collect(),
            rows.iter()
                .map(|r| r.iter().map(|c| c.map(str::to_string)).collect())
                .collect(),
        )
        .unwrap()
    }

    fn values(rows: &[Row]) -> Vec<Vec<&str>> {
        rows.iter()
            .map(|r| r.iter().map(|c| c.as_deref().unwrap_or("<null>")).collect())
            .collect()
    }

    #[test]
    fn test_order_item_total_recomputed() {
        let items = frame(
            &[
                "order_item_id",
                "order_id",
                "product_id",
                "quantity",
                "price",
                "discount",
                "total",
            ],
            &[&[
                Some("1"),
                Some("1"),
                Some("1"),
                Some("2"),
                Some("10.0"),
                Some("1.0"),
                Some("0.0"),
            ]],
        );
        let result = transform_entity(Entity::OrderItems, &items, None).unwrap();
        assert_eq!(
            values(&result.rows),
            vec![vec!["1", "1", "1", "2", "10.0", "1.0", "19.0"]]
        );
    }

    #[test]
    fn test_order_item_total_ignores_missing_source_total() {
        let items = frame(
            &[
                "order_item_id",
                "order_id",
                "product_id",
                "quantity",
                "price",
                "discount",
                "total",
            ],
            &[
                &[Some("1"), Some("1"), Some("1"), Some("3"), Some("5"), Some("0"), None],
                &[Some("2"), Some("1"), Some("2"), Some("1"), None, Some("0"), Some("4.0")],
            ],
        );
        let result = transform_entity(Entity::OrderItems, &items, None).unwrap();
        assert_eq!(result.rows.len(), 1);
        assert_eq!(result.rows_dropped, 1);
        assert_eq!(
            values(&result.rows),
            vec![vec!["1", "1", "1", "3", "5.0", "0.0", "15.0"]]
        );
    }

    #[test]
    fn test_order_item_invalid_quantity() {
        let items = frame(
            &["order_item_id", "order_id", "product_id", "quantity", "price", "discount", "total"],
            &[&[Some("1"), Some("1"), Some("1"), Some("two"), Some("5"), Some("0"), None]],
        );
        let err = transform_entity(Entity::OrderItems, &items, None).unwrap_err();
        assert!(matches!(err, TransformError::InvalidValue { ref column, row: 1, .. } if column == "quantity"));
    }

    #[test]
    fn test_drops_rows_with_null_required_values_in_order() {
        let source = frame(
            &["id", "name", "score"],
            &[
                &[Some("1"), Some("a"), Some("1.5")],
                &[Some("2"), None, Some("2")],
                &[Some("3"), Some("c"), Some("3")],
                &[Some("4"), Some("d"), None],
            ],
        );
        let result = transform(&source, "scores", &["id", "name", "score"], None).unwrap();
        assert_eq!(result.rows_dropped, 2);
        assert_eq!(
            values(&result.rows),
            vec![vec!["1", "a", "1.5"], vec!["3", "c", "3.0"]]
        );
    }

    #[test]
    fn test_numeric_typing_is_consistent_per_column() {
        let source = frame(
            &["product_id", "price", "sku"],
            &[
                &[Some("1"), Some("10"), Some("SKU1")],
                &[Some("2"), Some("20.5"), Some("SKU2")],
            ],
        );
        let result = transform(&source, "products_subset", &["product_id", "price", "sku"], None)
            .unwrap();
        assert_eq!(
            values(&result.rows),
            vec![vec!["1", "10.0", "SKU1"], vec!["2", "20.5", "SKU2"]]
        );
    }

    #[test]
    fn test_missing_column_is_error() {
        let source = frame(&["id"], &[&[Some("1")]]);
        let err = transform(&source, "t", &["id", "name"], None).unwrap_err();
        assert_eq!(
            err,
            TransformError::MissingColumn {
                table: "t".into(),
                column: "name".into()
            }
        );
    }

    #[test]
    fn test_category_parent_id_integer_or_null() {
        let categories = frame(
            &["category_id", "name", "description", "parent_id", "created_at"],
            &[
                &[Some("1"), Some("Books"), Some("d"), None, Some("2021-01-01 00:00:00")],
                &[Some("2"), Some("Books - Rare"), Some("d"), Some("1.0"), Some("2021-01-01 00:00:00")],
            ],
        );
        let result = transform_entity(Entity::ProductCategories, &categories, None).unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows[0][3], None);
        assert_eq!(result.rows[1][3].as_deref(), Some("1"));
    }

    #[test]
    fn test_lifetime_value_sum_and_default() {
        let customers = frame(
            &[
                "customer_id", "email", "first_name", "last_name", "street_address", "city",
                "state", "zip_code", "country", "phone", "registration_date", "last_login",
            ],
            &[
                &[Some("1"), Some("a@x.com"), Some("A"), Some("A"), Some("s"), Some("c"), Some("st"), Some("02134"), Some("US"), Some("p"), Some("r"), Some("l")],
                &[Some("2"), Some("b@x.com"), Some("B"), Some("B"), Some("s"), Some("c"), Some("st"), Some("10001"), Some("US"), Some("p"), Some("r"), Some("l")],
                &[Some("3"), None, Some("C"), Some("C"), Some("s"), Some("c"), Some("st"), Some("10001"), Some("US"), Some("p"), Some("r"), Some("l")],
            ],
        );
        let orders = frame(
            &["order_id", "customer_id", "total_amount"],
            &[
                &[Some("10"), Some("1"), Some("20.5")],
                &[Some("11"), Some("1"), Some("4.5")],
                &[Some("12"), Some("3"), Some("9.0")],
            ],
        );

        let result = transform_entity(Entity::Customers, &customers, Some(&orders)).unwrap();
        assert_eq!(result.rows.len(), 2);
        assert_eq!(result.rows_dropped, 1);
        assert_eq!(result.rows[0][12].as_deref(), Some("25.0"));
        assert_eq!(result.rows[1][12].as_deref(), Some("0.0"));
        assert_eq!(result.rows[0][7].as_deref(), Some("02134"));
    }

    #[test]
    fn test_lifetime_values_join_key_normalized() {
        let orders = frame(
            &["customer_id", "total_amount"],
            &[&[Some("7.0"), Some("1.5")], &[Some("7"), Some("2.5")], &[Some("8"), None]],
        );
        let totals = lifetime_values(&orders).unwrap();
        assert_eq!(totals["7"], 4.0);
        assert_eq!(totals["8"], 0.0);
    }
}
