//! Daily sales rollup
//!
//! Groups order items by the calendar date of their order, product and
//! product category. Unjoinable items keep a null date or category and
//! still form groups. Revenue is the line total `price * quantity - discount`,
//! the same value loaded into `order_items.total`.

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use thiserror::Error;
use tracing::debug;

use crate::frame::{Frame, Row, format_float, join_key, parse_float, parse_int};

/// Errors that can occur while aggregating
#[derive(Error, Debug, PartialEq)]
pub enum AggregateError {
    /// Input column missing
    #[error("Column '{column}' is missing from {table}")]
    MissingColumn { table: String, column: String },

    /// A value could not be interpreted
    #[error("Invalid {expected} value {value:?} in {table}.{column}")]
    InvalidValue {
        table: String,
        column: String,
        value: String,
        expected: &'static str,
    },
}

/// Result type for aggregation
pub type AggregateResult<T> = Result<T, AggregateError>;

fn invalid(table: &str, column: &str, value: &str, expected: &'static str) -> AggregateError {
    AggregateError::InvalidValue {
        table: table.to_string(),
        column: column.to_string(),
        value: value.to_string(),
        expected,
    }
}

fn column(frame: &Frame, table: &str, name: &str) -> AggregateResult<usize> {
    frame
        .column_index(name)
        .ok_or_else(|| AggregateError::MissingColumn {
            table: table.to_string(),
            column: name.to_string(),
        })
}

/// Calendar date of an order timestamp
///
/// Naive timestamps are UTC wall-clock times; timestamps with an offset are
/// converted to UTC first.
pub fn order_date(value: &str) -> Option<NaiveDate> {
    let value = value.trim();
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S") {
        return Some(ts.date());
    }
    if let Ok(ts) = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%S") {
        return Some(ts.date());
    }
    if let Ok(date) = NaiveDate::parse_from_str(value, "%Y-%m-%d") {
        return Some(date);
    }
    DateTime::parse_from_rfc3339(value)
        .ok()
        .map(|ts| ts.with_timezone(&Utc).date_naive())
}

/// Grouping key; `None` sorts after every value
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct GroupKey {
    date: Option<NaiveDate>,
    product_id: Option<i64>,
    category_id: Option<i64>,
}

type SortKey = (bool, Option<NaiveDate>, bool, Option<i64>, bool, Option<i64>);

impl GroupKey {
    fn sort_key(&self) -> SortKey {
        (
            self.date.is_none(),
            self.date,
            self.product_id.is_none(),
            self.product_id,
            self.category_id.is_none(),
            self.category_id,
        )
    }
}

#[derive(Debug, Default)]
struct Totals {
    units_sold: i64,
    revenue: f64,
    orders: HashSet<String>,
}

/// One row of the daily rollup
#[derive(Debug, Clone, PartialEq)]
pub struct DailySales {
    pub date: Option<NaiveDate>,
    pub product_id: Option<i64>,
    pub category_id: Option<i64>,
    pub units_sold: i64,
    pub revenue: f64,
    pub order_count: usize,
    pub avg_unit_price: f64,
}

impl DailySales {
    /// Stringified row in `daily_sales_aggregation` column order
    pub fn to_row(&self) -> Row {
        vec![
            self.date.map(|d| d.format("%Y-%m-%d").to_string()),
            self.product_id.map(|v| v.to_string()),
            self.category_id.map(|v| v.to_string()),
            Some(self.units_sold.to_string()),
            Some(format_float(self.revenue)),
            Some(self.order_count.to_string()),
            Some(format_float(self.avg_unit_price)),
        ]
    }
}

fn id(value: Option<&str>, table: &str, column: &str) -> AggregateResult<Option<i64>> {
    value
        .map(|v| parse_int(v).ok_or_else(|| invalid(table, column, v, "integer")))
        .transpose()
}

/// Line total of one order item, or `None` when an input is null
fn line_total(
    row: &Row,
    price: usize,
    quantity: usize,
    discount: usize,
) -> AggregateResult<Option<(i64, f64)>> {
    let (Some(p), Some(q), Some(d)) = (
        row[price].as_deref(),
        row[quantity].as_deref(),
        row[discount].as_deref(),
    ) else {
        return Ok(None);
    };
    let p = parse_float(p).ok_or_else(|| invalid("order_items", "price", p, "float"))?;
    let q = parse_int(q).ok_or_else(|| invalid("order_items", "quantity", q, "integer"))?;
    let d = parse_float(d).ok_or_else(|| invalid("order_items", "discount", d, "float"))?;
    Ok(Some((q, p * q as f64 - d)))
}

/// Compute the daily rollup, sorted by date, product and category
///
/// `order_items` should be the cleaned fact rows. Items with a null price,
/// quantity or discount have no line total and are skipped, as the cleaner
/// drops them before loading.
pub fn daily_sales(
    order_items: &Frame,
    products: &Frame,
    orders: &Frame,
) -> AggregateResult<Vec<DailySales>> {
    let item_order = column(order_items, "order_items", "order_id")?;
    let item_product = column(order_items, "order_items", "product_id")?;
    let item_price = column(order_items, "order_items", "price")?;
    let item_quantity = column(order_items, "order_items", "quantity")?;
    let item_discount = column(order_items, "order_items", "discount")?;

    let order_dates = {
        let key = column(orders, "orders", "order_id")?;
        let value = column(orders, "orders", "order_date")?;
        orders.lookup(key, value)
    };
    let categories = {
        let key = column(products, "products", "product_id")?;
        let value = column(products, "products", "category_id")?;
        products.lookup(key, value)
    };

    let mut groups: HashMap<GroupKey, Totals> = HashMap::new();
    let mut skipped = 0;
    for row in order_items.rows() {
        let Some((quantity, total)) = line_total(row, item_price, item_quantity, item_discount)?
        else {
            skipped += 1;
            continue;
        };
        let order_id = row[item_order].as_deref().map(join_key);
        let product = row[item_product].as_deref();

        let raw_date = order_id
            .as_ref()
            .and_then(|id| order_dates.get(id))
            .copied()
            .flatten();
        let date = raw_date
            .map(|raw| {
                order_date(raw).ok_or_else(|| invalid("orders", "order_date", raw, "timestamp"))
            })
            .transpose()?;
        let category = product
            .and_then(|p| categories.get(&join_key(p)))
            .copied()
            .flatten();

        let key = GroupKey {
            date,
            product_id: id(product, "order_items", "product_id")?,
            category_id: id(category, "products", "category_id")?,
        };
        let totals = groups.entry(key).or_default();
        totals.units_sold += quantity;
        totals.revenue += total;
        if let Some(order_id) = order_id {
            totals.orders.insert(order_id);
        }
    }

    let mut sales: Vec<(GroupKey, DailySales)> = groups
        .into_iter()
        .map(|(key, totals)| {
            let avg_unit_price = if totals.units_sold == 0 {
                0.0
            } else {
                totals.revenue / totals.units_sold as f64
            };
            let row = DailySales {
                date: key.date,
                product_id: key.product_id,
                category_id: key.category_id,
                units_sold: totals.units_sold,
                revenue: totals.revenue,
                order_count: totals.orders.len(),
                avg_unit_price,
            };
            (key, row)
        })
        .collect();
    sales.sort_by_key(|(key, _)| key.sort_key());

    debug!(
        items = order_items.len(),
        skipped,
        groups = sales.len(),
        "Aggregated daily sales"
    );
    Ok(sales.into_iter().map(|(_, row)| row).collect())
}

/// Stringified rollup rows ready for loading
pub fn daily_sales_rows(
    order_items: &Frame,
    products: &Frame,
    orders: &Frame,
) -> AggregateResult<Vec<Row>> {
    Ok(daily_sales(order_items, products, orders)?
        .iter()
        .map(DailySales::to_row)
        .collect())
}
