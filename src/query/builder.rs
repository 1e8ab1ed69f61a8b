//! Parameterized SQL builders for the reporting queries
//!
//! Caller values only ever reach the statement as `$n` placeholders. Sort
//! columns, directions and truncation units are taken from enums whose SQL
//! text is fixed here.

use std::fmt;
use std::str::FromStr;

use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use tokio_postgres::types::ToSql;

use super::error::{QueryError, QueryResult};

/// Default page size for listing queries
pub const DEFAULT_LIMIT: i64 = 10;

const EXCLUDED_STATUSES: &str = "o.status NOT IN ('Cancelled', 'Returned')";

const ORDER_COLUMNS: &str = "o.order_id::bigint AS order_id, \
     o.customer_id::bigint AS customer_id, \
     o.order_date::timestamp AS order_date, \
     o.total_amount::float8 AS total_amount";

/// A bind parameter value
#[derive(Debug, Clone, PartialEq)]
pub enum QueryParam {
    Int(i64),
    Float(f64),
    Text(String),
    Date(NaiveDate),
    Timestamp(NaiveDateTime),
}

impl QueryParam {
    /// Borrow the value for `tokio_postgres`
    pub fn as_sql(&self) -> &(dyn ToSql + Sync) {
        match self {
            QueryParam::Int(v) => v,
            QueryParam::Float(v) => v,
            QueryParam::Text(v) => v,
            QueryParam::Date(v) => v,
            QueryParam::Timestamp(v) => v,
        }
    }
}

/// SQL text plus its bind parameters, in placeholder order
#[derive(Debug, Clone, PartialEq)]
pub struct BuiltQuery {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

impl BuiltQuery {
    /// Parameter references in the shape `Client::query` expects
    pub fn param_refs(&self) -> Vec<&(dyn ToSql + Sync)> {
        self.params.iter().map(QueryParam::as_sql).collect()
    }
}

struct SqlBuilder {
    sql: String,
    params: Vec<QueryParam>,
}

impl SqlBuilder {
    fn new(sql: &str) -> Self {
        Self {
            sql: sql.to_string(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    fn push_bind(&mut self, param: QueryParam) -> &mut Self {
        self.params.push(param);
        self.sql.push_str(&format!("${}", self.params.len()));
        self
    }

    /// Bind an id; the cast pins the parameter type to `int8`
    fn push_bind_id(&mut self, id: i64) -> &mut Self {
        self.push_bind(QueryParam::Int(id)).push("::bigint")
    }

    /// Restrict `o.order_date` to whole calendar days
    fn push_date_bounds(
        &mut self,
        start: Option<NaiveDate>,
        end: Option<NaiveDate>,
    ) -> QueryResult<&mut Self> {
        if let Some(start) = start {
            self.push(" AND o.order_date >= ")
                .push_bind(QueryParam::Timestamp(start_of_day(start)));
        }
        if let Some(end) = end {
            self.push(" AND o.order_date < ")
                .push_bind(QueryParam::Timestamp(start_of_next_day(end)?));
        }
        Ok(self)
    }

    fn push_order_by(&mut self, column: &str, order: SortOrder) -> &mut Self {
        self.push(&format!(" ORDER BY {column} {}", order.as_sql()))
    }

    fn push_page(&mut self, limit: i64, offset: Option<i64>) -> &mut Self {
        self.push(" LIMIT ").push_bind(QueryParam::Int(limit));
        if let Some(offset) = offset {
            self.push(" OFFSET ").push_bind(QueryParam::Int(offset));
        }
        self
    }

    fn build(self) -> BuiltQuery {
        BuiltQuery {
            sql: self.sql,
            params: self.params,
        }
    }
}

fn start_of_day(date: NaiveDate) -> NaiveDateTime {
    date.and_time(NaiveTime::MIN)
}

fn start_of_next_day(date: NaiveDate) -> QueryResult<NaiveDateTime> {
    date.checked_add_days(Days::new(1))
        .map(start_of_day)
        .ok_or_else(|| QueryError::invalid(format!("end date {date} is out of range")))
}

fn check_range(start: Option<NaiveDate>, end: Option<NaiveDate>) -> QueryResult<()> {
    match (start, end) {
        (Some(start), Some(end)) if start > end => Err(QueryError::invalid(format!(
            "start date {start} is after end date {end}"
        ))),
        _ => Ok(()),
    }
}

fn check_page(limit: i64, offset: Option<i64>) -> QueryResult<()> {
    if limit < 0 {
        return Err(QueryError::invalid("limit must not be negative"));
    }
    if offset.is_some_and(|o| o < 0) {
        return Err(QueryError::invalid("offset must not be negative"));
    }
    Ok(())
}

fn unknown(kind: &str, value: &str, allowed: &[&str]) -> String {
    format!(
        "Unknown {kind} '{value}'. Valid values: {}",
        allowed.join(", ")
    )
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortOrder::Asc => "ASC",
            SortOrder::Desc => "DESC",
        }
    }
}

impl fmt::Display for SortOrder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for SortOrder {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "asc" => Ok(SortOrder::Asc),
            "desc" => Ok(SortOrder::Desc),
            _ => Err(unknown("sort order", s, &["asc", "desc"])),
        }
    }
}

/// Sort column for order listings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderSortField {
    OrderDate,
    TotalAmount,
}

impl OrderSortField {
    pub fn name(&self) -> &'static str {
        match self {
            OrderSortField::OrderDate => "order_date",
            OrderSortField::TotalAmount => "total_amount",
        }
    }

    fn column(&self) -> &'static str {
        match self {
            OrderSortField::OrderDate => "o.order_date",
            OrderSortField::TotalAmount => "o.total_amount",
        }
    }
}

impl fmt::Display for OrderSortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for OrderSortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "order_date" => Ok(OrderSortField::OrderDate),
            "total_amount" => Ok(OrderSortField::TotalAmount),
            _ => Err(unknown("sort field", s, &["order_date", "total_amount"])),
        }
    }
}

/// Sort column for the top products report
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProductSortField {
    TotalUnitsSold,
    TotalRevenue,
    OrderCount,
}

impl ProductSortField {
    pub fn name(&self) -> &'static str {
        match self {
            ProductSortField::TotalUnitsSold => "total_units_sold",
            ProductSortField::TotalRevenue => "total_revenue",
            ProductSortField::OrderCount => "order_count",
        }
    }
}

impl fmt::Display for ProductSortField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for ProductSortField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "total_units_sold" => Ok(ProductSortField::TotalUnitsSold),
            "total_revenue" => Ok(ProductSortField::TotalRevenue),
            "order_count" => Ok(ProductSortField::OrderCount),
            _ => Err(unknown(
                "sort field",
                s,
                &["total_units_sold", "total_revenue", "order_count"],
            )),
        }
    }
}

/// Bucket size for sales trends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrendInterval {
    Day,
    Week,
    Month,
}

impl TrendInterval {
    /// `DATE_TRUNC` field name
    pub fn unit(&self) -> &'static str {
        match self {
            TrendInterval::Day => "day",
            TrendInterval::Week => "week",
            TrendInterval::Month => "month",
        }
    }
}

impl fmt::Display for TrendInterval {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.unit())
    }
}

impl FromStr for TrendInterval {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "day" => Ok(TrendInterval::Day),
            "week" => Ok(TrendInterval::Week),
            "month" => Ok(TrendInterval::Month),
            _ => Err(unknown("interval", s, &["day", "week", "month"])),
        }
    }
}

/// Orders in a date range that contain matching products
#[derive(Debug, Clone, PartialEq)]
pub struct ProductSalesQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub product_id: Option<i64>,
    pub category_id: Option<i64>,
    pub sort_by: OrderSortField,
    pub sort_order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

impl ProductSalesQuery {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate) -> Self {
        Self {
            start_date,
            end_date,
            product_id: None,
            category_id: None,
            sort_by: OrderSortField::OrderDate,
            sort_order: SortOrder::Asc,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn build(&self) -> QueryResult<BuiltQuery> {
        check_range(Some(self.start_date), Some(self.end_date))?;
        check_page(self.limit, Some(self.offset))?;

        let mut q = SqlBuilder::new(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders o \
             JOIN order_items oi ON oi.order_id = o.order_id \
             JOIN products p ON p.product_id = oi.product_id \
             WHERE {EXCLUDED_STATUSES}"
        ));
        q.push_date_bounds(Some(self.start_date), Some(self.end_date))?;
        if let Some(product_id) = self.product_id {
            q.push(" AND oi.product_id = ").push_bind_id(product_id);
        }
        if let Some(category_id) = self.category_id {
            q.push(" AND p.category_id = ").push_bind_id(category_id);
        }
        q.push_order_by(self.sort_by.column(), self.sort_order)
            .push_page(self.limit, Some(self.offset));
        Ok(q.build())
    }
}

/// One customer's orders
#[derive(Debug, Clone, PartialEq)]
pub struct CustomerHistoryQuery {
    pub customer_id: i64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub sort_by: OrderSortField,
    pub sort_order: SortOrder,
    pub limit: i64,
    pub offset: i64,
}

impl CustomerHistoryQuery {
    pub fn new(customer_id: i64) -> Self {
        Self {
            customer_id,
            start_date: None,
            end_date: None,
            sort_by: OrderSortField::OrderDate,
            sort_order: SortOrder::Desc,
            limit: DEFAULT_LIMIT,
            offset: 0,
        }
    }

    pub fn build(&self) -> QueryResult<BuiltQuery> {
        check_range(self.start_date, self.end_date)?;
        check_page(self.limit, Some(self.offset))?;

        let mut q = SqlBuilder::new(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders o WHERE o.customer_id = "
        ));
        q.push_bind_id(self.customer_id)
            .push(&format!(" AND {EXCLUDED_STATUSES}"));
        q.push_date_bounds(self.start_date, self.end_date)?;
        q.push_order_by(self.sort_by.column(), self.sort_order)
            .push_page(self.limit, Some(self.offset));
        Ok(q.build())
    }
}

/// Best sellers within one category
#[derive(Debug, Clone, PartialEq)]
pub struct TopProductsQuery {
    pub category_id: i64,
    pub start_date: Option<NaiveDate>,
    pub end_date: Option<NaiveDate>,
    pub sort_by: ProductSortField,
    pub sort_order: SortOrder,
    pub limit: i64,
}

impl TopProductsQuery {
    pub fn new(category_id: i64) -> Self {
        Self {
            category_id,
            start_date: None,
            end_date: None,
            sort_by: ProductSortField::TotalUnitsSold,
            sort_order: SortOrder::Desc,
            limit: DEFAULT_LIMIT,
        }
    }

    pub fn build(&self) -> QueryResult<BuiltQuery> {
        check_range(self.start_date, self.end_date)?;
        check_page(self.limit, None)?;

        let mut q = SqlBuilder::new(
            "SELECT p.product_id::bigint AS product_id, \
             p.name AS product_name, \
             pc.name AS category_name, \
             SUM(oi.quantity)::bigint AS total_units_sold, \
             SUM(oi.total)::float8 AS total_revenue, \
             COUNT(DISTINCT o.order_id)::bigint AS order_count \
             FROM products p \
             JOIN product_categories pc ON pc.category_id = p.category_id \
             JOIN order_items oi ON oi.product_id = p.product_id \
             JOIN orders o ON o.order_id = oi.order_id \
             WHERE p.category_id = ",
        );
        q.push_bind_id(self.category_id)
            .push(&format!(" AND {EXCLUDED_STATUSES}"));
        q.push_date_bounds(self.start_date, self.end_date)?;
        q.push(" GROUP BY p.product_id, p.name, pc.name")
            .push_order_by(self.sort_by.name(), self.sort_order)
            .push_page(self.limit, None);
        Ok(q.build())
    }
}

/// Total sales bucketed over the calendar dimension
#[derive(Debug, Clone, PartialEq)]
pub struct SalesTrendsQuery {
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    pub interval: TrendInterval,
}

impl SalesTrendsQuery {
    pub fn new(start_date: NaiveDate, end_date: NaiveDate, interval: TrendInterval) -> Self {
        Self {
            start_date,
            end_date,
            interval,
        }
    }

    pub fn build(&self) -> QueryResult<BuiltQuery> {
        check_range(Some(self.start_date), Some(self.end_date))?;

        let mut q = SqlBuilder::new(&format!(
            "SELECT DATE_TRUNC('{}', dt.date::timestamp)::date AS period, \
             SUM(oi.total)::float8 AS total_sales \
             FROM {} dt \
             JOIN orders o ON o.order_date::date = dt.date \
             JOIN order_items oi ON oi.order_id = o.order_id \
             WHERE dt.date >= ",
            self.interval.unit(),
            crate::schema::DIM_TIME_TABLE,
        ));
        q.push_bind(QueryParam::Date(self.start_date))
            .push(" AND dt.date <= ")
            .push_bind(QueryParam::Date(self.end_date))
            .push(&format!(" AND {EXCLUDED_STATUSES} GROUP BY 1 ORDER BY 1"));
        Ok(q.build())
    }
}

/// Partial update of a product's name and price
#[derive(Debug, Clone, PartialEq)]
pub struct ProductUpdate {
    pub product_id: i64,
    pub name: Option<String>,
    pub price: Option<f64>,
}

impl ProductUpdate {
    pub fn new(product_id: i64) -> Self {
        Self {
            product_id,
            name: None,
            price: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_price(mut self, price: f64) -> Self {
        self.price = Some(price);
        self
    }

    /// `UPDATE ... RETURNING` for the product row
    pub fn build(&self) -> QueryResult<BuiltQuery> {
        if self.name.is_none() && self.price.is_none() {
            return Err(QueryError::NoFields);
        }
        if self.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(QueryError::invalid("name must not be empty"));
        }
        if self.price.is_some_and(|p| !p.is_finite() || p < 0.0) {
            return Err(QueryError::invalid(
                "price must be a finite, non-negative number",
            ));
        }

        let mut q = SqlBuilder::new("UPDATE products SET ");
        if let Some(name) = &self.name {
            q.push("name = ")
                .push_bind(QueryParam::Text(name.clone()))
                .push(", ");
        }
        if let Some(price) = self.price {
            q.push("price = ")
                .push_bind(QueryParam::Float(price))
                .push("::float8, ");
        }
        q.push("updated_at = NOW() WHERE product_id = ")
            .push_bind_id(self.product_id)
            .push(
                " RETURNING product_id::bigint AS product_id, name, \
                 price::float8 AS price, category_id::bigint AS category_id",
            );
        Ok(q.build())
    }
}

/// Category lookup for an updated product
pub fn category_query(category_id: i64) -> BuiltQuery {
    let mut q = SqlBuilder::new(
        "SELECT category_id::bigint AS category_id, name \
         FROM product_categories WHERE category_id = ",
    );
    q.push_bind_id(category_id);
    q.build()
}
