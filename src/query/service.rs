//! Query execution over the warehouse pool

use chrono::{NaiveDate, NaiveDateTime};
use deadpool_postgres::Pool;
use serde::Serialize;
use tokio_postgres::Row;
use tracing::{debug, info};

use super::builder::{
    BuiltQuery, CustomerHistoryQuery, ProductSalesQuery, ProductUpdate, SalesTrendsQuery,
    TopProductsQuery, category_query,
};
use super::error::{QueryError, QueryResult};

/// Order header returned by the order listings
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OrderSummary {
    pub order_id: i64,
    pub customer_id: i64,
    pub order_date: NaiveDateTime,
    pub total_amount: f64,
}

impl OrderSummary {
    fn from_row(row: &Row) -> QueryResult<Self> {
        Ok(Self {
            order_id: row.try_get("order_id")?,
            customer_id: row.try_get("customer_id")?,
            order_date: row.try_get("order_date")?,
            total_amount: row.try_get("total_amount")?,
        })
    }
}

/// One row of the top products report
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TopProduct {
    pub product_id: i64,
    pub product_name: String,
    pub category_name: String,
    pub total_units_sold: i64,
    pub total_revenue: f64,
    pub order_count: i64,
}

impl TopProduct {
    fn from_row(row: &Row) -> QueryResult<Self> {
        Ok(Self {
            product_id: row.try_get("product_id")?,
            product_name: row.try_get("product_name")?,
            category_name: row.try_get("category_name")?,
            total_units_sold: row.try_get("total_units_sold")?,
            total_revenue: row.try_get("total_revenue")?,
            order_count: row.try_get("order_count")?,
        })
    }
}

/// Sales total for one period
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SalesTrendPoint {
    pub period: NaiveDate,
    pub total_sales: f64,
}

/// Category reference attached to an updated product
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CategoryRef {
    pub category_id: i64,
    pub name: String,
}

/// Product state after an update
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UpdatedProduct {
    pub product_id: i64,
    pub name: String,
    pub price: f64,
    pub category: Option<CategoryRef>,
}

/// Runs reporting queries and product updates against the warehouse
#[derive(Clone)]
pub struct QueryService {
    pool: Pool,
}

impl QueryService {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    async fn fetch(&self, query: &BuiltQuery) -> QueryResult<Vec<Row>> {
        debug!(sql = %query.sql, params = query.params.len(), "Running query");
        let client = self.pool.get().await?;
        let rows = client.query(query.sql.as_str(), &query.param_refs()).await?;
        Ok(rows)
    }

    /// Orders in a date range containing the requested products
    pub async fn product_sales(&self, request: &ProductSalesQuery) -> QueryResult<Vec<OrderSummary>> {
        let query = request.build()?;
        self.fetch(&query)
            .await?
            .iter()
            .map(OrderSummary::from_row)
            .collect()
    }

    /// A customer's purchase history
    pub async fn customer_history(
        &self,
        request: &CustomerHistoryQuery,
    ) -> QueryResult<Vec<OrderSummary>> {
        let query = request.build()?;
        self.fetch(&query)
            .await?
            .iter()
            .map(OrderSummary::from_row)
            .collect()
    }

    /// Best-selling products of a category
    pub async fn top_products(&self, request: &TopProductsQuery) -> QueryResult<Vec<TopProduct>> {
        let query = request.build()?;
        self.fetch(&query)
            .await?
            .iter()
            .map(TopProduct::from_row)
            .collect()
    }

    /// Sales totals per day, week or month
    pub async fn sales_trends(&self, request: &SalesTrendsQuery) -> QueryResult<Vec<SalesTrendPoint>> {
        let query = request.build()?;
        self.fetch(&query)
            .await?
            .iter()
            .map(|row| {
                Ok(SalesTrendPoint {
                    period: row.try_get("period")?,
                    total_sales: row.try_get("total_sales")?,
                })
            })
            .collect()
    }

    /// Update a product and return it with its category
    ///
    /// Both statements run in one transaction.
    pub async fn update_product(&self, update: &ProductUpdate) -> QueryResult<UpdatedProduct> {
        let query = update.build()?;

        let mut client = self.pool.get().await?;
        let tx = client.transaction().await?;

        let row = tx
            .query_opt(query.sql.as_str(), &query.param_refs())
            .await?
            .ok_or(QueryError::NotFound(update.product_id))?;
        let category_id: Option<i64> = row.try_get("category_id")?;

        let category = match category_id {
            Some(category_id) => {
                let lookup = category_query(category_id);
                tx.query_opt(lookup.sql.as_str(), &lookup.param_refs())
                    .await?
                    .map(|row| -> QueryResult<CategoryRef> {
                        Ok(CategoryRef {
                            category_id: row.try_get("category_id")?,
                            name: row.try_get("name")?,
                        })
                    })
                    .transpose()?
            }
            None => None,
        };

        let product = UpdatedProduct {
            product_id: row.try_get("product_id")?,
            name: row.try_get("name")?,
            price: row.try_get("price")?,
            category,
        };
        tx.commit().await?;

        info!(product_id = product.product_id, "Updated product");
        Ok(product)
    }
}
