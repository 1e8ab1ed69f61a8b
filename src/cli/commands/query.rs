//! CLI commands for reporting queries and product updates

use chrono::NaiveDate;
use clap::Args;

use crate::cli::error::CliError;
use crate::cli::output::print_json;
use crate::config::AppConfig;
use crate::query::{
    CustomerHistoryQuery, DEFAULT_LIMIT, OrderSortField, ProductSalesQuery, ProductSortField,
    ProductUpdate, QueryService, SalesTrendsQuery, SortOrder, TopProductsQuery, TrendInterval,
};
use crate::warehouse::PostgresWarehouse;

/// Arguments for `query product-sales`
#[derive(Args, Debug, Clone)]
pub struct ProductSalesArgs {
    /// First order date (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub start_date: NaiveDate,

    /// Last order date (YYYY-MM-DD, inclusive)
    #[arg(long)]
    pub end_date: NaiveDate,

    /// Only orders containing this product
    #[arg(long)]
    pub product_id: Option<i64>,

    /// Only orders containing products of this category
    #[arg(long)]
    pub category_id: Option<i64>,

    /// order_date or total_amount
    #[arg(long, default_value = "order_date")]
    pub sort_by: OrderSortField,

    /// asc or desc
    #[arg(long, default_value = "asc")]
    pub sort_order: SortOrder,

    #[arg(long, default_value_t = DEFAULT_LIMIT, allow_negative_numbers = true)]
    pub limit: i64,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub offset: i64,
}

impl ProductSalesArgs {
    pub fn to_query(&self) -> ProductSalesQuery {
        ProductSalesQuery {
            product_id: self.product_id,
            category_id: self.category_id,
            sort_by: self.sort_by,
            sort_order: self.sort_order,
            limit: self.limit,
            offset: self.offset,
            ..ProductSalesQuery::new(self.start_date, self.end_date)
        }
    }
}

/// Arguments for `query customer-history`
#[derive(Args, Debug, Clone)]
pub struct CustomerHistoryArgs {
    #[arg(long)]
    pub customer_id: i64,

    #[arg(long)]
    pub start_date: Option<NaiveDate>,

    #[arg(long)]
    pub end_date: Option<NaiveDate>,

    /// order_date or total_amount
    #[arg(long, default_value = "order_date")]
    pub sort_by: OrderSortField,

    /// asc or desc
    #[arg(long, default_value = "desc")]
    pub sort_order: SortOrder,

    #[arg(long, default_value_t = DEFAULT_LIMIT, allow_negative_numbers = true)]
    pub limit: i64,

    #[arg(long, default_value_t = 0, allow_negative_numbers = true)]
    pub offset: i64,
}

impl CustomerHistoryArgs {
    pub fn to_query(&self) -> CustomerHistoryQuery {
        CustomerHistoryQuery {
            start_date: self.start_date,
            end_date: self.end_date,
            sort_by: self.sort_by,
            sort_order: self.sort_order,
            limit: self.limit,
            offset: self.offset,
            ..CustomerHistoryQuery::new(self.customer_id)
        }
    }
}

/// Arguments for `query top-products`
#[derive(Args, Debug, Clone)]
pub struct TopProductsArgs {
    #[arg(long)]
    pub category_id: i64,

    #[arg(long)]
    pub start_date: Option<NaiveDate>,

    #[arg(long)]
    pub end_date: Option<NaiveDate>,

    /// total_units_sold, total_revenue or order_count
    #[arg(long, default_value = "total_units_sold")]
    pub sort_by: ProductSortField,

    /// asc or desc
    #[arg(long, default_value = "desc")]
    pub sort_order: SortOrder,

    #[arg(long, default_value_t = DEFAULT_LIMIT, allow_negative_numbers = true)]
    pub limit: i64,
}

impl TopProductsArgs {
    pub fn to_query(&self) -> TopProductsQuery {
        TopProductsQuery {
            start_date: self.start_date,
            end_date: self.end_date,
            sort_by: self.sort_by,
            sort_order: self.sort_order,
            limit: self.limit,
            ..TopProductsQuery::new(self.category_id)
        }
    }
}

/// Arguments for `query sales-trends`
#[derive(Args, Debug, Clone)]
pub struct SalesTrendsArgs {
    #[arg(long)]
    pub start_date: NaiveDate,

    #[arg(long)]
    pub end_date: NaiveDate,

    /// day, week or month
    #[arg(long, default_value = "month")]
    pub interval: TrendInterval,
}

/// Arguments for `product update`
#[derive(Args, Debug, Clone)]
pub struct ProductUpdateArgs {
    #[arg(long)]
    pub product_id: i64,

    /// New product name
    #[arg(long)]
    pub name: Option<String>,

    /// New price (0 is allowed)
    #[arg(long)]
    pub price: Option<f64>,
}

impl ProductUpdateArgs {
    pub fn to_update(&self) -> ProductUpdate {
        ProductUpdate {
            product_id: self.product_id,
            name: self.name.clone(),
            price: self.price,
        }
    }
}

fn service(app: &AppConfig) -> Result<QueryService, CliError> {
    let warehouse = PostgresWarehouse::new(&app.warehouse)?;
    Ok(QueryService::new(warehouse.pool().clone()))
}

/// Handle `query product-sales`
pub async fn handle_product_sales(app: &AppConfig, args: &ProductSalesArgs) -> Result<(), CliError> {
    let query = args.to_query();
    query.build()?;
    let rows = service(app)?.product_sales(&query).await?;
    print_json(&rows)
}

/// Handle `query customer-history`
pub async fn handle_customer_history(
    app: &AppConfig,
    args: &CustomerHistoryArgs,
) -> Result<(), CliError> {
    let query = args.to_query();
    query.build()?;
    let rows = service(app)?.customer_history(&query).await?;
    print_json(&rows)
}

/// Handle `query top-products`
pub async fn handle_top_products(app: &AppConfig, args: &TopProductsArgs) -> Result<(), CliError> {
    let query = args.to_query();
    query.build()?;
    let rows = service(app)?.top_products(&query).await?;
    print_json(&rows)
}

/// Handle `query sales-trends`
pub async fn handle_sales_trends(app: &AppConfig, args: &SalesTrendsArgs) -> Result<(), CliError> {
    let query = SalesTrendsQuery::new(args.start_date, args.end_date, args.interval);
    query.build()?;
    let rows = service(app)?.sales_trends(&query).await?;
    print_json(&rows)
}

/// Handle `product update`
pub async fn handle_product_update(app: &AppConfig, args: &ProductUpdateArgs) -> Result<(), CliError> {
    let update = args.to_update();
    update.build()?;
    let product = service(app)?.update_product(&update).await?;
    print_json(&product)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryError;

    #[test]
    fn test_product_sales_args_to_query() {
        let args = ProductSalesArgs {
            start_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2024, 6, 30).unwrap(),
            product_id: Some(5),
            category_id: None,
            sort_by: OrderSortField::TotalAmount,
            sort_order: SortOrder::Desc,
            limit: 25,
            offset: 50,
        };
        let query = args.to_query();
        assert_eq!(query.product_id, Some(5));
        assert_eq!(query.limit, 25);
        assert_eq!(query.offset, 50);
        assert!(query.build().is_ok());
    }

    #[tokio::test]
    async fn test_invalid_arguments_fail_before_connecting() {
        let app = AppConfig::default();
        let args = ProductUpdateArgs {
            product_id: 1,
            name: None,
            price: None,
        };
        let err = handle_product_update(&app, &args).await.unwrap_err();
        assert!(matches!(err, CliError::Query(QueryError::NoFields)));

        let args = CustomerHistoryArgs {
            customer_id: 1,
            start_date: None,
            end_date: None,
            sort_by: OrderSortField::OrderDate,
            sort_order: SortOrder::Desc,
            limit: -1,
            offset: 0,
        };
        let err = handle_customer_history(&app, &args).await.unwrap_err();
        assert!(matches!(err, CliError::Query(QueryError::InvalidArgument(_))));
    }
}
