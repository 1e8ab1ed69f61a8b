//! Reporting queries and product updates
//!
//! Every request type validates its arguments and builds a [`BuiltQuery`]
//! without touching the database, so SQL shape can be checked offline.
//! [`QueryService`] runs the built statements on the warehouse pool.

mod builder;
mod error;
mod service;

pub use builder::{
    BuiltQuery, CustomerHistoryQuery, DEFAULT_LIMIT, OrderSortField, ProductSalesQuery,
    ProductSortField, ProductUpdate, QueryParam, SalesTrendsQuery, SortOrder, TopProductsQuery,
    TrendInterval, category_query,
};
pub use error::{QueryError, QueryResult};
pub use service::{
    CategoryRef, OrderSummary, QueryService, SalesTrendPoint, TopProduct, UpdatedProduct,
};
