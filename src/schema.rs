//! Warehouse table catalogue
//!
//! Static description of the tables the pipeline writes: load column lists,
//! conflict keys and default source file names. The DDL itself lives with the
//! warehouse; this module only mirrors the parts the pipeline depends on.

use serde::{Deserialize, Serialize};

/// Materialized view refreshed after the order-item facts land
pub const PRODUCT_SALES_VIEW: &str = "product_sales_summary";

/// Calendar dimension table
pub const DIM_TIME_TABLE: &str = "dim_time";

/// Daily rollup table
pub const DAILY_SALES_TABLE: &str = "daily_sales_aggregation";

/// Default directory holding the generated CSV files
pub const DEFAULT_DATA_DIR: &str = "ecommerce_data";

/// Columns of the calendar dimension, in insert order
pub const DIM_TIME_COLUMNS: &[&str] = &[
    "date",
    "day_of_week",
    "day_of_month",
    "day_of_year",
    "week_of_year",
    "month",
    "month_name",
    "quarter",
    "year",
    "is_weekend",
    "is_holiday",
];

/// Columns of the daily rollup, in insert order
pub const DAILY_SALES_COLUMNS: &[&str] = &[
    "date",
    "product_id",
    "category_id",
    "units_sold",
    "revenue",
    "order_count",
    "avg_unit_price",
];

/// Source entities, in foreign-key load order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Entity {
    ProductCategories,
    Products,
    Customers,
    Orders,
    OrderItems,
}

impl Entity {
    /// All entities in load order
    pub fn all() -> [Self; 5] {
        [
            Self::ProductCategories,
            Self::Products,
            Self::Customers,
            Self::Orders,
            Self::OrderItems,
        ]
    }

    /// Destination table name
    pub fn table_name(&self) -> &'static str {
        match self {
            Self::ProductCategories => "product_categories",
            Self::Products => "products",
            Self::Customers => "customers",
            Self::Orders => "orders",
            Self::OrderItems => "order_items",
        }
    }

    /// File name the generator writes for this entity
    pub fn default_file_name(&self) -> &'static str {
        match self {
            Self::ProductCategories => "sample_product_categories.csv",
            Self::Products => "sample_products.csv",
            Self::Customers => "sample_customers.csv",
            Self::Orders => "sample_orders.csv",
            Self::OrderItems => "sample_order_items.csv",
        }
    }

    /// Columns loaded into the destination table, in insert order
    pub fn columns(&self) -> &'static [&'static str] {
        match self {
            Self::ProductCategories => &[
                "category_id",
                "name",
                "description",
                "parent_id",
                "created_at",
            ],
            Self::Products => &[
                "product_id",
                "name",
                "description",
                "price",
                "cost",
                "category_id",
                "sku",
                "inventory_count",
                "weight",
                "created_at",
                "is_active",
            ],
            Self::Customers => &[
                "customer_id",
                "email",
                "first_name",
                "last_name",
                "street_address",
                "city",
                "state",
                "zip_code",
                "country",
                "phone",
                "registration_date",
                "last_login",
                "lifetime_value",
            ],
            Self::Orders => &[
                "order_id",
                "customer_id",
                "order_date",
                "status",
                "payment_method",
                "shipping_address",
                "shipping_city",
                "shipping_state",
                "shipping_zip",
                "shipping_country",
                "processing_date",
                "shipping_date",
                "delivery_date",
                "total_amount",
            ],
            Self::OrderItems => &[
                "order_item_id",
                "order_id",
                "product_id",
                "quantity",
                "price",
                "discount",
                "total",
            ],
        }
    }

    /// Columns a source row must carry to be loaded
    ///
    /// Derived columns (`lifetime_value`) and nullable references
    /// (`parent_id`) are not required.
    pub fn required_columns(&self) -> Vec<&'static str> {
        self.columns()
            .iter()
            .copied()
            .filter(|c| {
                !matches!(
                    (self, *c),
                    (Self::Customers, "lifetime_value") | (Self::ProductCategories, "parent_id")
                )
            })
            .collect()
    }

    /// Primary key column
    pub fn key_column(&self) -> &'static str {
        self.columns()[0]
    }

    /// Look up an entity by its table name
    pub fn from_table_name(name: &str) -> Option<Self> {
        Self::all().into_iter().find(|e| e.table_name() == name)
    }
}

impl std::fmt::Display for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.table_name())
    }
}

/// Conflict key columns for any table the pipeline writes
pub fn key_columns(table: &str) -> Option<&'static [&'static str]> {
    if let Some(entity) = Entity::from_table_name(table) {
        return Some(match entity {
            Entity::ProductCategories => &["category_id"],
            Entity::Products => &["product_id"],
            Entity::Customers => &["customer_id"],
            Entity::Orders => &["order_id"],
            Entity::OrderItems => &["order_item_id"],
        });
    }
    match table {
        DIM_TIME_TABLE => Some(&["date"]),
        DAILY_SALES_TABLE => Some(&["date", "product_id", "category_id"]),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_key_column_is_first_column() {
        for entity in Entity::all() {
            assert_eq!(
                key_columns(entity.table_name()).unwrap(),
                &[entity.key_column()]
            );
        }
    }

    #[test]
    fn test_required_columns_exclude_derived() {
        let required = Entity::Customers.required_columns();
        assert!(!required.contains(&"lifetime_value"));
        assert_eq!(required.len(), Entity::Customers.columns().len() - 1);

        let required = Entity::ProductCategories.required_columns();
        assert!(!required.contains(&"parent_id"));
        assert!(Entity::OrderItems.required_columns().contains(&"total"));
    }

    #[test]
    fn test_from_table_name() {
        assert_eq!(
            Entity::from_table_name("order_items"),
            Some(Entity::OrderItems)
        );
        assert_eq!(Entity::from_table_name("dim_time"), None);
        assert_eq!(key_columns(DAILY_SALES_TABLE).unwrap().len(), 3);
        assert!(key_columns("unknown").is_none());
    }
}
