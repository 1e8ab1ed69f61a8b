//! CLI module for the shop-etl binary

pub mod commands;
pub mod error;
pub mod output;

pub use error::CliError;
