//! shop-etl command-line entry point

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use shop_etl::cli::CliError;
use shop_etl::cli::commands::pipeline::{
    PipelineRunArgs, PipelineStatusArgs, handle_pipeline_run, handle_pipeline_status,
};
use shop_etl::cli::commands::query::{
    CustomerHistoryArgs, ProductSalesArgs, ProductUpdateArgs, SalesTrendsArgs, TopProductsArgs,
    handle_customer_history, handle_product_sales, handle_product_update, handle_sales_trends,
    handle_top_products,
};
use shop_etl::config::AppConfig;

#[derive(Parser, Debug)]
#[command(
    name = "shop-etl",
    version,
    about = "Load e-commerce CSV exports into the analytics warehouse and query it"
)]
struct Cli {
    /// TOML configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log output format
    #[arg(long, global = true, value_enum, default_value_t = LogFormat::Pretty)]
    log_format: LogFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq, ValueEnum)]
enum LogFormat {
    Pretty,
    Json,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run or inspect the ETL pipeline
    #[command(subcommand)]
    Pipeline(PipelineCommand),

    /// Reporting queries against the warehouse
    #[command(subcommand)]
    Query(QueryCommand),

    /// Product maintenance
    #[command(subcommand)]
    Product(ProductCommand),
}

#[derive(Subcommand, Debug)]
enum PipelineCommand {
    /// Run the pipeline
    Run(PipelineRunArgs),
    /// Show the last run record
    Status(PipelineStatusArgs),
}

#[derive(Subcommand, Debug)]
enum QueryCommand {
    /// Orders in a date range, optionally filtered by product or category
    ProductSales(ProductSalesArgs),
    /// One customer's purchase history
    CustomerHistory(CustomerHistoryArgs),
    /// Best-selling products of a category
    TopProducts(TopProductsArgs),
    /// Sales totals per day, week or month
    SalesTrends(SalesTrendsArgs),
}

#[derive(Subcommand, Debug)]
enum ProductCommand {
    /// Update a product's name and/or price
    Update(ProductUpdateArgs),
}

fn init_tracing(format: LogFormat) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let registry = tracing_subscriber::registry().with(filter);
    match format {
        LogFormat::Pretty => registry
            .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
            .init(),
        LogFormat::Json => registry
            .with(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            )
            .init(),
    }
}

async fn run(cli: Cli) -> Result<()> {
    let app = AppConfig::load(cli.config.as_deref()).map_err(CliError::from)?;

    match cli.command {
        Command::Pipeline(PipelineCommand::Run(args)) => handle_pipeline_run(app, &args).await?,
        Command::Pipeline(PipelineCommand::Status(args)) => handle_pipeline_status(&app, &args)?,
        Command::Query(QueryCommand::ProductSales(args)) => {
            handle_product_sales(&app, &args).await?
        }
        Command::Query(QueryCommand::CustomerHistory(args)) => {
            handle_customer_history(&app, &args).await?
        }
        Command::Query(QueryCommand::TopProducts(args)) => handle_top_products(&app, &args).await?,
        Command::Query(QueryCommand::SalesTrends(args)) => handle_sales_trends(&app, &args).await?,
        Command::Product(ProductCommand::Update(args)) => {
            handle_product_update(&app, &args).await?
        }
    }
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.log_format);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            match err.downcast_ref::<CliError>() {
                Some(cli_err) => eprintln!("Error: {}", cli_err.user_message()),
                None => eprintln!("Error: {err:#}"),
            }
            ExitCode::FAILURE
        }
    }
}
