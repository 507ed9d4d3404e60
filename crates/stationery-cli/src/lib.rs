//! Administrative command surface for the StationeryAI inventory database.
//!
//! Every command prints one JSON document on stdout; diagnostics go to stderr.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use rand::rngs::StdRng;
use rand::SeedableRng;
use serde::Serialize;
use serde_json::json;
use stationery_core::{
    monthly_report, parse_rfc3339_utc, predict_demand, recommend, stock_alert, stock_report,
    ProductInput, SaleInput,
};
use stationery_store_sqlite::{default_seed_catalog, parse_database_url, SqliteInventoryStore};

#[derive(Debug, Parser)]
#[command(name = "stationery")]
#[command(about = "StationeryAI inventory administration")]
pub struct Cli {
    /// Database path or `sqlite:` URL.
    #[arg(long, env = "DATABASE_URL", default_value = "./stationery.sqlite3")]
    db: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Catalog {
        #[command(subcommand)]
        command: CatalogCommand,
    },
    Sales {
        #[command(subcommand)]
        command: SalesCommand,
    },
    Report {
        #[command(subcommand)]
        command: ReportCommand,
    },
    Recommend(RecommendArgs),
    Stock {
        #[command(subcommand)]
        command: StockCommand,
    },
}

#[derive(Debug, Subcommand)]
pub enum CatalogCommand {
    /// Replace the catalog with the default stationery list.
    Seed {
        /// Fixed RNG seed for the generated custom items.
        #[arg(long)]
        seed: Option<u64>,
    },
    Add(ProductAddArgs),
    List,
    Clear,
}

#[derive(Debug, Args)]
pub struct ProductAddArgs {
    #[arg(long)]
    name: String,
    #[arg(long)]
    category: String,
    #[arg(long)]
    price: f64,
    #[arg(long)]
    stock: i64,
}

#[derive(Debug, Subcommand)]
pub enum SalesCommand {
    Add(SaleAddArgs),
    List,
    Clear,
}

#[derive(Debug, Args)]
pub struct SaleAddArgs {
    #[arg(long)]
    product_name: String,
    #[arg(long)]
    category: String,
    #[arg(long)]
    quantity: i64,
    #[arg(long)]
    price: f64,
    #[arg(long)]
    total_amount: Option<f64>,
    #[arg(long, allow_negative_numbers = true)]
    profit: Option<f64>,
    /// RFC3339 UTC timestamp; defaults to now.
    #[arg(long)]
    sale_date: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum ReportCommand {
    Demand,
    Monthly,
    Stock,
    Alert,
}

#[derive(Debug, Args)]
pub struct RecommendArgs {
    #[arg(long)]
    purpose: String,
    #[arg(long, allow_negative_numbers = true)]
    budget: i64,
}

#[derive(Debug, Subcommand)]
pub enum StockCommand {
    Decrement {
        #[arg(long)]
        product_id: i64,
        #[arg(long)]
        quantity: i64,
    },
}

/// Runs an already-parsed CLI against its database.
///
/// # Errors
/// Returns an error when the database cannot be opened or migrated, or when
/// the requested command fails.
pub fn run_cli(cli: Cli) -> Result<()> {
    let location = parse_database_url(&cli.db)?;
    let mut store = SqliteInventoryStore::open(&location.path())?;
    store.migrate()?;
    run_command(cli.command, &mut store)
}

/// Executes one command against an existing store handle.
///
/// # Errors
/// Returns an error when validation or persistence fails.
pub fn run_command(command: Command, store: &mut SqliteInventoryStore) -> Result<()> {
    match command {
        Command::Catalog { command } => run_catalog(command, store),
        Command::Sales { command } => run_sales(command, store),
        Command::Report { command } => run_report(&command, store),
        Command::Recommend(args) => {
            let products = store.list_products()?;
            print_json(&recommend(&products, &args.purpose, args.budget))
        }
        Command::Stock { command } => match command {
            StockCommand::Decrement {
                product_id,
                quantity,
            } => {
                let remaining_stock = store.decrement_stock(product_id, quantity)?;
                print_json(&json!({
                    "message": "Stock updated successfully",
                    "remaining_stock": remaining_stock,
                }))
            }
        },
    }
}

fn run_catalog(command: CatalogCommand, store: &mut SqliteInventoryStore) -> Result<()> {
    match command {
        CatalogCommand::Seed { seed } => {
            let mut rng = match seed {
                Some(seed) => StdRng::seed_from_u64(seed),
                None => StdRng::from_entropy(),
            };
            let catalog = default_seed_catalog(&mut rng);
            let inserted = store.seed_catalog(&catalog)?;
            print_json(&json!({ "inserted": inserted }))
        }
        CatalogCommand::Add(args) => {
            let product = store.create_product(&ProductInput::new(
                args.name,
                args.category,
                args.price,
                args.stock,
            ))?;
            print_json(&product)
        }
        CatalogCommand::List => print_json(&store.list_products()?),
        CatalogCommand::Clear => {
            let removed = store.clear_products()?;
            print_json(&json!({ "removed": removed }))
        }
    }
}

fn run_sales(command: SalesCommand, store: &mut SqliteInventoryStore) -> Result<()> {
    match command {
        SalesCommand::Add(args) => {
            let sale_date = args
                .sale_date
                .as_deref()
                .map(parse_rfc3339_utc)
                .transpose()
                .context("invalid --sale-date")?;
            let sale = store.append_sale(&SaleInput {
                product_name: args.product_name,
                category: args.category,
                quantity_sold: args.quantity,
                price: args.price,
                total_amount: args.total_amount,
                profit: args.profit,
                sale_date,
            })?;
            print_json(&json!({
                "message": "Sales added successfully",
                "sale": sale,
            }))
        }
        SalesCommand::List => print_json(&store.list_sales()?),
        SalesCommand::Clear => {
            let removed = store.clear_sales()?;
            print_json(&json!({ "removed": removed }))
        }
    }
}

fn run_report(command: &ReportCommand, store: &mut SqliteInventoryStore) -> Result<()> {
    match command {
        ReportCommand::Demand => print_json(&predict_demand(&store.list_sales()?)),
        ReportCommand::Monthly => print_json(&monthly_report(&store.list_sales()?)),
        ReportCommand::Stock => {
            let snapshot = store.snapshot()?;
            print_json(&stock_report(
                &snapshot.products,
                &snapshot.sold_quantity_lookup(),
            ))
        }
        ReportCommand::Alert => {
            let snapshot = store.snapshot()?;
            print_json(&stock_alert(
                &snapshot.products,
                &snapshot.sold_quantity_lookup(),
            ))
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
