use clap::{Parser, Subcommand, ValueEnum};
use miette::{IntoDiagnostic, Result};
use std::fs::File;
use std::io::{self, Write};
use std::path::PathBuf;
use std::sync::Arc;
use storefront_checkout::application::coordinator::{SettlementCoordinator, SettlementPorts};
use storefront_checkout::application::session::CheckoutSession;
use storefront_checkout::config::{CheckoutConfig, LoggingConfig};
use storefront_checkout::domain::ports::{CartStoreBox, OrderStoreBox};
use storefront_checkout::domain::settlement::ProviderOutcome;
use storefront_checkout::infrastructure::in_memory::{
    InMemoryCartStore, InMemoryCatalog, InMemoryOrderStore,
};
use storefront_checkout::infrastructure::simulated::{ScriptedProvider, SimulatedAuthority};
use storefront_checkout::interfaces::csv::breakdown_writer::BreakdownWriter;
use storefront_checkout::interfaces::csv::cart_reader::CartReader;
use storefront_checkout::telemetry;
use tracing::info;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,

    #[command(flatten)]
    logging: LoggingConfig,

    #[command(flatten)]
    checkout: CheckoutConfig,
}

#[derive(Subcommand)]
enum Command {
    /// Print the price breakdown of a cart CSV file
    Quote {
        /// Cart CSV file (product_id, unit_price, quantity[, currency])
        cart: PathBuf,
    },

    /// Settle a session's cart against the simulated payment authority
    Checkout {
        /// Cart CSV file whose lines are added to the session cart
        cart: Option<PathBuf>,

        /// Outcome reported by the simulated payment provider
        #[arg(long, value_enum, default_value_t = Outcome::Success)]
        outcome: Outcome,

        /// Session whose cart is restored and settled
        #[arg(long, default_value = "default")]
        session: String,

        /// Path to persistent database (optional). If provided, uses RocksDB.
        #[arg(long)]
        db_path: Option<PathBuf>,
    },

    /// Print recorded orders as JSON lines
    Orders {
        /// Path to persistent database (optional). If provided, uses RocksDB.
        #[arg(long)]
        db_path: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Outcome {
    Success,
    Canceled,
    Failed,
}

impl From<Outcome> for ProviderOutcome {
    fn from(outcome: Outcome) -> Self {
        match outcome {
            Outcome::Success => ProviderOutcome::Success,
            Outcome::Canceled => ProviderOutcome::Canceled,
            Outcome::Failed => ProviderOutcome::Failed {
                message: "card declined".to_string(),
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    telemetry::init(&cli.logging)?;

    match cli.command {
        Command::Quote { cart } => quote(&cli.checkout, cart),
        Command::Checkout {
            cart,
            outcome,
            session,
            db_path,
        } => checkout(&cli.checkout, cart, outcome, session, db_path).await,
        Command::Orders { db_path } => orders(db_path).await,
    }
}

fn quote(config: &CheckoutConfig, path: PathBuf) -> Result<()> {
    let file = File::open(path).into_diagnostic()?;
    let cart = CartReader::new(file).into_cart()?;
    let breakdown = config
        .fee_schedule()?
        .compute_breakdown(cart.totals()?.total_price)?;

    let stdout = io::stdout();
    let mut writer = BreakdownWriter::new(stdout.lock());
    writer.write_breakdowns([breakdown])?;
    Ok(())
}

async fn checkout(
    config: &CheckoutConfig,
    cart: Option<PathBuf>,
    outcome: Outcome,
    session_id: String,
    db_path: Option<PathBuf>,
) -> Result<()> {
    let settings = config.settlement_settings()?;
    let (carts, orders) = open_stores(db_path)?;
    let session = Arc::new(CheckoutSession::open(session_id, carts).await?);

    if let Some(path) = cart {
        let file = File::open(path).into_diagnostic()?;
        for row in CartReader::new(file).rows() {
            let row = row?;
            session
                .add_item(row.product_id(), row.unit_price()?, row.quantity)
                .await?;
        }
    }

    // The simulated authority prices from the same catalog the cart was built from.
    let catalog = InMemoryCatalog::new();
    for item in session.snapshot().await.items() {
        catalog
            .insert(item.product_id, item.unit_price.amount())
            .await;
    }

    let coordinator = SettlementCoordinator::new(
        session,
        SettlementPorts {
            authority: Box::new(SimulatedAuthority::new(catalog.clone(), settings.fees)),
            provider: Box::new(ScriptedProvider::new(outcome.into())),
            catalog: Box::new(catalog),
            orders,
        },
        settings,
    );

    let order = coordinator.checkout().await?;
    info!(order_id = %order.id, "checkout complete");

    let json = serde_json::to_string_pretty(&order).into_diagnostic()?;
    writeln!(io::stdout(), "{json}").into_diagnostic()?;
    Ok(())
}

async fn orders(db_path: Option<PathBuf>) -> Result<()> {
    let (_, orders) = open_stores(db_path)?;

    let stdout = io::stdout();
    let mut out = stdout.lock();
    for order in orders.get_all().await? {
        let line = serde_json::to_string(&order).into_diagnostic()?;
        writeln!(out, "{line}").into_diagnostic()?;
    }
    Ok(())
}

#[cfg(feature = "storage-rocksdb")]
fn open_stores(db_path: Option<PathBuf>) -> Result<(CartStoreBox, OrderStoreBox)> {
    use storefront_checkout::infrastructure::rocksdb::RocksDBStore;

    match db_path {
        Some(path) => {
            let store = RocksDBStore::open(path)?;
            Ok((Box::new(store.clone()), Box::new(store)))
        }
        None => Ok(in_memory_stores()),
    }
}

#[cfg(not(feature = "storage-rocksdb"))]
fn open_stores(db_path: Option<PathBuf>) -> Result<(CartStoreBox, OrderStoreBox)> {
    if db_path.is_some() {
        tracing::warn!("--db-path needs the storage-rocksdb feature; falling back to in-memory storage");
    }
    Ok(in_memory_stores())
}

fn in_memory_stores() -> (CartStoreBox, OrderStoreBox) {
    (
        Box::new(InMemoryCartStore::new()),
        Box::new(InMemoryOrderStore::new()),
    )
}
