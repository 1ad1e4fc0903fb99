//! Aurora CLI - Database migrations and operator tools.
//!
//! # Usage
//!
//! ```bash
//! # Run storefront database migrations
//! aurora-cli migrate
//!
//! # Expire lapsed Aurora Pro entitlements
//! aurora-cli subscriptions sweep --batch-size 200
//!
//! # Upsert products and variants from a JSON file
//! aurora-cli catalog seed catalog.json
//! ```

#![cfg_attr(not(test), forbid(unsafe_code))]

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "aurora-cli")]
#[command(author, version, about = "Aurora storefront CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run storefront database migrations
    Migrate,
    /// Manage Aurora Pro subscriptions
    Subscriptions {
        #[command(subcommand)]
        action: SubscriptionAction,
    },
    /// Manage the product catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
}

#[derive(Subcommand)]
enum SubscriptionAction {
    /// Expire entitlements whose validity has passed
    Sweep {
        /// Users expired per transaction (defaults to `SWEEP_BATCH_SIZE`)
        #[arg(short, long)]
        batch_size: Option<i64>,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Upsert products and variants from a JSON file
    Seed {
        /// Path to the catalog JSON file
        file: String,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), commands::CommandError> {
    match cli.command {
        Commands::Migrate => commands::migrate::storefront().await?,
        Commands::Subscriptions { action } => match action {
            SubscriptionAction::Sweep { batch_size } => {
                commands::sweep::expired(batch_size).await?;
            }
        },
        Commands::Catalog { action } => match action {
            CatalogAction::Seed { file } => commands::seed::catalog(&file).await?,
        },
    }
    Ok(())
}
