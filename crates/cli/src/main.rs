//! Boxlane CLI - Database migrations and management tools.
//!
//! # Usage
//!
//! ```bash
//! # Run database migrations
//! boxlane-cli migrate
//!
//! # Give an existing account the admin role
//! boxlane-cli account promote -e admin@example.com
//!
//! # Insert or update catalog products from YAML
//! boxlane-cli catalog seed -f catalog.yaml
//! ```
//!
//! # Commands
//!
//! - `migrate` - Run database migrations
//! - `account promote` - Promote an account to admin
//! - `catalog seed` - Upsert products by slug

#![cfg_attr(not(test), forbid(unsafe_code))]

use std::path::PathBuf;

use clap::{Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "boxlane-cli")]
#[command(author, version, about = "Boxlane CLI tools")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run database migrations
    Migrate,
    /// Manage accounts
    Account {
        #[command(subcommand)]
        action: AccountAction,
    },
    /// Manage the product catalog
    Catalog {
        #[command(subcommand)]
        action: CatalogAction,
    },
}

#[derive(Subcommand)]
enum AccountAction {
    /// Give an existing account the admin role
    Promote {
        /// Account email address
        #[arg(short, long)]
        email: String,
    },
}

#[derive(Subcommand)]
enum CatalogAction {
    /// Insert or update products from a YAML file
    Seed {
        /// Path to the YAML product list
        #[arg(short, long)]
        file: PathBuf,
    },
}

#[tokio::main]
async fn main() {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let cli = Cli::parse();

    let result: Result<(), Box<dyn std::error::Error>> = run(cli).await;

    if let Err(e) = result {
        tracing::error!("Command failed: {e}");
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Migrate => commands::migrate::run().await?,
        Commands::Account { action } => match action {
            AccountAction::Promote { email } => {
                commands::account::promote(&email).await?;
            }
        },
        Commands::Catalog { action } => match action {
            CatalogAction::Seed { file } => {
                commands::catalog::seed(&file).await?;
            }
        },
    }
    Ok(())
}
