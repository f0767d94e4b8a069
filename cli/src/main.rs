//! Operator command line for workshop check-in.
//!
//! Every command prints its result as JSON on stdout; logs go to stderr.

use std::sync::Arc;

use anyhow::Context;
use checkin_core::environment::SystemClock;
use checkin_core::types::{OperatorId, RegistrationId, UserId, WorkshopId};
use checkin_postgres::{PostgresCheckInStore, PostgresDirectory};
use checkin_runtime::CheckInService;
use clap::{Parser, Subcommand};
use serde::Serialize;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "checkin")]
#[command(about = "Workshop registration and check-in", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Apply database migrations
    Migrate,

    /// Print the effective configuration
    Config,

    /// Resolve a scanned or typed value and check the holder in
    Scan {
        /// Workshop being checked into
        #[arg(short, long)]
        workshop: i64,

        /// Operator performing the scan
        #[arg(short, long)]
        operator: i64,

        /// Raw scanner output or typed text
        input: String,
    },

    /// Search participants by name, email or secondary id
    Search {
        /// At least two characters
        query: String,
    },

    /// Sign a known person up for a workshop
    Register {
        /// Workshop to sign up for
        #[arg(short, long)]
        workshop: i64,

        /// Person signing up
        #[arg(short, long)]
        user: i64,
    },

    /// Confirm a registration
    Confirm {
        /// Registration id
        id: i64,

        /// Acting operator
        #[arg(short, long)]
        operator: Option<i64>,
    },

    /// Cancel a registration and release its slot
    Cancel {
        /// Registration id
        id: i64,

        /// Acting operator
        #[arg(short, long)]
        operator: Option<i64>,
    },

    /// Mark a registration as no-show
    NoShow {
        /// Registration id
        id: i64,

        /// Acting operator
        #[arg(short, long)]
        operator: i64,
    },

    /// Print the QR payload for a registration
    Qr {
        /// Registration id
        id: i64,
    },
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{json}");
    Ok(())
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                "checkin_cli=info,checkin_runtime=info,checkin_postgres=info".into()
            }),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    checkin_runtime::metrics::register_metrics();

    let cli = Cli::parse();
    let config = Config::from_env();

    if matches!(cli.command, Commands::Config) {
        return print_json(&config);
    }

    let service_config = config.service_config()?;
    let pool = checkin_postgres::connect(
        &config.database.url,
        config.database.max_connections,
        config.connect_timeout(),
    )
    .await?;

    let service = CheckInService::with_config(
        PostgresCheckInStore::new(pool.clone()),
        PostgresDirectory::new(pool.clone()),
        Arc::new(SystemClock),
        service_config,
    );

    match cli.command {
        Commands::Migrate => {
            checkin_postgres::migrate(&pool).await?;
            print_json(&serde_json::json!({ "migrated": true }))
        }
        Commands::Config => Ok(()),
        Commands::Scan {
            workshop,
            operator,
            input,
        } => {
            let result = service
                .resolve_and_check_in(&input, WorkshopId::new(workshop), OperatorId::new(operator))
                .await;
            info!(success = result.success, "Scan processed");
            print_json(&result)
        }
        Commands::Search { query } => print_json(&service.search_participants(&query).await?),
        Commands::Register { workshop, user } => print_json(
            &service
                .register(WorkshopId::new(workshop), UserId::new(user))
                .await?,
        ),
        Commands::Confirm { id, operator } => print_json(
            &service
                .confirm(RegistrationId::new(id), operator.map(OperatorId::new))
                .await?,
        ),
        Commands::Cancel { id, operator } => print_json(
            &service
                .cancel(RegistrationId::new(id), operator.map(OperatorId::new))
                .await?,
        ),
        Commands::NoShow { id, operator } => print_json(
            &service
                .mark_no_show(RegistrationId::new(id), OperatorId::new(operator))
                .await?,
        ),
        Commands::Qr { id } => {
            let content = service.qr_content(RegistrationId::new(id)).await?;
            print_json(&serde_json::json!({ "registration_id": id, "content": content }))
        }
    }
}
