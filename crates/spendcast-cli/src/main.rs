//! Spendcast CLI - Personalized expense forecasting
//!
//! Usage:
//!   spendcast train-base --data base.csv        Fit and install the base model
//!   spendcast add-transactions -u ID -f tx.json Ingest and retrain if due
//!   spendcast predict -u ID --income N --month M
//!   spendcast serve --port 3000                 Start web server

mod cli;
mod commands;

#[cfg(test)]
mod tests;

use anyhow::Result;
use clap::Parser;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use cli::*;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    // Priority: RUST_LOG env var > --verbose flag > default (info)
    let filter = if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("info")
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .init();

    let config = commands::load_config(cli.config.as_deref(), cli.data_dir.as_deref())?;

    match cli.command {
        Commands::Predict {
            user,
            observation,
            json,
        } => commands::cmd_predict(&commands::open_service(config), &user, &observation, json),
        Commands::PredictBase { observation } => {
            commands::cmd_predict_base(&commands::open_service(config), &observation)
        }
        Commands::AddTransactions {
            user,
            file,
            no_retrain,
        } => commands::cmd_add_transactions(
            &commands::open_service(config),
            &user,
            &file,
            no_retrain,
        ),
        Commands::Retrain { user, force } => {
            commands::cmd_retrain(&commands::open_service(config), &user, force)
        }
        Commands::Status { user } => {
            commands::cmd_status(&commands::open_service(config), user.as_deref())
        }
        Commands::TrainBase { data, epochs } => {
            commands::cmd_train_base(&commands::open_service(config), &data, epochs)
        }
        Commands::Serve {
            port,
            host,
            allowed_origins,
        } => commands::cmd_serve(config, &host, port, allowed_origins).await,
    }
}
