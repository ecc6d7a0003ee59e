//! CLI argument definitions using clap
//!
//! This module contains all the clap structs and enums for parsing CLI arguments.
//! The actual command implementations are in the `commands` module.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

/// Spendcast - Personalized next-month expense forecasts
#[derive(Parser)]
#[command(name = "spendcast")]
#[command(about = "Per-user expense forecasting on a shared base model", long_about = None)]
#[command(version)]
pub struct Cli {
    /// Config file (defaults to the data-dir override, then built-in defaults)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Data directory holding base and per-user models
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

/// A single month's figures
#[derive(Args, Debug, Clone)]
pub struct ObservationArgs {
    /// Monthly income
    #[arg(long)]
    pub income: f64,

    /// Current monthly expenses (0 if unknown)
    #[arg(long, default_value = "0")]
    pub expenses: f64,

    /// Calendar month (1-12)
    #[arg(long)]
    pub month: u32,

    /// Current monthly savings
    #[arg(long, default_value = "0")]
    pub savings: f64,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Predict a user's expenses for next month
    Predict {
        /// User id
        #[arg(short, long)]
        user: String,

        #[command(flatten)]
        observation: ObservationArgs,

        /// Print the result as JSON
        #[arg(long)]
        json: bool,
    },

    /// Predict with the shared base model only
    PredictBase {
        #[command(flatten)]
        observation: ObservationArgs,
    },

    /// Append transactions from a JSON file, then retrain if due
    AddTransactions {
        /// User id
        #[arg(short, long)]
        user: String,

        /// JSON array of {amount, type, date, currency, id?}
        #[arg(short, long)]
        file: PathBuf,

        /// Skip the retraining check after ingesting
        #[arg(long)]
        no_retrain: bool,
    },

    /// Retrain a user's model
    Retrain {
        /// User id
        #[arg(short, long)]
        user: String,

        /// Train even if the retraining policy says it is not due
        #[arg(long)]
        force: bool,
    },

    /// Show model status for a user, or list users
    Status {
        /// User id (lists all users when omitted)
        #[arg(short, long)]
        user: Option<String>,
    },

    /// Fit and install a new base model from CSV
    TrainBase {
        /// CSV with columns income,expenses,month,savings,next_expenses
        #[arg(short, long)]
        data: PathBuf,

        /// Training epochs (defaults to the configured value)
        #[arg(long)]
        epochs: Option<usize>,
    },

    /// Start the web server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "3000")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,

        /// Allowed CORS origin (repeatable)
        #[arg(long = "allow-origin")]
        allowed_origins: Vec<String>,
    },
}
