//! Transaction ingestion command

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use spendcast_core::{ForecastService, TransactionRecord};

use super::print_outcome;

/// Read a JSON array of transaction records
pub fn read_transactions_file(path: &Path) -> Result<Vec<TransactionRecord>> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Invalid transaction JSON in {}", path.display()))
}

pub fn cmd_add_transactions(
    service: &ForecastService,
    user: &str,
    file: &Path,
    no_retrain: bool,
) -> Result<()> {
    let records = read_transactions_file(file)?;
    println!("📥 Adding {} transactions for {}...", records.len(), user);

    let summary = service
        .add_transactions(user, &records)
        .context("Failed to add transactions")?;

    println!("   Added: {}", summary.added);
    if summary.duplicates > 0 {
        println!("   Skipped duplicates: {}", summary.duplicates);
    }
    println!("   Total logged: {}", summary.transaction_count);

    if !no_retrain {
        print_outcome(&service.maybe_retrain(user));
    }

    Ok(())
}
