//! Status command implementation

use anyhow::{Context, Result};
use spendcast_core::ForecastService;

pub fn cmd_status(service: &ForecastService, user: Option<&str>) -> Result<()> {
    let store = service.store();

    println!();
    println!("📊 Spendcast Status");
    println!("   ─────────────────────────────────────────────────────────────");
    println!("   Data dir: {}", store.root().display());
    if store.has_base_artifacts() {
        println!("   Base model: installed");
    } else {
        println!("   ❌ Base model: missing (run `spendcast train-base`)");
    }

    let Some(user) = user else {
        let users = store.list_users().context("Failed to list users")?;
        println!("   Users: {}", users.len());
        for uid in users {
            println!("     - {}", uid);
        }
        println!();
        return Ok(());
    };

    let status = service
        .status(user)
        .with_context(|| format!("Failed to read status for {}", user))?;
    let meta = &status.metadata;

    println!();
    println!("   User: {}", status.user_id);
    println!(
        "   Model: {}",
        if status.initialized {
            "initialized"
        } else {
            "not initialized (bootstraps on first prediction)"
        }
    );
    println!("   Transactions: {}", meta.transaction_count);
    println!("   Trainings: {}", meta.training_count);
    match meta.last_trained_at {
        Some(at) => println!("   Last trained: {}", at.format("%Y-%m-%d %H:%M UTC")),
        None => println!("   Last trained: never"),
    }
    println!(
        "   Blend: {:.0}% base / {:.0}% personal",
        meta.base_weight * 100.0,
        meta.personal_weight * 100.0
    );
    if let (Some(mae), Some(mse)) = (
        meta.performance_metrics.mae,
        meta.performance_metrics.mse,
    ) {
        println!("   Validation: MAE {:.2}, MSE {:.2}", mae, mse);
    }
    println!(
        "   Retrain due: {}",
        if status.retrain_due { "yes" } else { "no" }
    );
    println!();

    Ok(())
}
