//! Retraining and base model command implementations

use std::path::Path;

use anyhow::{bail, Context, Result};
use spendcast_core::{fit_base_model, load_base_training_csv, ForecastService, RetrainOutcome};

/// Print a retraining outcome
pub fn print_outcome(outcome: &RetrainOutcome) {
    match outcome {
        RetrainOutcome::Skipped => {
            println!("   Retraining not due yet");
        }
        RetrainOutcome::Trained(report) => {
            println!("✅ Model retrained on {} monthly pairs", report.pairs);
            println!(
                "   Epochs: {}{}",
                report.epochs_run,
                if report.stopped_early {
                    " (stopped early)"
                } else {
                    ""
                }
            );
            if let Some(mae) = report.metrics.mae {
                println!("   Validation MAE: {:.2}", mae);
            }
            println!(
                "   Blend: {:.0}% base / {:.0}% personal",
                report.weights.base * 100.0,
                report.weights.personal * 100.0
            );
        }
        RetrainOutcome::Failed(e) if e.is_not_ready() => {
            println!("⏳ Not enough data to train yet: {}", e);
        }
        RetrainOutcome::Failed(e) => {
            println!("❌ Training failed, previous model kept: {}", e);
        }
    }
}

pub fn cmd_retrain(service: &ForecastService, user: &str, force: bool) -> Result<()> {
    println!("🧠 Retraining model for {}...", user);

    let outcome = service.retrain(user, force);
    print_outcome(&outcome);

    match outcome {
        RetrainOutcome::Failed(e) if !e.is_not_ready() => {
            Err(e).context("Retraining failed")
        }
        _ => Ok(()),
    }
}

pub fn cmd_train_base(service: &ForecastService, data: &Path, epochs: Option<usize>) -> Result<()> {
    println!("🧠 Fitting base model from {}...", data.display());

    let pairs = load_base_training_csv(data)
        .with_context(|| format!("Failed to read training data from {}", data.display()))?;
    if pairs.is_empty() {
        bail!("No training rows in {}", data.display());
    }
    println!("   Rows: {}", pairs.len());

    let config = service.config();
    let mut options = config.training.fit_options();
    if let Some(epochs) = epochs {
        options.epochs = epochs;
    }

    let base = fit_base_model(&pairs, &config.model, &options).context("Base model training failed")?;

    service
        .store()
        .save_base_artifacts(&base.regressor, &base.scaler)
        .context("Failed to save base model")?;

    println!("✅ Base model installed in {}", service.store().base_dir().display());
    println!("   Epochs: {}", base.history.epochs_run());
    if let Some(mae) = base.history.final_val_mae() {
        println!("   Validation MAE: {:.2}", mae);
    }

    Ok(())
}
