//! Prediction command implementations

use anyhow::{Context, Result};
use spendcast_core::{ExpenseObservation, ForecastService, PredictionSource};

use crate::cli::ObservationArgs;

fn observation(args: &ObservationArgs) -> ExpenseObservation {
    ExpenseObservation::new(args.income, args.expenses, args.month, args.savings)
}

pub fn cmd_predict(
    service: &ForecastService,
    user: &str,
    args: &ObservationArgs,
    json: bool,
) -> Result<()> {
    let prediction = service.predict_detailed(user, &observation(args));

    if json {
        println!("{}", serde_json::to_string_pretty(&prediction)?);
        return Ok(());
    }

    println!("🔮 Next month's expenses for {}: {:.2}", user, prediction.value);
    match prediction.source {
        PredictionSource::Personalized => {
            if let Some(weights) = prediction.weights {
                println!(
                    "   Blend: {:.0}% base / {:.0}% personal",
                    weights.base * 100.0,
                    weights.personal * 100.0
                );
            }
        }
        PredictionSource::Base => {
            println!("   ⚠️  Personal model unavailable, used the base model");
        }
        PredictionSource::Heuristic => {
            println!("   ⚠️  No model available, estimated from current expenses");
        }
    }
    if let Some(bounds) = prediction.bounds {
        println!("   Range: {:.2} - {:.2}", bounds.lower, bounds.upper);
    }

    Ok(())
}

pub fn cmd_predict_base(service: &ForecastService, args: &ObservationArgs) -> Result<()> {
    let value = service
        .predict_base(args.income, args.expenses, args.month, args.savings)
        .context("Base model prediction failed")?;

    println!("🔮 Base model prediction: {:.2}", value);
    Ok(())
}
