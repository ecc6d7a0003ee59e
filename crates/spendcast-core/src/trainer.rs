//! Per-user training runs and base model fitting

use std::path::Path;
use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::aggregate::build_training_set;
use crate::config::{ModelConfig, TrainingConfig};
use crate::error::{Error, Result};
use crate::ml::{
    fit, DenseRegressor, FeatureRow, FeatureScaler, FitHistory, FitOptions, Regressor,
    StandardScaler,
};
use crate::models::{BlendWeights, ExpenseObservation, PerformanceMetrics, TrainingPair};
use crate::policy::weights_after_training;
use crate::store::ModelStore;

/// Summary of a successful training run
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrainingReport {
    pub user_id: String,
    pub pairs: usize,
    pub epochs_run: usize,
    pub best_epoch: usize,
    pub stopped_early: bool,
    pub metrics: PerformanceMetrics,
    pub weights: BlendWeights,
    pub training_count: u32,
    pub elapsed_secs: f64,
}

/// Result of asking for a retrain. Failures are values, not panics.
#[derive(Debug)]
pub enum RetrainOutcome {
    /// Policy thresholds were not met; nothing ran
    Skipped,
    Trained(TrainingReport),
    /// Training ran (or tried to) and failed; prior state is intact
    Failed(Error),
}

impl RetrainOutcome {
    pub fn is_trained(&self) -> bool {
        matches!(self, RetrainOutcome::Trained(_))
    }

    /// Short label for CLI output and API responses
    pub fn status(&self) -> &'static str {
        match self {
            RetrainOutcome::Skipped => "skipped",
            RetrainOutcome::Trained(_) => "trained",
            RetrainOutcome::Failed(e) if e.is_not_ready() => "not_ready",
            RetrainOutcome::Failed(_) => "failed",
        }
    }

    pub fn reason(&self) -> Option<String> {
        match self {
            RetrainOutcome::Failed(e) => Some(e.to_string()),
            _ => None,
        }
    }

    pub fn report(&self) -> Option<&TrainingReport> {
        match self {
            RetrainOutcome::Trained(report) => Some(report),
            _ => None,
        }
    }
}

/// Retrain a user's regressor on their own transaction history.
///
/// The user's scaler is applied as-is and never refit. Artifacts are only
/// written after a successful fit, so any error leaves the committed model
/// and metadata untouched.
pub fn train<R: Regressor, S: FeatureScaler>(
    store: &ModelStore<R, S>,
    uid: &str,
    config: &TrainingConfig,
) -> Result<TrainingReport> {
    let started = Instant::now();
    let options = config.fit_options();

    store.ensure_initialized(uid)?;

    let log = store.load_transaction_log(uid)?;
    let pairs = build_training_set(&log)?;
    if pairs.len() < config.min_pairs {
        return Err(Error::InsufficientTrainingData(format!(
            "Need at least {} monthly pairs, found {}",
            config.min_pairs,
            pairs.len()
        )));
    }

    let scaler = store.load_scaler(uid)?;
    let (x, y) = scaled_rows(&scaler, &pairs)?;

    let previous = store.load_regressor(uid)?;
    let mut model = previous.clone();
    let history = fit(&mut model, &x, &y, &options)?;

    let mut metadata = store.load_metadata(uid)?;
    store.save_regressor(uid, &model)?;

    metadata.training_count += 1;
    metadata.last_trained_at = Some(Utc::now());
    metadata.set_weights(weights_after_training(
        metadata.transaction_count,
        metadata.weights(),
    ));
    metadata.performance_metrics = PerformanceMetrics {
        mae: history.final_val_mae(),
        mse: history.final_val_mse(),
    };

    if let Err(e) = store.save_metadata(uid, &metadata) {
        // Put the old regressor back so model and metadata stay consistent
        if let Err(rollback) = store.save_regressor(uid, &previous) {
            warn!(user = uid, error = %rollback, "Failed to restore previous regressor");
        }
        return Err(e);
    }

    let report = TrainingReport {
        user_id: uid.to_string(),
        pairs: pairs.len(),
        epochs_run: history.epochs_run(),
        best_epoch: history.best_epoch,
        stopped_early: history.stopped_early,
        metrics: metadata.performance_metrics,
        weights: metadata.weights(),
        training_count: metadata.training_count,
        elapsed_secs: started.elapsed().as_secs_f64(),
    };

    info!(
        user = uid,
        pairs = report.pairs,
        epochs = report.epochs_run,
        val_mae = ?report.metrics.mae,
        "Trained personalized model"
    );

    Ok(report)
}

/// Run [`train`] and fold the result into a [`RetrainOutcome`]
pub fn train_outcome<R: Regressor, S: FeatureScaler>(
    store: &ModelStore<R, S>,
    uid: &str,
    config: &TrainingConfig,
) -> RetrainOutcome {
    match train(store, uid, config) {
        Ok(report) => RetrainOutcome::Trained(report),
        Err(e) if e.is_not_ready() => {
            info!(user = uid, reason = %e, "Not enough data to train yet");
            RetrainOutcome::Failed(e)
        }
        Err(e) => {
            warn!(user = uid, error = %e, "Training failed, keeping previous model");
            RetrainOutcome::Failed(e)
        }
    }
}

fn scaled_rows<S: FeatureScaler>(
    scaler: &S,
    pairs: &[TrainingPair],
) -> Result<(Vec<FeatureRow>, Vec<f64>)> {
    let x = pairs
        .iter()
        .map(|p| scaler.transform(&p.features.features()))
        .collect::<Result<Vec<_>>>()?;
    let y = pairs.iter().map(|p| p.target).collect();
    Ok((x, y))
}

// ========== Base model ==========

/// One row of a base model training file
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BaseTrainingRow {
    pub income: f64,
    pub expenses: f64,
    pub month: u32,
    pub savings: f64,
    pub next_expenses: f64,
}

impl From<BaseTrainingRow> for TrainingPair {
    fn from(row: BaseTrainingRow) -> Self {
        TrainingPair {
            features: ExpenseObservation::new(row.income, row.expenses, row.month, row.savings),
            target: row.next_expenses,
        }
    }
}

/// Read `income,expenses,month,savings,next_expenses` rows from a CSV file
pub fn load_base_training_csv(path: &Path) -> Result<Vec<TrainingPair>> {
    let mut reader = csv::Reader::from_path(path)?;
    let mut pairs = Vec::new();

    for (line, row) in reader.deserialize::<BaseTrainingRow>().enumerate() {
        let row = row?;
        if !(1..=12).contains(&row.month) {
            return Err(Error::InvalidInput(format!(
                "Row {}: month must be 1-12, got {}",
                line + 1,
                row.month
            )));
        }
        pairs.push(row.into());
    }

    Ok(pairs)
}

/// A freshly fitted base model
#[derive(Debug, Clone)]
pub struct BaseModel {
    pub regressor: DenseRegressor,
    pub scaler: StandardScaler,
    pub history: FitHistory,
}

/// Fit a new scaler and regressor for the shared base model
pub fn fit_base_model(
    pairs: &[TrainingPair],
    model: &ModelConfig,
    options: &FitOptions,
) -> Result<BaseModel> {
    if pairs.len() < 2 {
        return Err(Error::InsufficientTrainingData(format!(
            "Base model needs at least 2 rows, found {}",
            pairs.len()
        )));
    }

    let raw: Vec<FeatureRow> = pairs.iter().map(|p| p.features.features()).collect();
    let scaler = StandardScaler::fit(&raw)?;
    let (x, y) = scaled_rows(&scaler, pairs)?;

    let mut regressor = DenseRegressor::new(model.hidden_units, model.learning_rate, model.seed);
    let history = fit(&mut regressor, &x, &y, options)?;

    info!(
        rows = pairs.len(),
        epochs = history.epochs_run(),
        val_mae = ?history.final_val_mae(),
        "Fitted base model"
    );

    Ok(BaseModel {
        regressor,
        scaler,
        history,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::BlendWeights;
    use crate::test_utils::{
        fixture_store, install_constant_base, monthly_transactions, ConstantRegressor,
    };
    use std::io::Write;
    use std::time::Duration;

    #[test]
    fn test_train_updates_model_and_metadata() {
        let (_dir, store) = fixture_store();
        install_constant_base(&store, 6000.0);
        // 5 months, 5 records each: 25 transactions, 4 pairs
        store
            .append_transactions("alice", &monthly_transactions(5, 4))
            .unwrap();

        let report = train(&store, "alice", &TrainingConfig::default()).unwrap();
        assert_eq!(report.pairs, 4);
        assert_eq!(report.training_count, 1);
        assert_eq!(report.weights, BlendWeights::new(0.7, 0.3));

        let meta = store.load_metadata("alice").unwrap();
        assert_eq!(meta.training_count, 1);
        assert!(meta.last_trained_at.is_some());
        assert_eq!(meta.weights(), BlendWeights::new(0.7, 0.3));
        assert!(meta.performance_metrics.mae.is_some());
        assert!(meta.performance_metrics.mse.is_some());

        let regressor = store.load_regressor("alice").unwrap();
        assert_ne!(regressor.value, 6000.0);
    }

    #[test]
    fn test_too_few_pairs_leaves_state_untouched() {
        let (_dir, store) = fixture_store();
        install_constant_base(&store, 6000.0);
        store
            .append_transactions("bob", &monthly_transactions(3, 1))
            .unwrap();
        let before = store.load_metadata("bob").unwrap();

        let result = train(&store, "bob", &TrainingConfig::default());
        assert!(matches!(result, Err(Error::InsufficientTrainingData(_))));
        assert_eq!(store.load_metadata("bob").unwrap(), before);
        assert_eq!(store.load_regressor("bob").unwrap().value, 6000.0);
    }

    #[test]
    fn test_timeout_leaves_state_untouched() {
        let (_dir, store) = fixture_store();
        install_constant_base(&store, 6000.0);
        store
            .append_transactions("carol", &monthly_transactions(6, 2))
            .unwrap();
        let before = store.load_metadata("carol").unwrap();

        let config = TrainingConfig {
            timeout: Some(Duration::ZERO),
            ..Default::default()
        };
        let outcome = train_outcome(&store, "carol", &config);
        assert_eq!(outcome.status(), "failed");
        assert!(matches!(
            outcome,
            RetrainOutcome::Failed(Error::TrainingTimeout { .. })
        ));
        assert_eq!(store.load_metadata("carol").unwrap(), before);
        assert_eq!(store.load_regressor("carol").unwrap().value, 6000.0);
    }

    #[test]
    fn test_not_ready_outcome() {
        let (_dir, store) = fixture_store();
        install_constant_base(&store, 6000.0);

        let outcome = train_outcome(&store, "dave", &TrainingConfig::default());
        assert_eq!(outcome.status(), "not_ready");
        assert!(outcome.reason().is_some());
        assert!(!outcome.is_trained());
    }

    #[test]
    fn test_training_without_base_is_storage_failure() {
        let (_dir, store) = fixture_store();
        let outcome = train_outcome(&store, "erin", &TrainingConfig::default());
        assert!(matches!(
            outcome,
            RetrainOutcome::Failed(Error::StorageUnavailable(_))
        ));
    }

    #[test]
    fn test_load_base_training_csv() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "income,expenses,month,savings,next_expenses").unwrap();
        writeln!(file, "5000,3000,1,2000,3100").unwrap();
        writeln!(file, "5200,3100,2,2100,2900").unwrap();

        let pairs = load_base_training_csv(file.path()).unwrap();
        assert_eq!(pairs.len(), 2);
        assert_eq!(
            pairs[0].features,
            ExpenseObservation::new(5000.0, 3000.0, 1, 2000.0)
        );
        assert_eq!(pairs[1].target, 2900.0);
    }

    #[test]
    fn test_load_base_training_csv_rejects_bad_month() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "income,expenses,month,savings,next_expenses").unwrap();
        writeln!(file, "5000,3000,13,2000,3100").unwrap();

        assert!(matches!(
            load_base_training_csv(file.path()),
            Err(Error::InvalidInput(_))
        ));
    }

    #[test]
    fn test_fit_base_model_learns_scale() {
        let pairs: Vec<TrainingPair> = (0..60)
            .map(|i| {
                let income = 4000.0 + 50.0 * (i % 20) as f64;
                let expenses = income * 0.6;
                TrainingPair {
                    features: ExpenseObservation::new(
                        income,
                        expenses,
                        (i % 12) as u32 + 1,
                        income - expenses,
                    ),
                    target: expenses * 1.02,
                }
            })
            .collect();

        let options = FitOptions {
            epochs: 200,
            patience: 20,
            ..Default::default()
        };
        let base = fit_base_model(&pairs, &ModelConfig::default(), &options).unwrap();
        assert!(base.history.epochs_run() > 0);

        // Predictions land in the right neighborhood of the targets
        let row = base
            .scaler
            .transform(&pairs[10].features.features())
            .unwrap();
        let predicted = base.regressor.predict(&row).unwrap();
        assert!((predicted - pairs[10].target).abs() < pairs[10].target * 0.5);
    }

    #[test]
    fn test_constant_regressor_fits_mean() {
        let mut model = ConstantRegressor::new(0.0);
        let x = vec![[0.0; 4]; 4];
        let y = vec![10.0, 20.0, 30.0, 40.0];
        fit(&mut model, &x, &y, &FitOptions::default()).unwrap();
        // Three training rows, one held out
        assert!((model.value - 20.0).abs() < 1e-9);
    }
}
