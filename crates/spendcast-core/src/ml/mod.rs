//! Learned-function capabilities behind the forecasting core
//!
//! The core never depends on a particular numeric toolkit. It talks to two
//! capabilities:
//!
//! - `FeatureScaler`: a fitted, invertible feature transform
//! - `Regressor`: a trainable function from scaled features to next-month expenses
//!
//! Both are persisted as JSON artifacts through serde, which is what gives
//! them their save/load capability. The training policy (validation split,
//! early stopping with patience, restore-best-weights, wall-clock deadline)
//! lives in [`fit`] so every regressor is trained the same way.
//!
//! Concrete implementations: [`StandardScaler`] and [`DenseRegressor`].

mod dense;
mod scaler;

pub use dense::DenseRegressor;
pub use scaler::StandardScaler;

use std::time::Instant;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{Error, Result};
use crate::models::FEATURE_COUNT;

/// A single feature row in `[income, expenses, month, savings]` order
pub type FeatureRow = [f64; FEATURE_COUNT];

/// Fitted transform applied to raw features before they reach a regressor
pub trait FeatureScaler: Serialize + DeserializeOwned + Send + Sync {
    fn transform(&self, row: &FeatureRow) -> Result<FeatureRow>;

    fn inverse_transform(&self, row: &FeatureRow) -> Result<FeatureRow>;
}

/// Trainable regressor over scaled feature rows
pub trait Regressor: Serialize + DeserializeOwned + Clone + Send + Sync {
    /// Predict next-month expenses for one scaled row
    fn predict(&self, row: &FeatureRow) -> Result<f64>;

    /// Hook run once before the first epoch of a fit
    fn prepare(&mut self, _x: &[FeatureRow], _y: &[f64]) -> Result<()> {
        Ok(())
    }

    /// Run one pass over the training data, returning the mean training loss
    fn train_epoch(&mut self, x: &[FeatureRow], y: &[f64], batch_size: usize) -> Result<f64>;
}

/// Options controlling a fit
#[derive(Debug, Clone)]
pub struct FitOptions {
    pub epochs: usize,
    pub max_batch_size: usize,
    /// Fraction of rows (taken from the tail) held out for validation
    pub validation_split: f64,
    /// Epochs without validation improvement before stopping
    pub patience: usize,
    pub restore_best_weights: bool,
    /// Abort with `TrainingTimeout` once this instant passes
    pub deadline: Option<Instant>,
}

impl Default for FitOptions {
    fn default() -> Self {
        Self {
            epochs: 100,
            max_batch_size: 32,
            validation_split: 0.2,
            patience: 10,
            restore_best_weights: true,
            deadline: None,
        }
    }
}

/// Per-epoch record of a fit
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FitHistory {
    pub train_loss: Vec<f64>,
    pub val_loss: Vec<f64>,
    pub val_mae: Vec<f64>,
    /// Epoch (0-based) with the lowest validation loss
    pub best_epoch: usize,
    pub stopped_early: bool,
}

impl FitHistory {
    pub fn epochs_run(&self) -> usize {
        self.train_loss.len()
    }

    pub fn final_val_mae(&self) -> Option<f64> {
        self.val_mae.last().copied()
    }

    pub fn final_val_mse(&self) -> Option<f64> {
        self.val_loss.last().copied()
    }
}

/// Outcome of feeding one validation loss to [`EarlyStopping`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopDecision {
    Improved,
    Continue,
    Stop,
}

/// Patience window on validation loss
#[derive(Debug, Clone)]
pub struct EarlyStopping {
    patience: usize,
    best: f64,
    best_epoch: usize,
    wait: usize,
    epoch: usize,
}

impl EarlyStopping {
    pub fn new(patience: usize) -> Self {
        Self {
            patience,
            best: f64::INFINITY,
            best_epoch: 0,
            wait: 0,
            epoch: 0,
        }
    }

    pub fn update(&mut self, val_loss: f64) -> StopDecision {
        let epoch = self.epoch;
        self.epoch += 1;

        if val_loss < self.best {
            self.best = val_loss;
            self.best_epoch = epoch;
            self.wait = 0;
            return StopDecision::Improved;
        }

        self.wait += 1;
        if self.wait >= self.patience {
            StopDecision::Stop
        } else {
            StopDecision::Continue
        }
    }

    pub fn best_epoch(&self) -> usize {
        self.best_epoch
    }
}

/// Number of leading rows used for training; the rest validate.
///
/// The training share is `floor(n * (1 - split))`, clamped so at least one
/// row trains and, once two rows exist, at least one row validates.
pub fn training_len(n: usize, validation_split: f64) -> usize {
    if n < 2 {
        return n;
    }
    let train = ((n as f64) * (1.0 - validation_split.clamp(0.0, 1.0))).floor() as usize;
    train.clamp(1, n - 1)
}

/// Mean squared and mean absolute error of `model` over `(x, y)`
pub fn evaluate<R: Regressor>(model: &R, x: &[FeatureRow], y: &[f64]) -> Result<(f64, f64)> {
    if x.is_empty() {
        return Err(Error::Model("Cannot evaluate on an empty set".to_string()));
    }

    let mut se = 0.0;
    let mut ae = 0.0;
    for (row, target) in x.iter().zip(y) {
        let err = model.predict(row)? - target;
        se += err * err;
        ae += err.abs();
    }
    let n = x.len() as f64;
    Ok((se / n, ae / n))
}

/// Fit `model` with a held-out validation tail and early stopping.
///
/// On any error the caller's copy of the model should be treated as dirty;
/// callers that must keep the prior state train a clone.
pub fn fit<R: Regressor>(
    model: &mut R,
    x: &[FeatureRow],
    y: &[f64],
    options: &FitOptions,
) -> Result<FitHistory> {
    if x.len() != y.len() {
        return Err(Error::Training(format!(
            "Feature/target length mismatch: {} vs {}",
            x.len(),
            y.len()
        )));
    }
    if x.is_empty() {
        return Err(Error::InsufficientTrainingData(
            "No training rows".to_string(),
        ));
    }

    let started = Instant::now();
    let n_train = training_len(x.len(), options.validation_split);
    let (x_train, x_val) = x.split_at(n_train);
    let (y_train, y_val) = y.split_at(n_train);
    let batch_size = options.max_batch_size.clamp(1, n_train.max(1));

    model.prepare(x_train, y_train)?;

    let mut stopper = EarlyStopping::new(options.patience);
    let mut best: Option<R> = None;
    let mut history = FitHistory::default();

    for epoch in 0..options.epochs {
        if let Some(deadline) = options.deadline {
            if Instant::now() >= deadline {
                return Err(Error::TrainingTimeout {
                    elapsed_secs: started.elapsed().as_secs_f64(),
                });
            }
        }

        let train_loss = model.train_epoch(x_train, y_train, batch_size)?;
        if !train_loss.is_finite() {
            return Err(Error::Training(format!(
                "Training loss diverged at epoch {}",
                epoch + 1
            )));
        }

        // Without a validation tail the training rows stand in for it
        let (val_mse, val_mae) = if x_val.is_empty() {
            evaluate(model, x_train, y_train)?
        } else {
            evaluate(model, x_val, y_val)?
        };
        if !val_mse.is_finite() {
            return Err(Error::Training(format!(
                "Validation loss diverged at epoch {}",
                epoch + 1
            )));
        }

        history.train_loss.push(train_loss);
        history.val_loss.push(val_mse);
        history.val_mae.push(val_mae);

        match stopper.update(val_mse) {
            StopDecision::Improved => {
                if options.restore_best_weights {
                    best = Some(model.clone());
                }
            }
            StopDecision::Continue => {}
            StopDecision::Stop => {
                debug!(epoch = epoch + 1, "Early stopping triggered");
                history.stopped_early = true;
                break;
            }
        }
    }

    history.best_epoch = stopper.best_epoch();
    if let Some(best_model) = best {
        *model = best_model;
    }

    Ok(history)
}
