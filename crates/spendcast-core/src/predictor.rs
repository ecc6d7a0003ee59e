//! Expense predictors
//!
//! [`BasePredictor`] runs the shared base model and reports failures.
//! [`PersonalizedPredictor`] blends a user's model with the base model and
//! never fails: it walks an ordered fallback pipeline
//!
//! 1. personalized blend
//! 2. base model only
//! 3. heuristic `expenses * 1.05`
//!
//! and returns the first stage that succeeds.

use serde::Serialize;
use tracing::{debug, warn};

use crate::bounds::PredictionBounds;
use crate::error::{Error, Result};
use crate::ml::{DenseRegressor, FeatureRow, FeatureScaler, Regressor, StandardScaler};
use crate::models::{BlendWeights, ExpenseObservation};
use crate::store::ModelStore;

/// Floor for the substituted expenses when none were reported
const MIN_SUBSTITUTE_EXPENSES: f64 = 1000.0;
/// Share of income assumed as expenses when none were reported
const SUBSTITUTE_INCOME_SHARE: f64 = 0.1;
/// Growth applied by the last-resort estimate
const HEURISTIC_GROWTH: f64 = 1.05;

/// Which pipeline stage produced a prediction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictionSource {
    Personalized,
    Base,
    Heuristic,
}

impl PredictionSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            PredictionSource::Personalized => "personalized",
            PredictionSource::Base => "base",
            PredictionSource::Heuristic => "heuristic",
        }
    }
}

/// A prediction and how it was produced
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Prediction {
    pub value: f64,
    pub source: PredictionSource,
    /// Clamp interval applied, absent for the heuristic stage
    pub bounds: Option<PredictionBounds>,
    /// Blend used by the personalized stage
    pub weights: Option<BlendWeights>,
}

/// Check an observation and substitute missing expenses.
///
/// Income must be positive and the month in 1-12. Non-positive expenses are
/// replaced with `max(income * 0.1, 1000)`.
pub fn validate_observation(obs: &ExpenseObservation) -> Result<ExpenseObservation> {
    if !obs.income.is_finite() || obs.income <= 0.0 {
        return Err(Error::InvalidInput(format!(
            "Income must be positive, got {}",
            obs.income
        )));
    }
    if !(1..=12).contains(&obs.month) {
        return Err(Error::InvalidInput(format!(
            "Month must be 1-12, got {}",
            obs.month
        )));
    }
    if !obs.expenses.is_finite() || !obs.savings.is_finite() {
        return Err(Error::InvalidInput(
            "Expenses and savings must be finite".to_string(),
        ));
    }

    let mut validated = *obs;
    if validated.expenses <= 0.0 {
        validated.expenses =
            (validated.income * SUBSTITUTE_INCOME_SHARE).max(MIN_SUBSTITUTE_EXPENSES);
        debug!(
            substituted = validated.expenses,
            "Substituted missing expenses"
        );
    }
    Ok(validated)
}

/// Last-resort estimate: 5% growth on current expenses
pub fn heuristic_estimate(obs: &ExpenseObservation) -> f64 {
    let expenses = validate_observation(obs)
        .map(|v| v.expenses)
        .unwrap_or(obs.expenses);
    let estimate = expenses * HEURISTIC_GROWTH;
    if estimate.is_finite() {
        estimate
    } else {
        0.0
    }
}

fn raw_output<R: Regressor, S: FeatureScaler>(
    regressor: &R,
    scaler: &S,
    row: &FeatureRow,
) -> Result<f64> {
    let raw = regressor.predict(&scaler.transform(row)?)?;
    if !raw.is_finite() {
        return Err(Error::Model(format!("Regressor produced {}", raw)));
    }
    Ok(raw)
}

/// Non-personalized predictions from the shared base model
pub struct BasePredictor<'a, R = DenseRegressor, S = StandardScaler> {
    store: &'a ModelStore<R, S>,
}

impl<'a, R: Regressor, S: FeatureScaler> BasePredictor<'a, R, S> {
    pub fn new(store: &'a ModelStore<R, S>) -> Self {
        Self { store }
    }

    pub fn predict(&self, obs: &ExpenseObservation) -> Result<f64> {
        self.predict_detailed(obs).map(|p| p.value)
    }

    pub fn predict_detailed(&self, obs: &ExpenseObservation) -> Result<Prediction> {
        let obs = validate_observation(obs)?;
        let raw = self.raw(&obs.features())?;
        let bounds = PredictionBounds::compute(obs.expenses, obs.month, obs.income);

        Ok(Prediction {
            value: bounds.clamp(raw),
            source: PredictionSource::Base,
            bounds: Some(bounds),
            weights: None,
        })
    }

    /// Unclamped base output for a raw feature row
    fn raw(&self, row: &FeatureRow) -> Result<f64> {
        let scaler = self.store.load_base_scaler()?;
        let regressor = self.store.load_base_regressor()?;
        raw_output(&regressor, &scaler, row)
    }
}

/// Per-user predictions with graceful degradation
pub struct PersonalizedPredictor<'a, R = DenseRegressor, S = StandardScaler> {
    store: &'a ModelStore<R, S>,
}

impl<'a, R: Regressor, S: FeatureScaler> PersonalizedPredictor<'a, R, S> {
    pub fn new(store: &'a ModelStore<R, S>) -> Self {
        Self { store }
    }

    /// Predict next month's expenses. Always yields a value.
    pub fn predict(&self, uid: &str, obs: &ExpenseObservation) -> f64 {
        self.predict_detailed(uid, obs).value
    }

    pub fn predict_detailed(&self, uid: &str, obs: &ExpenseObservation) -> Prediction {
        let base = BasePredictor::new(self.store);
        let stages: [(PredictionSource, &dyn Fn() -> Result<Prediction>); 2] = [
            (PredictionSource::Personalized, &|| self.personalized(uid, obs)),
            (PredictionSource::Base, &|| base.predict_detailed(obs)),
        ];

        for (source, stage) in stages {
            match stage() {
                Ok(prediction) => return prediction,
                Err(e) => warn!(
                    user = uid,
                    stage = source.as_str(),
                    error = %e,
                    "Prediction stage failed, falling back"
                ),
            }
        }

        Prediction {
            value: heuristic_estimate(obs),
            source: PredictionSource::Heuristic,
            bounds: None,
            weights: None,
        }
    }

    fn personalized(&self, uid: &str, obs: &ExpenseObservation) -> Result<Prediction> {
        self.store.ensure_initialized(uid)?;
        let obs = validate_observation(obs)?;
        let row = obs.features();

        let weights = self.store.load_metadata(uid)?.weights();
        let personal_raw = {
            let scaler = self.store.load_scaler(uid)?;
            let regressor = self.store.load_regressor(uid)?;
            raw_output(&regressor, &scaler, &row)?
        };

        let blended = if weights.base > 0.0 {
            let base_raw = BasePredictor::new(self.store).raw(&row)?;
            base_raw * weights.base + personal_raw * weights.personal
        } else {
            personal_raw
        };

        let bounds = PredictionBounds::compute(obs.expenses, obs.month, obs.income);
        Ok(Prediction {
            value: bounds.clamp(blended),
            source: PredictionSource::Personalized,
            bounds: Some(bounds),
            weights: Some(weights),
        })
    }
}
