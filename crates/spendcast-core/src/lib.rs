//! Spendcast Core Library
//!
//! Per-user next-month expense forecasting layered on a shared base model:
//! - File-backed model store with atomic artifact writes
//! - Transaction aggregation into monthly training pairs
//! - Retraining policy and base/personal blend weights
//! - Personalized predictor with ordered fallback (personal → base → heuristic)
//! - Seasonal and income-aware bounds on every prediction
//! - Pluggable regressor and scaler capabilities with a dense network default

pub mod aggregate;
pub mod bounds;
pub mod config;
pub mod error;
pub mod ml;
pub mod models;
pub mod policy;
pub mod predictor;
pub mod service;
pub mod store;
pub mod trainer;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;

pub use aggregate::{build_training_set, monthly_totals, MonthlySummary};
pub use bounds::{clamp_prediction, PredictionBounds, Season};
pub use config::{ForecastConfig, ModelConfig, TrainingConfig};
pub use error::{Error, Result};
pub use ml::{
    DenseRegressor, FeatureRow, FeatureScaler, FitHistory, FitOptions, Regressor, StandardScaler,
};
pub use models::{
    BlendWeights, ExpenseObservation, ModelMetadata, PerformanceMetrics, TrainingPair,
    TransactionRecord, TransactionType,
};
pub use policy::{compute_weights, should_retrain, RetrainPolicy};
pub use predictor::{
    validate_observation, BasePredictor, PersonalizedPredictor, Prediction, PredictionSource,
};
pub use service::{ForecastService, IngestOutcome, UserStatus};
pub use store::{AppendSummary, ModelStore};
pub use trainer::{
    fit_base_model, load_base_training_csv, train, BaseModel, RetrainOutcome, TrainingReport,
};
