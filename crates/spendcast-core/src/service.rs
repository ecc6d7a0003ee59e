//! Forecasting service facade
//!
//! `ForecastService` is what the CLI and HTTP server hold. It owns the
//! config and store and serializes mutating work per user: appending
//! transactions and training for one uid never overlap, while different
//! users and all predictions run freely.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::ForecastConfig;
use crate::error::Result;
use crate::ml::{DenseRegressor, FeatureScaler, Regressor, StandardScaler};
use crate::models::{ExpenseObservation, ModelMetadata, TransactionRecord};
use crate::predictor::{BasePredictor, PersonalizedPredictor, Prediction};
use crate::store::{validate_user_id, AppendSummary, ModelStore};
use crate::trainer::{train_outcome, RetrainOutcome};

/// Per-user mutexes, created on first use and dropped once idle
#[derive(Debug, Default)]
struct UserLocks {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl UserLocks {
    /// Run `f` while holding the lock for `uid`
    fn with_lock<T>(&self, uid: &str, f: impl FnOnce() -> T) -> T {
        let lock = self.get(uid);
        let result = {
            let _guard = lock.lock().unwrap_or_else(PoisonError::into_inner);
            f()
        };
        self.release(uid, &lock);
        result
    }

    fn get(&self, uid: &str) -> Arc<Mutex<()>> {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        locks.entry(uid.to_string()).or_default().clone()
    }

    fn release(&self, uid: &str, lock: &Arc<Mutex<()>>) {
        let mut locks = self.locks.lock().unwrap_or_else(PoisonError::into_inner);
        // Only the map and this caller hold it: nobody is waiting
        if Arc::strong_count(lock) == 2 {
            locks.remove(uid);
        }
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.locks.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Snapshot of a user's model state
#[derive(Debug, Clone, Serialize)]
pub struct UserStatus {
    pub user_id: String,
    pub initialized: bool,
    pub metadata: ModelMetadata,
    pub retrain_due: bool,
}

/// Result of ingesting a batch of transactions
#[derive(Debug)]
pub struct IngestOutcome {
    pub appended: AppendSummary,
    pub retrain: RetrainOutcome,
}

pub struct ForecastService<R = DenseRegressor, S = StandardScaler> {
    config: ForecastConfig,
    store: ModelStore<R, S>,
    locks: UserLocks,
}

impl<R: Regressor, S: FeatureScaler> ForecastService<R, S> {
    pub fn new(config: ForecastConfig) -> Self {
        let store = ModelStore::new(config.data_dir.clone());
        Self {
            config,
            store,
            locks: UserLocks::default(),
        }
    }

    pub fn config(&self) -> &ForecastConfig {
        &self.config
    }

    pub fn store(&self) -> &ModelStore<R, S> {
        &self.store
    }

    /// Append records to a user's log (deduplicated by id)
    pub fn add_transactions(
        &self,
        uid: &str,
        records: &[TransactionRecord],
    ) -> Result<AppendSummary> {
        validate_user_id(uid)?;
        let summary = self
            .locks
            .with_lock(uid, || self.store.append_transactions(uid, records))?;
        info!(
            user = uid,
            added = summary.added,
            total = summary.transaction_count,
            "Ingested transactions"
        );
        Ok(summary)
    }

    /// Train the user's model if the retraining policy says it is due
    pub fn maybe_retrain(&self, uid: &str) -> RetrainOutcome {
        self.retrain(uid, false)
    }

    /// Train the user's model, bypassing the policy when `force` is set
    pub fn retrain(&self, uid: &str, force: bool) -> RetrainOutcome {
        if let Err(e) = validate_user_id(uid) {
            return RetrainOutcome::Failed(e);
        }
        self.locks.with_lock(uid, || {
            if !force {
                match self.store.load_metadata(uid) {
                    Ok(metadata) if !self.config.retrain.should_retrain(&metadata, Utc::now()) => {
                        debug!(
                            user = uid,
                            transactions = metadata.transaction_count,
                            "Retraining not due"
                        );
                        return RetrainOutcome::Skipped;
                    }
                    Ok(_) => {}
                    Err(e) => return RetrainOutcome::Failed(e),
                }
            }

            train_outcome(&self.store, uid, &self.config.training)
        })
    }

    /// Append records, then retrain if due
    pub fn ingest(&self, uid: &str, records: &[TransactionRecord]) -> Result<IngestOutcome> {
        let appended = self.add_transactions(uid, records)?;
        let retrain = self.maybe_retrain(uid);
        Ok(IngestOutcome { appended, retrain })
    }

    /// Personalized prediction. Always yields a value.
    pub fn predict(&self, uid: &str, income: f64, expenses: f64, month: u32, savings: f64) -> f64 {
        self.predict_detailed(uid, &ExpenseObservation::new(income, expenses, month, savings))
            .value
    }

    pub fn predict_detailed(&self, uid: &str, obs: &ExpenseObservation) -> Prediction {
        PersonalizedPredictor::new(&self.store).predict_detailed(uid, obs)
    }

    /// Base model prediction. Failures are returned to the caller.
    pub fn predict_base(&self, income: f64, expenses: f64, month: u32, savings: f64) -> Result<f64> {
        BasePredictor::new(&self.store)
            .predict(&ExpenseObservation::new(income, expenses, month, savings))
    }

    /// Read-only snapshot; unknown users get default metadata, nothing is written
    pub fn status(&self, uid: &str) -> Result<UserStatus> {
        let initialized = self.store.is_initialized(uid)?;
        let metadata = self.store.peek_metadata(uid)?;
        let retrain_due = self.config.retrain.should_retrain(&metadata, Utc::now());
        Ok(UserStatus {
            user_id: uid.to_string(),
            initialized,
            metadata,
            retrain_due,
        })
    }
}
