//! Test fixtures shared across crates (enabled by the `test-utils` feature)

use serde::{Deserialize, Serialize};
use tempfile::TempDir;

use crate::error::{Error, Result};
use crate::ml::{FeatureRow, Regressor, StandardScaler};
use crate::models::{TransactionRecord, TransactionType};
use crate::store::ModelStore;

/// Regressor that predicts a single constant.
///
/// Training moves the constant to the mean of the training targets, which
/// keeps training outcomes easy to assert on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConstantRegressor {
    pub value: f64,
}

impl ConstantRegressor {
    pub fn new(value: f64) -> Self {
        Self { value }
    }
}

impl Regressor for ConstantRegressor {
    fn predict(&self, _row: &FeatureRow) -> Result<f64> {
        Ok(self.value)
    }

    fn train_epoch(&mut self, _x: &[FeatureRow], y: &[f64], _batch_size: usize) -> Result<f64> {
        if y.is_empty() {
            return Err(Error::Training("No targets".to_string()));
        }
        self.value = y.iter().sum::<f64>() / y.len() as f64;
        let mse = y.iter().map(|t| (t - self.value).powi(2)).sum::<f64>() / y.len() as f64;
        Ok(mse)
    }
}

pub type TestStore = ModelStore<ConstantRegressor, StandardScaler>;

/// Empty store in a fresh temp dir. Keep the `TempDir` alive for the test.
pub fn fixture_store() -> (TempDir, TestStore) {
    let dir = TempDir::new().expect("create temp dir");
    let store = ModelStore::new(dir.path());
    (dir, store)
}

/// Install a base model that always predicts `value` behind an identity scaler
pub fn install_constant_base(store: &TestStore, value: f64) {
    store
        .save_base_artifacts(&ConstantRegressor::new(value), &StandardScaler::identity())
        .expect("save base artifacts");
}

/// Consecutive months starting January 2023, each with one income record
/// and `expenses_per_month` expense records. Expense totals grow month over
/// month so training targets differ.
pub fn monthly_transactions(months: usize, expenses_per_month: usize) -> Vec<TransactionRecord> {
    let mut records = Vec::with_capacity(months * (expenses_per_month + 1));

    for i in 0..months {
        let year = 2023 + (i / 12) as i32;
        let month = (i % 12) as u32 + 1;

        records.push(
            TransactionRecord::new(
                TransactionType::Income,
                5000.0,
                &format!("{:04}-{:02}-01", year, month),
            )
            .with_id(&format!("inc-{}", i)),
        );

        for j in 0..expenses_per_month {
            records.push(
                TransactionRecord::new(
                    TransactionType::Expense,
                    100.0 + 10.0 * i as f64,
                    &format!("{:04}-{:02}-{:02}", year, month, (j % 27) + 2),
                )
                .with_id(&format!("exp-{}-{}", i, j)),
            );
        }
    }

    records
}
