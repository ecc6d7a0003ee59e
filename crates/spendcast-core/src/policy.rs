//! Retraining policy and ensemble blend weights

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::models::{BlendWeights, ModelMetadata};

/// Thresholds deciding when a user's model is retrained
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RetrainPolicy {
    /// Minimum logged transactions before any training happens
    pub min_transactions: usize,
    /// Minimum whole days between training runs
    pub min_days: i64,
}

impl Default for RetrainPolicy {
    fn default() -> Self {
        Self {
            min_transactions: 20,
            min_days: 7,
        }
    }
}

impl RetrainPolicy {
    pub fn should_retrain(&self, metadata: &ModelMetadata, now: DateTime<Utc>) -> bool {
        if metadata.transaction_count < self.min_transactions {
            return false;
        }

        match metadata.last_trained_at {
            None => true,
            Some(last) => (now - last).num_days() >= self.min_days,
        }
    }
}

/// Decide whether accumulated data warrants retraining
pub fn should_retrain(
    metadata: &ModelMetadata,
    min_transactions: usize,
    min_days: i64,
    now: DateTime<Utc>,
) -> bool {
    RetrainPolicy {
        min_transactions,
        min_days,
    }
    .should_retrain(metadata, now)
}

/// Blend weights earned by a transaction history.
///
/// Returns `None` at or below 20 transactions, where the current weights
/// stay unchanged.
pub fn compute_weights(transaction_count: usize) -> Option<BlendWeights> {
    match transaction_count {
        c if c > 100 => Some(BlendWeights::new(0.3, 0.7)),
        c if c > 50 => Some(BlendWeights::new(0.5, 0.5)),
        c if c > 20 => Some(BlendWeights::new(0.7, 0.3)),
        _ => None,
    }
}

/// Weights after training: the table value, or `current` when below threshold
pub fn weights_after_training(transaction_count: usize, current: BlendWeights) -> BlendWeights {
    compute_weights(transaction_count).unwrap_or(current)
}
