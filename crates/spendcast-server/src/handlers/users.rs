//! Per-user model API handlers
//!
//! Ingestion, retraining and model status for a single user.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};

use spendcast_core::{RetrainOutcome, TrainingReport, TransactionRecord, UserStatus};

use crate::{run_blocking, AppError, AppState};

/// Retraining outcome as reported to clients
#[derive(Debug, Serialize)]
pub struct RetrainResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report: Option<TrainingReport>,
}

impl From<RetrainOutcome> for RetrainResponse {
    fn from(outcome: RetrainOutcome) -> Self {
        let status = outcome.status();
        match outcome {
            RetrainOutcome::Trained(report) => Self {
                status,
                reason: None,
                report: Some(report),
            },
            RetrainOutcome::Skipped => Self {
                status,
                reason: None,
                report: None,
            },
            // Only not-ready reasons are safe to echo back verbatim
            RetrainOutcome::Failed(e) => Self {
                status,
                reason: Some(if e.is_not_ready() {
                    e.to_string()
                } else {
                    e.kind().to_string()
                }),
                report: None,
            },
        }
    }
}

#[derive(Debug, Serialize)]
pub struct AddTransactionsResponse {
    pub added: usize,
    pub duplicates: usize,
    pub transaction_count: usize,
    pub retrain: RetrainResponse,
}

/// POST /api/users/:uid/transactions
///
/// Appends the records, then retrains if the policy says it is due.
pub async fn add_transactions(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
    Json(records): Json<Vec<TransactionRecord>>,
) -> Result<Json<AddTransactionsResponse>, AppError> {
    let outcome = run_blocking(state, move |service| service.ingest(&uid, &records)).await??;

    Ok(Json(AddTransactionsResponse {
        added: outcome.appended.added,
        duplicates: outcome.appended.duplicates,
        transaction_count: outcome.appended.transaction_count,
        retrain: outcome.retrain.into(),
    }))
}

#[derive(Debug, Deserialize)]
pub struct RetrainQuery {
    #[serde(default)]
    pub force: bool,
}

/// POST /api/users/:uid/retrain
pub async fn retrain(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
    Query(query): Query<RetrainQuery>,
) -> Result<Json<RetrainResponse>, AppError> {
    let outcome = run_blocking(state, move |service| service.retrain(&uid, query.force)).await?;

    match outcome {
        RetrainOutcome::Failed(e) => Err(e.into()),
        outcome => Ok(Json(outcome.into())),
    }
}

/// GET /api/users/:uid/model
pub async fn get_model(
    State(state): State<Arc<AppState>>,
    Path(uid): Path<String>,
) -> Result<Json<UserStatus>, AppError> {
    let status = run_blocking(state, move |service| service.status(&uid)).await??;
    Ok(Json(status))
}
