//! Prediction API handlers

use std::sync::Arc;

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use spendcast_core::{ExpenseObservation, PredictionBounds, PredictionSource};

use crate::{run_blocking, AppError, AppState};

/// Request body for a personalized prediction
#[derive(Debug, Deserialize)]
pub struct PredictRequest {
    pub user_id: String,
    pub income: f64,
    pub expenses: f64,
    pub month: u32,
    #[serde(default)]
    pub savings: f64,
}

/// Request body for a base-model prediction
#[derive(Debug, Deserialize)]
pub struct BasePredictRequest {
    pub income: f64,
    pub expenses: f64,
    pub month: u32,
    #[serde(default)]
    pub savings: f64,
}

#[derive(Debug, Serialize)]
pub struct PredictResponse {
    pub prediction: f64,
    pub source: PredictionSource,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bounds: Option<PredictionBounds>,
}

#[derive(Debug, Serialize)]
pub struct BasePredictResponse {
    pub prediction: f64,
}

/// POST /api/predict
///
/// Always answers with a number; degraded answers are flagged by `source`.
pub async fn predict(
    State(state): State<Arc<AppState>>,
    Json(req): Json<PredictRequest>,
) -> Result<Json<PredictResponse>, AppError> {
    let obs = ExpenseObservation::new(req.income, req.expenses, req.month, req.savings);
    let user_id = req.user_id;

    let prediction = run_blocking(state, move |service| {
        service.predict_detailed(&user_id, &obs)
    })
    .await?;

    Ok(Json(PredictResponse {
        prediction: prediction.value,
        source: prediction.source,
        bounds: prediction.bounds,
    }))
}

/// POST /api/predict/base
pub async fn predict_base(
    State(state): State<Arc<AppState>>,
    Json(req): Json<BasePredictRequest>,
) -> Result<Json<BasePredictResponse>, AppError> {
    let prediction = run_blocking(state, move |service| {
        service.predict_base(req.income, req.expenses, req.month, req.savings)
    })
    .await??;

    Ok(Json(BasePredictResponse { prediction }))
}
