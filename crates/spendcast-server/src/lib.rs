//! Spendcast Web Server
//!
//! Axum-based REST API over the forecasting core:
//! - Personalized and base-model predictions
//! - Transaction ingestion with policy-driven retraining
//! - Per-user model status
//!
//! Model work is synchronous file and CPU work, so every handler runs it on
//! the blocking thread pool.

use std::sync::Arc;

use axum::{
    extract::State,
    http::{header, HeaderValue, Method, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::{cors::CorsLayer, set_header::SetResponseHeaderLayer, trace::TraceLayer};
use tracing::{error, info, warn};

use spendcast_core::{Error as CoreError, ForecastService};

mod handlers;

/// Server configuration
#[derive(Debug, Clone, Default)]
pub struct ServerConfig {
    /// Allowed CORS origins; empty means same-origin only
    pub allowed_origins: Vec<String>,
}

/// Shared application state
pub struct AppState {
    pub service: ForecastService,
}

/// Run blocking model work off the async runtime
pub(crate) async fn run_blocking<T, F>(state: Arc<AppState>, work: F) -> Result<T, AppError>
where
    F: FnOnce(&ForecastService) -> T + Send + 'static,
    T: Send + 'static,
{
    Ok(tokio::task::spawn_blocking(move || work(&state.service)).await?)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    base_model: bool,
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok",
        base_model: state.service.store().has_base_artifacts(),
    })
}

/// Create the application router
pub fn create_router(service: ForecastService, config: ServerConfig) -> Router {
    let state = Arc::new(AppState { service });

    let api_routes = Router::new()
        // Predictions
        .route("/predict", post(handlers::predict))
        .route("/predict/base", post(handlers::predict_base))
        // Per-user models
        .route("/users/:uid/transactions", post(handlers::add_transactions))
        .route("/users/:uid/retrain", post(handlers::retrain))
        .route("/users/:uid/model", get(handlers::get_model));

    let methods = [Method::GET, Method::POST, Method::OPTIONS];
    let cors = if config.allowed_origins.is_empty() {
        CorsLayer::new()
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE])
    } else {
        let origins: Vec<HeaderValue> = config
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers([header::CONTENT_TYPE])
    };

    Router::new()
        .route("/health", get(health))
        .nest("/api", api_routes)
        .with_state(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(SetResponseHeaderLayer::overriding(
            header::X_CONTENT_TYPE_OPTIONS,
            HeaderValue::from_static("nosniff"),
        ))
}

/// Start the server
pub async fn serve(
    service: ForecastService,
    host: &str,
    port: u16,
    config: ServerConfig,
) -> anyhow::Result<()> {
    if !service.store().has_base_artifacts() {
        warn!(
            "Base model not found in {}; predictions will use the heuristic fallback",
            service.store().base_dir().display()
        );
    }

    let app = create_router(service, config);
    let addr = format!("{}:{}", host, port);

    info!("Starting server at http://{}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

// ============================================================================
// Error Handling
// ============================================================================

/// Application error type with proper HTTP status codes
#[derive(Debug)]
pub struct AppError {
    status: StatusCode,
    message: String,
    internal: Option<anyhow::Error>,
}

impl AppError {
    pub fn bad_request(msg: &str) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn conflict(msg: &str) -> Self {
        Self {
            status: StatusCode::CONFLICT,
            message: msg.to_string(),
            internal: None,
        }
    }

    pub fn unavailable(msg: &str, err: CoreError) -> Self {
        Self {
            status: StatusCode::SERVICE_UNAVAILABLE,
            message: msg.to_string(),
            internal: Some(err.into()),
        }
    }

    pub fn internal(err: anyhow::Error) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            // Return generic message to client
            message: "An internal error occurred".to_string(),
            internal: Some(err),
        }
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        // Log the full internal error if present
        if let Some(err) = &self.internal {
            error!(error = %err, "Internal error");
        }

        let body = Json(serde_json::json!({
            "error": self.message
        }));

        (self.status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidInput(msg) => Self::bad_request(&msg),
            e if e.is_not_ready() => Self::conflict(&e.to_string()),
            e @ CoreError::TrainingTimeout { .. } => Self::unavailable("Training timed out", e),
            e if e.is_storage() => Self::unavailable("Model storage unavailable", e),
            e => Self::internal(e.into()),
        }
    }
}

impl From<tokio::task::JoinError> for AppError {
    fn from(err: tokio::task::JoinError) -> Self {
        Self::internal(err.into())
    }
}
