//! Health check endpoint
//!
//! `GET /health` answers 200 with `{"status": "ok", "timestamp": ...}` while
//! the database responds, and 500 otherwise. Load balancers and container
//! checks can poll it without a token.

use axum::{extract::State, Json};
use serde_json::{json, Value};

use crate::api::middleware::{ApiError, AppState};

/// GET /health
pub async fn health(State(state): State<AppState>) -> Result<Json<Value>, ApiError> {
    state
        .pool
        .ping()
        .await
        .map_err(|e| ApiError::internal_error(format!("{:#}", e)))?;

    Ok(Json(json!({
        "status": "ok",
        "timestamp": chrono::Utc::now().to_rfc3339(),
    })))
}
