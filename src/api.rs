//! REST API server for the research orchestrator
//!
//! Exposes the coordinator via HTTP endpoints; session persistence lives
//! behind this surface and is not this crate's concern.

use axum::{extract::State, http::StatusCode, routing::get, routing::post, Json, Router};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tower_http::cors::CorsLayer;
use tracing::{error, info};

use crate::coordinator::Coordinator;
use crate::router::extract_stock_code;

/// =============================
/// Request Models
/// =============================

#[derive(Debug, Deserialize)]
pub struct ResearchRequest {
    pub message: String,
    /// Explicit stock code from the caller's UI; takes precedence over
    /// anything extracted from the message.
    pub stock_code: Option<String>,
    pub user_id: Option<String>,
}

/// =============================
/// Response Wrapper
/// =============================

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse {
    pub success: bool,
    pub data: Option<serde_json::Value>,
    pub error: Option<serde_json::Value>,
    pub request_id: String,
    pub timestamp: String,
}

impl ApiResponse {
    pub fn success<T: Serialize>(request_id: uuid::Uuid, data: T) -> Self {
        Self {
            success: true,
            data: serde_json::to_value(data).ok(),
            error: None,
            request_id: request_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }

    pub fn error<T: Serialize>(request_id: uuid::Uuid, payload: T) -> Self {
        Self {
            success: false,
            data: None,
            error: serde_json::to_value(payload).ok(),
            request_id: request_id.to_string(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// =============================
/// API State
/// =============================

#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<Coordinator>,
}

/// Derive a stable request id from a caller-supplied identity, so repeated
/// calls from the same user correlate in logs.
fn stable_uuid_from_string(input: &str) -> uuid::Uuid {
    use sha2::{Digest, Sha256};

    let hash = Sha256::digest(input.as_bytes());
    let mut bytes = [0u8; 16];
    bytes.copy_from_slice(&hash[..16]);

    // Set UUID version (4) and variant (RFC4122) bits.
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;

    uuid::Uuid::from_bytes(bytes)
}

/// =============================
/// Handlers
/// =============================

async fn research(
    State(state): State<ApiState>,
    Json(request): Json<ResearchRequest>,
) -> (StatusCode, Json<ApiResponse>) {
    let request_id = request
        .user_id
        .as_deref()
        .map(stable_uuid_from_string)
        .unwrap_or_else(uuid::Uuid::new_v4);

    // An explicit stock code from the caller is prepended so routing and
    // parameter building both see it.
    let message = match &request.stock_code {
        Some(code) if extract_stock_code(&request.message).is_none() => {
            format!("stock code: {code}\n{}", request.message)
        }
        _ => request.message.clone(),
    };

    info!(%request_id, "Research request received");

    match state.coordinator.run(&message).await {
        Ok(report) => (
            StatusCode::OK,
            Json(ApiResponse::success(request_id, report)),
        ),
        Err(e) => {
            error!(%request_id, error = %e, "Research request failed");
            let payload = Coordinator::error_payload(&e);
            (
                StatusCode::BAD_GATEWAY,
                Json(ApiResponse::error(request_id, payload)),
            )
        }
    }
}

async fn health() -> &'static str {
    "ok"
}

pub fn build_router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/research", post(research))
        .route("/api/v1/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state)
}
