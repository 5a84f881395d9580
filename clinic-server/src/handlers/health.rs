use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use tracing::info;

use crate::AppState;

pub async fn root_handler() -> &'static str {
    "Clinic API is running"
}

pub async fn ping_handler() -> Json<Value> {
    info!("Ping endpoint called");
    Json(json!({
        "status": "ok",
        "message": "Clinic API is running",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Database reachability, pool usage and the consistency counters.
pub async fn health_handler(State(state): State<AppState>) -> (StatusCode, Json<Value>) {
    let mut health_status = json!({
        "status": "healthy",
        "timestamp": chrono::Utc::now().to_rfc3339(),
        "version": env!("CARGO_PKG_VERSION"),
        "checks": {}
    });

    let mut is_unhealthy = false;

    match &state.postgres {
        Some(db) => match db.ping().await {
            Ok(()) => {
                health_status["checks"]["database"] = json!({
                    "status": "healthy",
                    "pool": db.pool_stats(),
                });
            }
            Err(e) => {
                health_status["checks"]["database"] = json!({
                    "status": "unhealthy",
                    "error": e.to_string()
                });
                is_unhealthy = true;
            }
        },
        None => {
            health_status["checks"]["database"] = json!({ "status": "in_memory" });
        }
    }

    health_status["checks"]["consistency"] =
        json!(state.coordinator().metrics().snapshot());

    if is_unhealthy {
        health_status["status"] = json!("unhealthy");
        (StatusCode::SERVICE_UNAVAILABLE, Json(health_status))
    } else {
        (StatusCode::OK, Json(health_status))
    }
}
