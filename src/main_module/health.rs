//! Liveness and readiness checks

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use diesel::RunQueryDsl;
use std::sync::Arc;

use crate::core::shared::state::AppState;

/// Readiness: answers 503 while the database is unreachable.
pub async fn health_check(State(state): State<Arc<AppState>>) -> (StatusCode, Json<serde_json::Value>) {
    let db_ok = state
        .run(|conn| {
            diesel::sql_query("SELECT 1").execute(conn)?;
            Ok(())
        })
        .await
        .is_ok();

    let status = if db_ok { "healthy" } else { "degraded" };
    let code = if db_ok {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (
        code,
        Json(serde_json::json!({
            "status": status,
            "service": "stoneserver",
            "version": env!("CARGO_PKG_VERSION"),
            "database": db_ok,
            "integrations": {
                "drive": state.drive.is_some(),
                "email": state.mailer.is_some(),
                "qbo": state.qbo.is_some(),
                "stripe": state.stripe.is_some(),
            }
        })),
    )
}

pub async fn health_check_simple() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::OK,
        Json(serde_json::json!({
            "status": "ok",
            "service": "stoneserver",
            "version": env!("CARGO_PKG_VERSION")
        })),
    )
}
