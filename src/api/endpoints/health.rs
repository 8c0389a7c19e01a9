//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub database: bool,
    pub ai_enabled: bool,
    pub uploads_enabled: bool,
}

/// `GET /api/health`: liveness plus a database round-trip.
pub async fn check(State(ctx): State<ApiContext>) -> Result<Json<HealthResponse>, ApiError> {
    let database = super::with_db(&ctx, |_, conn| {
        Ok(conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0)).is_ok())
    })
    .await
    .unwrap_or(false);

    Ok(Json(HealthResponse {
        status: if database { "ok" } else { "degraded" },
        version: crate::config::APP_VERSION,
        database,
        ai_enabled: ctx.core.llm().is_some(),
        uploads_enabled: ctx.core.media_store().is_some(),
    }))
}
