//! Health check endpoint.

use axum::extract::State;
use axum::Json;
use serde::Serialize;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub today: chrono::NaiveDate,
    pub version: &'static str,
}

/// `GET /api/health`: liveness plus a store round trip.
pub async fn check(State(ctx): State<ApiContext>) -> Result<Json<HealthResponse>, ApiError> {
    ctx.store.ping()?;

    Ok(Json(HealthResponse {
        status: "ok",
        today: ctx.clock.today(),
        version: crate::config::APP_VERSION,
    }))
}
