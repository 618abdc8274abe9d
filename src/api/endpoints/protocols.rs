//! Protocol tracking endpoints.
//!
//! - `GET /api/protocols/:id/status`: visit classification and countdown
//! - `GET /api/protocols/:id/weekly-progress`: twice-weekly quota (or null)
//! - `POST /api/protocols/:id/visits`: log an attended visit
//! - `POST /api/protocols/:id/missed`: log a missed visit
//! - `POST /api/protocols/:id/extend`: push the end date out

use axum::extract::{Path, Query, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{parse_protocol_id, ApiContext, AsOfQuery};
use crate::models::Protocol;
use crate::tracking::{self, ExtendRequest, MissedVisitRequest, Progress, StatusResult, VisitRequest};

/// `GET /api/protocols/:id/status`
pub async fn status(
    State(ctx): State<ApiContext>,
    Path(protocol_id): Path<String>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<StatusResult>, ApiError> {
    let id = parse_protocol_id(&protocol_id)?;
    let clock = ctx.clock_as_of(query.as_of)?;
    let result = tracking::protocol_status(ctx.store.as_ref(), &id, clock.as_ref())?;
    Ok(Json(result))
}

/// `GET /api/protocols/:id/weekly-progress`
pub async fn weekly_progress(
    State(ctx): State<ApiContext>,
    Path(protocol_id): Path<String>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<Option<Progress>>, ApiError> {
    let id = parse_protocol_id(&protocol_id)?;
    let clock = ctx.clock_as_of(query.as_of)?;
    let progress = tracking::weekly_progress_for(ctx.store.as_ref(), &id, clock.as_ref())?;
    Ok(Json(progress))
}

/// `POST /api/protocols/:id/visits`
pub async fn log_visit(
    State(ctx): State<ApiContext>,
    Path(protocol_id): Path<String>,
    Json(request): Json<VisitRequest>,
) -> Result<Json<Protocol>, ApiError> {
    let id = parse_protocol_id(&protocol_id)?;
    let protocol = tracking::log_visit(ctx.store.as_ref(), &id, &request, ctx.clock.as_ref())?;
    Ok(Json(protocol))
}

/// `POST /api/protocols/:id/missed`
pub async fn log_missed(
    State(ctx): State<ApiContext>,
    Path(protocol_id): Path<String>,
    Json(request): Json<MissedVisitRequest>,
) -> Result<Json<Protocol>, ApiError> {
    let id = parse_protocol_id(&protocol_id)?;
    let protocol = tracking::log_missed(ctx.store.as_ref(), &id, &request, ctx.clock.as_ref())?;
    Ok(Json(protocol))
}

/// `POST /api/protocols/:id/extend`
pub async fn extend(
    State(ctx): State<ApiContext>,
    Path(protocol_id): Path<String>,
    Json(request): Json<ExtendRequest>,
) -> Result<Json<Protocol>, ApiError> {
    let id = parse_protocol_id(&protocol_id)?;
    let protocol = tracking::extend_protocol(ctx.store.as_ref(), &id, &request, ctx.clock.as_ref())?;
    Ok(Json(protocol))
}
