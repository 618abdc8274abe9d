//! Drip sequence endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;

use crate::api::error::ApiError;
use crate::api::types::{checked_as_of, parse_protocol_id, ApiContext, AsOfQuery};
use crate::drip::{StartedSequence, TickReport};

/// `POST /api/protocols/:id/drip/start`: send step 0 now and re-anchor.
pub async fn start(
    State(ctx): State<ApiContext>,
    Path(protocol_id): Path<String>,
) -> Result<Json<StartedSequence>, ApiError> {
    let id = parse_protocol_id(&protocol_id)?;
    let started = ctx.sequencer.start_sequence(&id).await?;
    Ok(Json(started))
}

/// `POST /api/drip/tick?as_of=`: run one tick (external cron trigger).
pub async fn tick(
    State(ctx): State<ApiContext>,
    Query(query): Query<AsOfQuery>,
) -> Result<Json<TickReport>, ApiError> {
    let as_of = checked_as_of(query.as_of)?;
    let report = ctx.sequencer.run_tick(as_of).await?;
    Ok(Json(report))
}
