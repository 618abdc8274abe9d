//! API router.
//!
//! Returns a composable `Router` with every route nested under `/api/`.
//! The tick trigger sits behind the cron-secret guard; every response gets
//! `Cache-Control: no-store` since all payloads are patient data or
//! point-in-time results.

use axum::http::{header, HeaderValue};
use axum::routing::{get, post};
use axum::Router;
use tower_http::set_header::SetResponseHeaderLayer;

use crate::api::endpoints;
use crate::api::middleware;
use crate::api::types::ApiContext;

/// Build the API router.
///
/// Middleware uses `Extension<ApiContext>` (injected as the outermost layer
/// of the guarded routes). Handlers use `State<ApiContext>`.
///
/// NOTE: Path params use `:param` syntax (matchit 0.7 / axum 0.7).
pub fn api_router(ctx: ApiContext) -> Router {
    let routes = Router::new()
        .route("/health", get(endpoints::health::check))
        .route("/protocols/:id/status", get(endpoints::protocols::status))
        .route(
            "/protocols/:id/weekly-progress",
            get(endpoints::protocols::weekly_progress),
        )
        .route("/protocols/:id/visits", post(endpoints::protocols::log_visit))
        .route("/protocols/:id/missed", post(endpoints::protocols::log_missed))
        .route("/protocols/:id/extend", post(endpoints::protocols::extend))
        .route("/protocols/:id/drip/start", post(endpoints::drip::start))
        .with_state(ctx.clone());

    let cron = Router::new()
        .route("/drip/tick", post(endpoints::drip::tick))
        .with_state(ctx.clone())
        .layer(axum::middleware::from_fn(middleware::cron::require_cron_secret))
        .layer(axum::Extension(ctx));

    Router::new()
        .nest("/api", routes.merge(cron))
        .layer(axum::middleware::from_fn(middleware::audit::log_access))
        .layer(SetResponseHeaderLayer::overriding(
            header::CACHE_CONTROL,
            HeaderValue::from_static("no-store"),
        ))
}
