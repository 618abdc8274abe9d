//! Shared-secret guard for the externally scheduled tick.
//!
//! When `PROTOCARE_CRON_SECRET` is set, callers must send it in the
//! `x-cron-secret` header. With no secret configured the route is open,
//! which is the expected setup when the API binds to localhost only.

use axum::http::Request;
use axum::middleware::Next;
use axum::response::{IntoResponse, Response};
use subtle::ConstantTimeEq;

use crate::api::error::ApiError;
use crate::api::types::ApiContext;

pub const CRON_SECRET_HEADER: &str = "x-cron-secret";

/// Accesses `ApiContext` from request extensions.
pub async fn require_cron_secret(req: Request<axum::body::Body>, next: Next) -> Response {
    let Some(ctx) = req.extensions().get::<ApiContext>().cloned() else {
        return ApiError::Internal("missing API context".into()).into_response();
    };

    if let Some(expected) = ctx.cron_secret.as_deref() {
        let provided = req
            .headers()
            .get(CRON_SECRET_HEADER)
            .and_then(|v| v.to_str().ok())
            .unwrap_or_default();
        // Constant-time comparison; a length mismatch compares unequal.
        let matches: bool = provided.as_bytes().ct_eq(expected.as_bytes()).into();
        if !matches {
            tracing::warn!(path = %req.uri().path(), "Rejected tick trigger: bad cron secret");
            return ApiError::Unauthorized.into_response();
        }
    }

    next.run(req).await
}
