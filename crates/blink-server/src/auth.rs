use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use constant_time_eq::constant_time_eq;
use tracing::debug;

use crate::{error::BlinkError, AppState};

/// Guards the admin routes with `Authorization: Bearer <admin secret>`.
/// Without a configured secret the admin surface is closed to everyone.
pub async fn require_admin_secret(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_owned();

    let Some(expected) = state.admin_secret.as_deref() else {
        debug!(%path, "admin request rejected: no secret configured");
        return BlinkError::Unauthorized.into_response();
    };

    let presented = request
        .headers()
        .get(http::header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "));

    match presented {
        Some(t) if constant_time_eq(t.as_bytes(), expected.as_bytes()) => next.run(request).await,
        Some(_) => {
            debug!(%path, "admin request rejected: secret mismatch");
            BlinkError::Unauthorized.into_response()
        }
        None => {
            debug!(%path, "admin request rejected: missing bearer token");
            BlinkError::Unauthorized.into_response()
        }
    }
}
