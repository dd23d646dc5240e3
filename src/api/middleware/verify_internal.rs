use std::sync::Arc;

use axum::extract::{Request, State};
use axum::middleware::Next;
use axum::response::Response;
use http::StatusCode;
use http::header::AUTHORIZATION;

use crate::api::server::AppState;
use crate::util::constant_time_cmp;

/// Guards operator-only routes (e.g. the manual streak reset) behind the shared internal
/// token.
pub async fn verify_internal_ident<S>(
    State(state): State<Arc<AppState<S>>>,
    req: Request,
    next: Next,
) -> Result<Response, StatusCode>
where
    S: Send + Sync + 'static,
{
    let authorized_header = req
        .headers()
        .get(AUTHORIZATION)
        .ok_or(StatusCode::UNAUTHORIZED)?
        .to_str()
        .map_err(|_| StatusCode::BAD_REQUEST)?;

    let presented = authorized_header
        .strip_prefix("Bearer ")
        .unwrap_or(authorized_header);

    if !constant_time_cmp(presented, &state.internal_token) {
        Err(StatusCode::UNAUTHORIZED)
    } else {
        Ok(next.run(req).await)
    }
}
