use axum::extract::FromRequestParts;
use http::StatusCode;
use http::request::Parts;

use crate::api::server::RouteError;
use crate::db::models::streak::UserId;

/// Set by the upstream authenticator once the caller's access token has been validated.
pub const USER_ID_HEADER: &str = "x-user-id";

/// The authenticated caller.
#[derive(Debug, Clone, Copy)]
pub struct AuthedUser(pub UserId);

impl<S: Send + Sync> FromRequestParts<S> for AuthedUser {
    type Rejection = RouteError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let unauthorized = || RouteError::AuthError(StatusCode::UNAUTHORIZED);

        let raw = parts
            .headers
            .get(USER_ID_HEADER)
            .ok_or_else(unauthorized)?
            .to_str()
            .map_err(|_| unauthorized())?;

        raw.parse::<UserId>()
            .map(AuthedUser)
            .map_err(|_| unauthorized())
    }
}
