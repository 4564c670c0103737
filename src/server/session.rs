//! Caller identity as forwarded by the authentication gateway.

use axum::{
    extract::FromRequestParts,
    http::{request::Parts, StatusCode},
    response::IntoResponse,
};
use tracing::debug;

use super::state::ServerState;

pub const HEADER_USER_ID_KEY: &str = "X-User-Id";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Session {
    pub user_id: i64,
}

#[derive(Debug)]
pub enum SessionExtractionError {
    MissingUserId,
    InvalidUserId,
}

impl IntoResponse for SessionExtractionError {
    fn into_response(self) -> axum::response::Response {
        match self {
            SessionExtractionError::MissingUserId => {
                (StatusCode::UNAUTHORIZED, "Missing user id").into_response()
            }
            SessionExtractionError::InvalidUserId => {
                (StatusCode::UNAUTHORIZED, "Invalid user id").into_response()
            }
        }
    }
}

fn extract_session_from_request_parts(parts: &Parts) -> Result<Session, SessionExtractionError> {
    let raw = parts
        .headers
        .get(HEADER_USER_ID_KEY)
        .ok_or(SessionExtractionError::MissingUserId)?;

    let user_id = raw
        .to_str()
        .ok()
        .and_then(|s| s.trim().parse::<i64>().ok())
        .ok_or_else(|| {
            debug!("Rejecting non-numeric {} header: {:?}", HEADER_USER_ID_KEY, raw);
            SessionExtractionError::InvalidUserId
        })?;

    Ok(Session { user_id })
}

impl FromRequestParts<ServerState> for Session {
    type Rejection = SessionExtractionError;

    async fn from_request_parts(
        parts: &mut Parts,
        _ctx: &ServerState,
    ) -> Result<Self, Self::Rejection> {
        extract_session_from_request_parts(parts)
    }
}
