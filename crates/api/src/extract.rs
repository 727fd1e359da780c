//! Authenticated actor extraction
//!
//! Authentication happens upstream; the gateway forwards the caller as
//! `X-Actor-Id` and `X-Actor-Role`.

use axum::{async_trait, extract::FromRequestParts, http::request::Parts};
use gryork_core::{Actor, Role};

use crate::error::ApiError;

pub const ACTOR_ID_HEADER: &str = "x-actor-id";
pub const ACTOR_ROLE_HEADER: &str = "x-actor-role";

/// The caller of the current request
#[derive(Debug, Clone)]
pub struct CurrentActor(pub Actor);

#[async_trait]
impl<S> FromRequestParts<S> for CurrentActor
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let header = |name: &str| {
            parts
                .headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };

        let user_id = header(ACTOR_ID_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("missing X-Actor-Id header".to_string()))?;
        let role = header(ACTOR_ROLE_HEADER)
            .ok_or_else(|| ApiError::Unauthorized("missing X-Actor-Role header".to_string()))?;
        let role: Role = role
            .to_lowercase()
            .parse()
            .map_err(|_| ApiError::Unauthorized(format!("unknown role '{}'", role)))?;

        Ok(CurrentActor(Actor::new(user_id, role)))
    }
}
