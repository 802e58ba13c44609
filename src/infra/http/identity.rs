//! Caller identity taken from the `User-Id` request header.
//!
//! Writes reject a bad identity with 401; reads that are scoped to the caller
//! reject it with 400.

use axum::{
    extract::FromRequestParts,
    http::{HeaderMap, request::Parts},
};

use crate::application::error::HttpError;
use crate::domain::error::DomainError;
use crate::domain::users::validate_user_id;

pub const USER_ID_HEADER: &str = "user-id";

const SOURCE: &str = "infra::http::identity";

fn header_user_id(headers: &HeaderMap) -> Result<String, DomainError> {
    let raw = headers
        .get(USER_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default();
    validate_user_id(raw)?;
    Ok(raw.to_string())
}

/// Caller performing a write.
#[derive(Debug, Clone)]
pub struct Author(pub String);

impl<S> FromRequestParts<S> for Author
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_user_id(&parts.headers)
            .map(Author)
            .map_err(|err| HttpError::unauthorized(SOURCE, err.to_string()))
    }
}

/// Caller reading data scoped to themselves.
#[derive(Debug, Clone)]
pub struct Viewer(pub String);

impl<S> FromRequestParts<S> for Viewer
where
    S: Send + Sync,
{
    type Rejection = HttpError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        header_user_id(&parts.headers)
            .map(Viewer)
            .map_err(|err| HttpError::bad_request(SOURCE, "Invalid user id", err.to_string()))
    }
}
