use std::error::Error as StdError;

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::{
    application::{pagination::PaginationError, repos::RepoError},
    domain::error::DomainError,
    infra::error::InfraError,
};

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Failures of the post, subscription, and feed services.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("post `{0}` not found")]
    NotFound(String),
    #[error("user `{user_id}` may not modify post `{post_id}`")]
    Forbidden { user_id: String, post_id: String },
    #[error("invalid page token: {0}")]
    InvalidToken(String),
    #[error("invalid page size {0}")]
    InvalidSize(i64),
    #[error("user `{0}` cannot subscribe to themselves")]
    InvalidSubscribe(String),
    #[error(transparent)]
    Repo(RepoError),
}

impl From<PaginationError> for ServiceError {
    fn from(error: PaginationError) -> Self {
        match error {
            PaginationError::InvalidToken(detail) => ServiceError::InvalidToken(detail),
            PaginationError::InvalidSize(size) => ServiceError::InvalidSize(size),
        }
    }
}

impl From<RepoError> for ServiceError {
    fn from(error: RepoError) -> Self {
        match error {
            RepoError::Pagination(err) => err.into(),
            other => ServiceError::Repo(other),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub message: &'static str,
}

#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: &'static str,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: &'static str,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message,
            report,
        }
    }

    pub fn bad_request(
        source: &'static str,
        public_message: &'static str,
        detail: impl Into<String>,
    ) -> Self {
        Self::new(source, StatusCode::BAD_REQUEST, public_message, detail)
    }

    pub fn unauthorized(source: &'static str, detail: impl Into<String>) -> Self {
        Self::new(
            source,
            StatusCode::UNAUTHORIZED,
            "Invalid or empty user id",
            detail,
        )
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn public_message(&self) -> &'static str {
        self.public_message
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let body = ErrorBody {
            message: self.public_message,
        };
        let mut response = (self.status, Json(body)).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<ServiceError> for HttpError {
    fn from(error: ServiceError) -> Self {
        const SOURCE: &str = "infra::http::service_error_to_http_error";
        match error {
            ServiceError::NotFound(_) => {
                HttpError::from_error(SOURCE, StatusCode::NOT_FOUND, "Post not found", &error)
            }
            ServiceError::Forbidden { .. } => {
                HttpError::from_error(SOURCE, StatusCode::FORBIDDEN, "Forbidden", &error)
            }
            ServiceError::InvalidToken(_) => {
                HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, "Invalid token", &error)
            }
            ServiceError::InvalidSize(_) => {
                HttpError::from_error(SOURCE, StatusCode::BAD_REQUEST, "Invalid size", &error)
            }
            ServiceError::InvalidSubscribe(_) => HttpError::from_error(
                SOURCE,
                StatusCode::BAD_REQUEST,
                "Cannot subscribe to yourself",
                &error,
            ),
            ServiceError::Repo(RepoError::Timeout) => HttpError::from_error(
                SOURCE,
                StatusCode::SERVICE_UNAVAILABLE,
                "Service temporarily unavailable",
                &error,
            ),
            ServiceError::Repo(_) => HttpError::from_error(
                SOURCE,
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error",
                &error,
            ),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }

    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Domain(DomainError::InvalidUserId { .. }) => StatusCode::BAD_REQUEST,
            AppError::Infra(InfraError::Database { .. }) => StatusCode::SERVICE_UNAVAILABLE,
            AppError::Infra(_) | AppError::Unexpected(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn presentation_message(&self) -> &'static str {
        match self {
            AppError::Domain(DomainError::InvalidUserId { .. }) => "Invalid user id",
            AppError::Infra(InfraError::Database { .. }) => "Service temporarily unavailable",
            AppError::Infra(InfraError::Configuration { .. }) => "Service misconfigured",
            AppError::Infra(InfraError::Telemetry(_)) => "Logging subsystem could not start",
            AppError::Infra(InfraError::Io(_)) => "I/O failure during request",
            AppError::Infra(InfraError::Bind { .. }) => "Listener could not start",
            AppError::Unexpected(_) => "Unexpected error occurred",
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = self.presentation_message();
        let report = ErrorReport::from_error("application::error::AppError", status, &self);
        let mut response = (status, message).into_response();
        report.attach(&mut response);
        response
    }
}
