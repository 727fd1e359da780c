//! HTTP error mapping

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use gryork_audit::AuditError;
use gryork_core::{ErrorKind, LifecycleError};

use crate::handlers::ApiResponse;

#[derive(Debug)]
pub enum ApiError {
    Lifecycle(LifecycleError),
    Audit(AuditError),
    /// Missing or unrecognised actor headers
    Unauthorized(String),
    BadRequest(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Lifecycle(e) => match e.kind() {
                ErrorKind::Forbidden => StatusCode::FORBIDDEN,
                ErrorKind::Conflict | ErrorKind::AlreadyLocked => StatusCode::CONFLICT,
                ErrorKind::InvalidTransition | ErrorKind::InvalidStage => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
                ErrorKind::NotFound => StatusCode::NOT_FOUND,
                ErrorKind::Validation => StatusCode::BAD_REQUEST,
                ErrorKind::Storage => StatusCode::INTERNAL_SERVER_ERROR,
            },
            ApiError::Audit(AuditError::UnsupportedFormat(_)) => StatusCode::BAD_REQUEST,
            ApiError::Audit(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            ApiError::Lifecycle(e) => e.kind().as_str(),
            ApiError::Audit(AuditError::UnsupportedFormat(_)) => "VALIDATION",
            ApiError::Audit(_) => "AUDIT_UNAVAILABLE",
            ApiError::Unauthorized(_) => "UNAUTHORIZED",
            ApiError::BadRequest(_) => "BAD_REQUEST",
        }
    }

    fn message(&self) -> String {
        match self {
            ApiError::Lifecycle(e) => e.to_string(),
            ApiError::Audit(e) => e.to_string(),
            ApiError::Unauthorized(msg) | ApiError::BadRequest(msg) => msg.clone(),
        }
    }
}

impl From<LifecycleError> for ApiError {
    fn from(e: LifecycleError) -> Self {
        ApiError::Lifecycle(e)
    }
}

impl From<AuditError> for ApiError {
    fn from(e: AuditError) -> Self {
        ApiError::Audit(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(kind = self.kind(), error = %self.message(), "Request failed");
        }
        let body: Json<ApiResponse<()>> = ApiResponse::error(self.kind(), self.message());
        (status, body).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
