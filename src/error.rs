use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::dispatcher::DispatchError;
use crate::types::{ApiErrorCode, ApiErrorResponse};

#[derive(Debug)]
pub enum ApiError {
    Validation(String),
    Unauthorized(String),
    NotFound(String),
    Conflict(String),
    /// No replica can take the request right now.
    ServiceUnavailable(String),
    /// Replicas existed but every one of them failed.
    UpstreamExhausted(String),
    DeadlineExceeded(String),
    /// A replica answered with something that cannot be relayed.
    BadGateway(String),
    Db(sqlx::Error),
    Internal(String),
}

impl ApiError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        Self::Db(err)
    }
}

impl From<DispatchError> for ApiError {
    fn from(err: DispatchError) -> Self {
        match err {
            DispatchError::NoHealthyReplica { .. } | DispatchError::RegistryUnavailable(_) => {
                Self::ServiceUnavailable("service unavailable".to_string())
            }
            DispatchError::AllReplicasExhausted { .. } => {
                Self::UpstreamExhausted("service unavailable after retries".to_string())
            }
            DispatchError::DeadlineExceeded { .. } => {
                Self::DeadlineExceeded("request deadline exceeded".to_string())
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::Validation(message) => {
                (StatusCode::BAD_REQUEST, ApiErrorCode::Validation, message)
            }
            ApiError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, ApiErrorCode::Unauthorized, message)
            }
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, ApiErrorCode::NotFound, message),
            ApiError::Conflict(message) => (StatusCode::CONFLICT, ApiErrorCode::Conflict, message),
            ApiError::ServiceUnavailable(message) => {
                (StatusCode::SERVICE_UNAVAILABLE, ApiErrorCode::Unavailable, message)
            }
            ApiError::UpstreamExhausted(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ApiErrorCode::Unavailable, message)
            }
            ApiError::DeadlineExceeded(message) => {
                (StatusCode::GATEWAY_TIMEOUT, ApiErrorCode::Unavailable, message)
            }
            ApiError::BadGateway(message) => {
                (StatusCode::BAD_GATEWAY, ApiErrorCode::Unavailable, message)
            }
            ApiError::Db(err) => {
                tracing::error!(error = %err, "database error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    ApiErrorCode::Database,
                    "database error".to_string(),
                )
            }
            ApiError::Internal(message) => {
                (StatusCode::INTERNAL_SERVER_ERROR, ApiErrorCode::Internal, message)
            }
        };

        (status, Json(ApiErrorResponse { code, error: message })).into_response()
    }
}
