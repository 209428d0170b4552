use axum::{
    Json,
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Serialize;

use crate::engine::{EngineError, FieldError};

#[derive(Debug)]
pub enum ApiError {
    Engine(EngineError),
    BadRequest(String),
    Unauthorized,
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
    code: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    errors: Option<Vec<FieldError>>,
}

fn status_for_engine_error(err: &EngineError) -> StatusCode {
    match err {
        EngineError::NotFound(_) => StatusCode::NOT_FOUND,
        EngineError::InvalidRange { .. } | EngineError::LimitExceeded(_) => StatusCode::BAD_REQUEST,
        EngineError::Invalid(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::SlotUnavailable { .. }
        | EngineError::AlreadyExists(_)
        | EngineError::DuplicateName(_)
        | EngineError::InvalidTransition { .. } => StatusCode::CONFLICT,
        EngineError::Forbidden(_) => StatusCode::FORBIDDEN,
        EngineError::WalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn code_for_engine_error(err: &EngineError) -> &'static str {
    match err {
        EngineError::NotFound(_) => "not_found",
        EngineError::InvalidRange { .. } => "invalid_range",
        EngineError::LimitExceeded(_) => "limit_exceeded",
        EngineError::Invalid(_) => "validation_failed",
        EngineError::SlotUnavailable { .. } => "slot_unavailable",
        EngineError::AlreadyExists(_) => "already_exists",
        EngineError::DuplicateName(_) => "duplicate_name",
        EngineError::InvalidTransition { .. } => "invalid_transition",
        EngineError::Forbidden(_) => "forbidden",
        EngineError::WalError(_) => "internal",
    }
}

fn body_for_engine_error(err: EngineError) -> ErrorBody {
    let code = code_for_engine_error(&err);
    match err {
        EngineError::WalError(wal_err) => {
            tracing::error!("storage failure: {wal_err}");
            ErrorBody {
                error: "internal server error".to_string(),
                code,
                errors: None,
            }
        }
        EngineError::Forbidden(_) => ErrorBody {
            error: "not permitted".to_string(),
            code,
            errors: None,
        },
        EngineError::Invalid(errors) => ErrorBody {
            error: "validation failed".to_string(),
            code,
            errors: Some(errors),
        },
        other => ErrorBody {
            error: other.to_string(),
            code,
            errors: None,
        },
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> axum::response::Response {
        let (status, body) = match self {
            ApiError::Engine(err) => (status_for_engine_error(&err), body_for_engine_error(err)),
            ApiError::BadRequest(error) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error,
                    code: "bad_request",
                    errors: None,
                },
            ),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                ErrorBody {
                    error: "authentication required".to_string(),
                    code: "unauthorized",
                    errors: None,
                },
            ),
        };

        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(value: EngineError) -> Self {
        Self::Engine(value)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(value: JsonRejection) -> Self {
        Self::BadRequest(value.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(value: PathRejection) -> Self {
        Self::BadRequest(value.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(value: QueryRejection) -> Self {
        Self::BadRequest(value.body_text())
    }
}
