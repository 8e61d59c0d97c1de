//! API Error Handling
//!
//! Unified error types and conversion for API responses.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::service::entity::EntityError;
use crate::service::execution::ExecutionError;
use crate::service::schedule::ScheduleError;

/// API error type
#[derive(Debug)]
pub enum ApiError {
    NotFound(String),
    BadRequest(String),
    Conflict(String),
    DatabaseError(sqlx::Error),
    InternalError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::DatabaseError(err) => {
                tracing::error!("Database error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
            ApiError::InternalError(msg) => {
                tracing::error!("Internal error: {}", msg);
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        (status, Json(serde_json::json!({ "error": message }))).into_response()
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(err: sqlx::Error) -> Self {
        ApiError::DatabaseError(err)
    }
}

impl From<ScheduleError> for ApiError {
    fn from(err: ScheduleError) -> Self {
        match err {
            ScheduleError::NotFound(id) => ApiError::NotFound(format!("Schedule {} not found", id)),
            ScheduleError::ValidationError(msg) => ApiError::BadRequest(msg),
            ScheduleError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<ExecutionError> for ApiError {
    fn from(err: ExecutionError) -> Self {
        match err {
            ExecutionError::NotFound(id) => ApiError::NotFound(format!("Job {} not found", id)),
            ExecutionError::ScheduleNotFound(id) => {
                ApiError::NotFound(format!("Schedule {} not found", id))
            }
            ExecutionError::StaleSchedule(id) => {
                ApiError::Conflict(format!("Schedule {} is not due", id))
            }
            ExecutionError::InvalidCron(msg) => ApiError::BadRequest(msg),
            ExecutionError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<EntityError> for ApiError {
    fn from(err: EntityError) -> Self {
        match err {
            EntityError::ValidationError(msg) => ApiError::BadRequest(msg),
            EntityError::DatabaseError(err) => ApiError::DatabaseError(err),
        }
    }
}

impl From<harvest_queue::QueueError> for ApiError {
    fn from(err: harvest_queue::QueueError) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    #[test]
    fn test_status_codes() {
        let cases = [
            (ApiError::from(ScheduleError::NotFound(Uuid::nil())), StatusCode::NOT_FOUND),
            (
                ApiError::from(ScheduleError::ValidationError("bad cron".into())),
                StatusCode::BAD_REQUEST,
            ),
            (
                ApiError::from(ExecutionError::StaleSchedule(Uuid::nil())),
                StatusCode::CONFLICT,
            ),
            (
                ApiError::from(EntityError::DatabaseError(sqlx::Error::RowNotFound)),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                ApiError::from(harvest_queue::QueueError::unavailable("down")),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];

        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
