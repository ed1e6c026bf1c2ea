use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Invalid seat: {0}")]
    InvalidSeat(String),

    #[error("Seat(s) already taken by another user: {0:?}")]
    SeatConflict(Vec<i64>),

    #[error("Insufficient wallet balance")]
    InsufficientFunds,

    #[error("Settlement failed: {0}")]
    Settlement(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),
}

impl AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InvalidSeat(_) => StatusCode::BAD_REQUEST,
            AppError::SeatConflict(_) => StatusCode::CONFLICT,
            AppError::InsufficientFunds => StatusCode::PAYMENT_REQUIRED,
            AppError::Settlement(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::BadRequest(_) => StatusCode::BAD_REQUEST,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = Json(json!({
            "error": self.to_string(),
            "status": status.as_u16(),
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_invalid_seat_status_code() {
        let error = AppError::InvalidSeat("seat 7 not configured for event 1".to_string());
        assert_eq!(error.status_code(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_seat_conflict_status_code() {
        let error = AppError::SeatConflict(vec![42]);
        assert_eq!(error.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn test_insufficient_funds_status_code() {
        assert_eq!(
            AppError::InsufficientFunds.status_code(),
            StatusCode::PAYMENT_REQUIRED
        );
    }

    #[test]
    fn test_settlement_status_code() {
        let error = AppError::Settlement("bill insert failed".to_string());
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_database_error_status_code() {
        let error = AppError::Database(sqlx::Error::RowNotFound);
        assert_eq!(error.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_seat_conflict_response() {
        let error = AppError::SeatConflict(vec![1, 2]);
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::CONFLICT);
    }

    #[tokio::test]
    async fn test_not_found_response() {
        let error = AppError::NotFound("Ticket 9 not found".to_string());
        let response = error.into_response();

        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
