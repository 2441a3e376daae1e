use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use tezshop_payments::OrderError;

/// Errors surfaced by the shop-facing endpoints. Provider callbacks never
/// use this type: Payme and Click both expect HTTP 200 with a protocol
/// error body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Order(#[from] OrderError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(message) => (StatusCode::BAD_REQUEST, message),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message),
            ApiError::Order(err) => {
                let status = match &err {
                    OrderError::Database(db_err) => {
                        tracing::error!(%db_err, "order operation failed");
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                    OrderError::UserNotFound | OrderError::OrderNotFound => StatusCode::NOT_FOUND,
                    OrderError::HasDebt => StatusCode::FORBIDDEN,
                    OrderError::PendingOnlineOrder => StatusCode::CONFLICT,
                    _ => StatusCode::BAD_REQUEST,
                };
                let message = match &err {
                    OrderError::Database(_) => "internal error".to_string(),
                    other => other.to_string(),
                };
                (status, message)
            }
        };

        let body = Json(json!({
            "status": "error",
            "message": message,
        }));
        (status, body).into_response()
    }
}
