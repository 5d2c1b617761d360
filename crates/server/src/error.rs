use axum::{
    http::StatusCode,
    response::{IntoResponse, Json as ResponseJson, Response},
};
use services::services::garment_ai::GarmentAiError;
use thiserror::Error;
use utils::response::ApiResponse;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error(transparent)]
    GarmentAi(#[from] GarmentAiError),
    #[error(transparent)]
    Database(#[from] sqlx::Error),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("bad request: {0}")]
    BadRequest(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::GarmentAi(e) if e.is_precondition() => StatusCode::BAD_REQUEST,
            // Anything else from the AI side is an upstream failure
            ApiError::GarmentAi(_) => StatusCode::BAD_GATEWAY,
            ApiError::Database(sqlx::Error::RowNotFound) | ApiError::NotFound(_) => {
                StatusCode::NOT_FOUND
            }
            ApiError::Database(_) => StatusCode::INTERNAL_SERVER_ERROR,
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            ApiError::Database(e) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %e, "Database error");
                "An internal error occurred".to_string()
            }
            ApiError::GarmentAi(e) if status == StatusCode::BAD_GATEWAY => {
                tracing::warn!(error = %e, "AI gateway call failed");
                self.to_string()
            }
            _ => self.to_string(),
        };

        (status, ResponseJson(ApiResponse::<()>::error(&message))).into_response()
    }
}
