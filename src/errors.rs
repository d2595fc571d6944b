use axum::http::StatusCode;
use axum::response::IntoResponse;
use thiserror::Error;

use crate::db::forecast_store::StoreError;
use crate::services::coordinates::CoordinateError;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("database error: {0}")]
    Db(#[from] StoreError),
    #[error("invalid coordinates: {0}")]
    InvalidCoordinates(#[from] CoordinateError),
}

impl IntoResponse for AppError {
    fn into_response(self) -> axum::response::Response {
        match self {
            AppError::InvalidCoordinates(err) => {
                (StatusCode::BAD_REQUEST, err.to_string()).into_response()
            }
            AppError::Db(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "Internal server error").into_response()
            }
        }
    }
}
