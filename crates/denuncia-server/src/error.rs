//! Server error types

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use denuncia_core::LedgerError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ApiError {
    #[error("Invalid content id: {0}")]
    InvalidContentId(#[from] denuncia_core::Error),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("No ledger configured")]
    LedgerNotConfigured,

    #[error(transparent)]
    Ledger(#[from] LedgerError),

    #[error("Metrics recorder not installed")]
    MetricsDisabled,

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidContentId(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::LedgerNotConfigured => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Ledger(LedgerError::RateLimited(_)) => StatusCode::TOO_MANY_REQUESTS,
            ApiError::Ledger(_) => StatusCode::BAD_GATEWAY,
            ApiError::MetricsDisabled => StatusCode::NOT_FOUND,
            ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), self.to_string()).into_response()
    }
}

pub type Result<T> = std::result::Result<T, ApiError>;
