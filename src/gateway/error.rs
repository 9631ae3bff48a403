//! Gateway error mapping
//!
//! Every handler returns `Result<_, ApiError>`; domain errors carry their
//! own HTTP status and code, this type only renders them.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

use crate::loyalty::LoyaltyError;
use crate::user_auth::AuthError;

#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error(transparent)]
    Auth(#[from] AuthError),

    #[error(transparent)]
    Loyalty(#[from] LoyaltyError),
}

/// JSON body for error responses
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub msg: String,
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Auth(e) => e.http_status(),
            ApiError::Loyalty(e) => e.http_status(),
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ApiError::BadRequest(_) => "BAD_REQUEST",
            ApiError::Auth(e) => e.code(),
            ApiError::Loyalty(e) => e.code(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(error = %self, "Request failed");
        } else {
            tracing::debug!(status = status.as_u16(), error = %self, "Request rejected");
        }

        let body = ErrorBody {
            code: self.code(),
            // Internal details stay in the log
            msg: if status.is_server_error() {
                "internal error".to_string()
            } else {
                self.to_string()
            },
        };
        (status, Json(body)).into_response()
    }
}
