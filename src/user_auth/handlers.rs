use axum::{
    body::Bytes,
    extract::State,
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};
use serde::Deserialize;
use std::sync::Arc;

use super::error::AuthError;
use crate::gateway::{error::ApiError, state::AppState};

/// Register / login request body
#[derive(Debug, Deserialize)]
pub struct Credentials {
    pub login: String,
    pub password: String,
}

impl Credentials {
    fn from_body(body: &[u8]) -> Result<Self, AuthError> {
        serde_json::from_slice(body).map_err(|e| {
            tracing::debug!(error = %e, "Malformed credentials body");
            AuthError::InvalidInput
        })
    }
}

fn with_token(token: String) -> Response {
    (
        StatusCode::OK,
        [(header::AUTHORIZATION, format!("Bearer {}", token))],
    )
        .into_response()
}

/// Register a new user and log them in
///
/// POST /api/user/register
pub async fn register(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let creds = Credentials::from_body(&body)?;
    let user_id = state.auth.register(&creds.login, &creds.password).await?;
    let token = state.auth.issue_token(user_id)?;
    Ok(with_token(token))
}

/// Login user
///
/// POST /api/user/login
pub async fn login(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<Response, ApiError> {
    let creds = Credentials::from_body(&body)?;
    let token = state.auth.login(&creds.login, &creds.password).await?;
    Ok(with_token(token))
}
