use axum::{
    body::Body,
    extract::State,
    http::{Request, header},
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use super::error::AuthError;
use crate::core_types::UserId;
use crate::gateway::{error::ApiError, state::AppState};

/// Authenticated caller, inserted as a request extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthUser(pub UserId);

pub async fn jwt_auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request<Body>,
    next: Next,
) -> Result<Response, ApiError> {
    let auth_header = request
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::InvalidToken)?;

    // Clients may send the raw token they got back from register/login
    let token = auth_header
        .strip_prefix("Bearer ")
        .unwrap_or(auth_header)
        .trim();

    let user_id = state.auth.verify_token(token)?;
    request.extensions_mut().insert(AuthUser(user_id));
    Ok(next.run(request).await)
}
