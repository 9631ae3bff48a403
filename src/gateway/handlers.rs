use axum::{
    Extension, Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

use super::error::ApiError;
use super::state::AppState;
use super::types::{OrderView, WithdrawRequest, WithdrawalView};
use crate::loyalty::{OrderSubmission, WithdrawalSubmission};
use crate::user_auth::AuthUser;

/// POST /api/user/orders
///
/// Body is the bare order number as text.
pub async fn upload_order(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    body: String,
) -> Result<StatusCode, ApiError> {
    if body.trim().is_empty() {
        return Err(ApiError::BadRequest("order number is required".into()));
    }

    match state.loyalty.submit_order(user_id, &body).await? {
        OrderSubmission::Accepted => Ok(StatusCode::ACCEPTED),
        OrderSubmission::AlreadyUploaded => Ok(StatusCode::OK),
    }
}

/// GET /api/user/orders
pub async fn list_orders(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Response, ApiError> {
    let orders = state.loyalty.list_orders(user_id).await?;
    if orders.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    let views: Vec<OrderView> = orders.iter().map(OrderView::from).collect();
    Ok(Json(views).into_response())
}

/// GET /api/user/balance
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Response, ApiError> {
    let balance = state.loyalty.balance(user_id).await?;
    Ok(Json(balance).into_response())
}

/// POST /api/user/balance/withdraw
pub async fn withdraw(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    body: Bytes,
) -> Result<StatusCode, ApiError> {
    let req: WithdrawRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::BadRequest(format!("invalid withdrawal body: {}", e)))?;

    match state
        .loyalty
        .submit_withdrawal(user_id, &req.order, req.sum)
        .await?
    {
        WithdrawalSubmission::Recorded | WithdrawalSubmission::AlreadyRecorded => Ok(StatusCode::OK),
    }
}

/// GET /api/user/withdrawals
pub async fn list_withdrawals(
    State(state): State<Arc<AppState>>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<Response, ApiError> {
    let withdrawals = state.loyalty.list_withdrawals(user_id).await?;
    if withdrawals.is_empty() {
        return Ok(StatusCode::NO_CONTENT.into_response());
    }
    let views: Vec<WithdrawalView> = withdrawals.iter().map(WithdrawalView::from).collect();
    Ok(Json(views).into_response())
}

/// GET /api/health
pub async fn health_check() -> StatusCode {
    StatusCode::OK
}
