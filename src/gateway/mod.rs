//! HTTP Gateway
//!
//! User-facing API over axum.
//!
//! | Route                              | Auth |
//! |------------------------------------|------|
//! | `POST /api/user/register`          | no   |
//! | `POST /api/user/login`             | no   |
//! | `POST /api/user/orders`            | JWT  |
//! | `GET  /api/user/orders`            | JWT  |
//! | `GET  /api/user/balance`           | JWT  |
//! | `POST /api/user/balance/withdraw`  | JWT  |
//! | `GET  /api/user/withdrawals`       | JWT  |

pub mod error;
pub mod handlers;
pub mod state;
pub mod types;

use axum::{
    Router,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;

use crate::shutdown::ShutdownSignal;
use crate::user_auth;
use state::AppState;

/// Build the full router for `state`
pub fn router(state: Arc<AppState>) -> Router {
    let auth_routes = Router::new()
        .route("/register", post(user_auth::handlers::register))
        .route("/login", post(user_auth::handlers::login));

    let private_routes = Router::new()
        .route(
            "/orders",
            post(handlers::upload_order).get(handlers::list_orders),
        )
        .route("/balance", get(handlers::get_balance))
        .route("/balance/withdraw", post(handlers::withdraw))
        .route("/withdrawals", get(handlers::list_withdrawals))
        .layer(from_fn_with_state(
            state.clone(),
            user_auth::jwt_auth_middleware,
        ));

    Router::new()
        .route("/api/health", get(handlers::health_check))
        .nest("/api/user", auth_routes.merge(private_routes))
        .with_state(state)
}

/// Serve the API on `addr` until shutdown is requested.
pub async fn run_server(
    addr: SocketAddr,
    state: Arc<AppState>,
    shutdown: ShutdownSignal,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    serve(listener, state, shutdown).await
}

/// Serve on an already-bound listener (tests bind `127.0.0.1:0`).
pub async fn serve(
    listener: TcpListener,
    state: Arc<AppState>,
    shutdown: ShutdownSignal,
) -> std::io::Result<()> {
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "Gateway listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { shutdown.wait().await })
        .await?;

    tracing::info!("Gateway stopped");
    Ok(())
}
