//! User accounts: registration, login and bearer-token verification.

pub mod error;
pub mod handlers;
pub mod middleware;
pub mod service;
pub mod store;

pub use error::AuthError;
pub use middleware::{AuthUser, jwt_auth_middleware};
pub use service::{Claims, UserAuthService};
pub use store::{User, UserStore};
