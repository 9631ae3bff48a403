use std::sync::Arc;

use crate::loyalty::LoyaltyService;
use crate::user_auth::UserAuthService;

/// Gateway shared state
pub struct AppState {
    pub loyalty: Arc<LoyaltyService>,
    pub auth: Arc<UserAuthService>,
}

impl AppState {
    pub fn new(loyalty: Arc<LoyaltyService>, auth: Arc<UserAuthService>) -> Self {
        Self { loyalty, auth }
    }
}
