use argon2::{
    Algorithm, Argon2, Params, Version,
    password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::error::AuthError;
use super::store::UserStore;
use crate::core_types::UserId;
use crate::ledger::LedgerError;
use crate::retry::RetryPolicy;
use crate::shutdown::ShutdownSignal;

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String, // Subject (user_id as string)
    pub exp: usize,  // Expiration time (as UTC timestamp)
    pub iat: usize,  // Issued at
}

pub struct UserAuthService {
    store: Arc<dyn UserStore>,
    retry: RetryPolicy,
    shutdown: ShutdownSignal,
    hasher: Argon2<'static>,
    jwt_secret: String,
    token_ttl: Duration,
}

impl UserAuthService {
    pub fn new(
        store: Arc<dyn UserStore>,
        shutdown: ShutdownSignal,
        jwt_secret: String,
        token_ttl: Duration,
    ) -> Self {
        Self {
            store,
            retry: RetryPolicy::default(),
            shutdown,
            hasher: Argon2::default(),
            jwt_secret,
            token_ttl,
        }
    }

    /// Override argon2 cost parameters (tests use cheap ones).
    pub fn with_password_params(mut self, params: Params) -> Self {
        self.hasher = Argon2::new(Algorithm::Argon2id, Version::V0x13, params);
        self
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Register a new user, returning its id
    pub async fn register(&self, login: &str, password: &str) -> Result<UserId, AuthError> {
        if login.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidInput);
        }

        let salt = SaltString::generate(&mut OsRng);
        let password_hash = self
            .hasher
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AuthError::Hashing(e.to_string()))?
            .to_string();

        let store = &self.store;
        let result = self
            .retry
            .run(
                &self.shutdown,
                |e| store.is_retryable(e),
                || store.add_user(login, &password_hash),
            )
            .await;

        match result {
            Ok(user) => {
                tracing::info!(user_id = user.id, login, "User registered");
                Ok(user.id)
            }
            Err(LedgerError::Duplicate(_)) => Err(AuthError::LoginTaken(login.to_string())),
            Err(e) => Err(e.into()),
        }
    }

    /// Check credentials and issue a JWT
    pub async fn login(&self, login: &str, password: &str) -> Result<String, AuthError> {
        if login.is_empty() || password.is_empty() {
            return Err(AuthError::InvalidInput);
        }

        let store = &self.store;
        let user = self
            .retry
            .run(
                &self.shutdown,
                |e| store.is_retryable(e),
                || store.get_user_by_login(login),
            )
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|e| AuthError::Hashing(format!("stored hash for {}: {}", user.login, e)))?;

        self.hasher
            .verify_password(password.as_bytes(), &parsed_hash)
            .map_err(|_| AuthError::InvalidCredentials)?;

        self.issue_token(user.id)
    }

    /// Sign an HS256 token for `user_id`
    pub fn issue_token(&self, user_id: UserId) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: user_id.to_string(),
            exp: (now + self.token_ttl).timestamp() as usize,
            iat: now.timestamp() as usize,
        };

        encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.jwt_secret.as_bytes()),
        )
        .map_err(AuthError::Signing)
    }

    /// Verify JWT token and return the user id it was issued for
    pub fn verify_token(&self, token: &str) -> Result<UserId, AuthError> {
        let decoding_key = DecodingKey::from_secret(self.jwt_secret.as_bytes());
        let validation = Validation::new(jsonwebtoken::Algorithm::HS256);
        let token_data =
            decode::<Claims>(token, &decoding_key, &validation).map_err(|e| {
                tracing::debug!(error = %e, "Token rejected");
                AuthError::InvalidToken
            })?;
        token_data
            .claims
            .sub
            .parse::<UserId>()
            .map_err(|_| AuthError::InvalidToken)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::ledger::MemoryLedger;

    /// Cheap argon2 parameters so tests don't spend seconds hashing
    pub(crate) fn fast_params() -> Params {
        Params::new(1024, 1, 1, None).unwrap()
    }

    fn service(store: Arc<MemoryLedger>) -> UserAuthService {
        UserAuthService::new(
            store,
            ShutdownSignal::new(),
            "test-secret".to_string(),
            Duration::hours(3),
        )
        .with_password_params(fast_params())
    }

    #[tokio::test]
    async fn test_register_then_login() {
        let auth = service(Arc::new(MemoryLedger::new()));
        let id = auth.register("alice", "wonderland").await.unwrap();

        let token = auth.login("alice", "wonderland").await.unwrap();
        assert_eq!(auth.verify_token(&token).unwrap(), id);
    }

    #[tokio::test]
    async fn test_register_taken_login() {
        let auth = service(Arc::new(MemoryLedger::new()));
        auth.register("alice", "one").await.unwrap();
        let err = auth.register("alice", "two").await.unwrap_err();
        assert!(matches!(err, AuthError::LoginTaken(_)));
    }

    #[tokio::test]
    async fn test_login_rejects_bad_credentials() {
        let auth = service(Arc::new(MemoryLedger::new()));
        auth.register("alice", "wonderland").await.unwrap();

        assert!(matches!(
            auth.login("alice", "looking-glass").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("bob", "wonderland").await,
            Err(AuthError::InvalidCredentials)
        ));
        assert!(matches!(
            auth.login("", "x").await,
            Err(AuthError::InvalidInput)
        ));
    }

    #[test]
    fn test_verify_rejects_foreign_and_expired_tokens() {
        let store = Arc::new(MemoryLedger::new());
        let auth = service(store.clone());
        let other = UserAuthService::new(
            store.clone(),
            ShutdownSignal::new(),
            "other-secret".to_string(),
            Duration::hours(3),
        );
        let token = other.issue_token(7).unwrap();
        assert!(matches!(
            auth.verify_token(&token),
            Err(AuthError::InvalidToken)
        ));

        // Past the default 60s validation leeway
        let expired = UserAuthService::new(
            store,
            ShutdownSignal::new(),
            "test-secret".to_string(),
            Duration::hours(-1),
        );
        let token = expired.issue_token(7).unwrap();
        assert!(matches!(
            auth.verify_token(&token),
            Err(AuthError::InvalidToken)
        ));
        assert!(auth.verify_token("not-a-jwt").is_err());
    }
}
