//! Registration, login and token refresh

use bcrypt::{hash, verify};
use chrono::Utc;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::auth::{AuthContext, TokenError, TokenKind, TokenService};
use crate::domain::{LoginRequest, RegisterRequest, Role, User};
use crate::store::{RfpStore, StoreError};

const MIN_PASSWORD_LEN: usize = 8;

#[derive(Debug, Error)]
pub enum AccountError {
    #[error("{0}")]
    Validation(String),

    #[error("email already registered")]
    EmailTaken,

    #[error("invalid email or password")]
    InvalidCredentials,

    #[error("{0}")]
    Unauthorized(String),

    #[error(transparent)]
    Token(#[from] TokenError),

    #[error("password hashing failed: {0}")]
    Hash(#[from] bcrypt::BcryptError),

    #[error("blocking task failed: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error(transparent)]
    Store(StoreError),
}

impl From<StoreError> for AccountError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::UniqueViolation(_) => Self::EmailTaken,
            other => Self::Store(other),
        }
    }
}

/// Token pair handed out at login
#[derive(Debug, Clone)]
pub struct IssuedTokens {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn RfpStore>,
    tokens: Arc<TokenService>,
    hash_cost: u32,
}

impl AccountService {
    pub fn new(store: Arc<dyn RfpStore>, tokens: Arc<TokenService>) -> Self {
        Self {
            store,
            tokens,
            hash_cost: bcrypt::DEFAULT_COST,
        }
    }

    /// Lower the bcrypt cost (tests).
    pub fn with_hash_cost(mut self, cost: u32) -> Self {
        self.hash_cost = cost;
        self
    }

    pub async fn register(&self, request: RegisterRequest) -> Result<User, AccountError> {
        let email = request.email.trim().to_lowercase();
        if !email.contains('@') {
            return Err(AccountError::Validation("invalid email address".to_string()));
        }
        if request.password.len() < MIN_PASSWORD_LEN {
            return Err(AccountError::Validation(format!(
                "password must be at least {} characters",
                MIN_PASSWORD_LEN
            )));
        }
        let role: Role = request
            .role
            .trim()
            .to_lowercase()
            .parse()
            .map_err(AccountError::Validation)?;

        if self.store.find_user_by_email(&email).await?.is_some() {
            return Err(AccountError::EmailTaken);
        }

        let password = request.password;
        let cost = self.hash_cost;
        let password_hash = tokio::task::spawn_blocking(move || hash(&password, cost)).await??;

        let user = User {
            id: Uuid::new_v4(),
            email,
            password_hash,
            role,
            active: true,
            created_at: Utc::now(),
        };
        self.store.insert_user(&user).await?;

        info!(user_id = %user.id, role = %user.role, "User registered");
        Ok(user)
    }

    pub async fn login(&self, request: LoginRequest) -> Result<(User, IssuedTokens), AccountError> {
        let email = request.email.trim().to_lowercase();
        let user = self
            .store
            .find_user_by_email(&email)
            .await?
            .ok_or(AccountError::InvalidCredentials)?;

        let password = request.password;
        let password_hash = user.password_hash.clone();
        let valid = tokio::task::spawn_blocking(move || verify(&password, &password_hash)).await??;
        if !valid {
            warn!(user_id = %user.id, "Failed login");
            return Err(AccountError::InvalidCredentials);
        }
        if !user.active {
            return Err(AccountError::Unauthorized("account is disabled".to_string()));
        }

        let tokens = IssuedTokens {
            access_token: self.tokens.issue(user.id, TokenKind::Access)?,
            refresh_token: self.tokens.issue(user.id, TokenKind::Refresh)?,
        };
        Ok((user, tokens))
    }

    /// Exchange a refresh token for a new access token.
    pub async fn refresh(&self, refresh_token: &str) -> Result<String, AccountError> {
        let verified = self.tokens.verify(refresh_token, TokenKind::Refresh)?;
        let user = self.active_user(verified.user_id).await?;
        Ok(self.tokens.issue(user.id, TokenKind::Access)?)
    }

    /// Resolve an access token to the user it was issued for.
    pub async fn authenticate(&self, access_token: &str) -> Result<AuthContext, AccountError> {
        let verified = self.tokens.verify(access_token, TokenKind::Access)?;
        let user = self.active_user(verified.user_id).await?;
        Ok(AuthContext::from(&user))
    }

    pub async fn current_user(&self, user_id: Uuid) -> Result<User, AccountError> {
        self.active_user(user_id).await
    }

    async fn active_user(&self, user_id: Uuid) -> Result<User, AccountError> {
        let user = self
            .store
            .find_user(user_id)
            .await?
            .ok_or_else(|| AccountError::Unauthorized("user not found".to_string()))?;
        if !user.active {
            return Err(AccountError::Unauthorized("account is disabled".to_string()));
        }
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;

    fn service() -> AccountService {
        let tokens = Arc::new(TokenService::new("test-secret", 15, 7));
        AccountService::new(Arc::new(MemoryStore::new()), tokens).with_hash_cost(4)
    }

    fn register(email: &str, role: &str) -> RegisterRequest {
        RegisterRequest {
            email: email.to_string(),
            password: "correct horse".to_string(),
            role: role.to_string(),
        }
    }

    #[tokio::test]
    async fn register_login_authenticate() {
        let accounts = service();
        let user = accounts.register(register("Buyer@Example.com", "Buyer")).await.unwrap();
        assert_eq!(user.email, "buyer@example.com");
        assert_eq!(user.role, Role::Buyer);

        let (_, tokens) = accounts
            .login(LoginRequest {
                email: "buyer@example.com".into(),
                password: "correct horse".into(),
            })
            .await
            .unwrap();
        let context = accounts.authenticate(&tokens.access_token).await.unwrap();
        assert_eq!(context.user_id, user.id);

        let access = accounts.refresh(&tokens.refresh_token).await.unwrap();
        assert!(accounts.authenticate(&access).await.is_ok());
        assert!(accounts.authenticate(&tokens.refresh_token).await.is_err());
    }

    #[tokio::test]
    async fn registration_validation() {
        let accounts = service();
        assert!(matches!(
            accounts.register(register("no-at-sign", "buyer")).await,
            Err(AccountError::Validation(_))
        ));
        assert!(matches!(
            accounts.register(register("a@x.io", "admin")).await,
            Err(AccountError::Validation(_))
        ));
        accounts.register(register("a@x.io", "supplier")).await.unwrap();
        assert!(matches!(
            accounts.register(register("a@x.io", "supplier")).await,
            Err(AccountError::EmailTaken)
        ));
    }

    #[tokio::test]
    async fn wrong_password_is_rejected() {
        let accounts = service();
        accounts.register(register("a@x.io", "buyer")).await.unwrap();
        assert!(matches!(
            accounts
                .login(LoginRequest {
                    email: "a@x.io".into(),
                    password: "wrong password".into(),
                })
                .await,
            Err(AccountError::InvalidCredentials)
        ));
    }
}
