//! User service
//!
//! Account and authentication logic:
//! - Registration with an optional password (provider-only accounts have none)
//! - Password login issuing a session token
//! - Third-party login, creating the account on first sign-in
//! - Resolving and validating session tokens

use crate::db::repositories::UserRepository;
use crate::models::{CreateUserInput, User};
use crate::services::identity::{IdentityError, IdentityVerifier};
use crate::services::password::{hash_password, validate_password_policy, verify_password};
use crate::services::token::{JwtService, TokenError};
use chrono::Duration;
use std::sync::Arc;

/// Default lifetime of a session token in hours
pub const DEFAULT_TOKEN_TTL_HOURS: i64 = 24;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Malformed or policy-violating input
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Email already registered
    #[error("User already exists: {0}")]
    UserExists(String),

    /// Unknown email, provider-only account or wrong password
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// The identity provider assertion was rejected
    #[error("Third-party verification failed: {0}")]
    VerificationFailed(String),

    /// Missing, invalid or expired session token
    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    /// Internal error
    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

impl From<TokenError> for UserServiceError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Signing(msg) => Self::InternalError(anyhow::anyhow!(msg)),
            other => Self::Unauthenticated(other.to_string()),
        }
    }
}

impl From<IdentityError> for UserServiceError {
    fn from(err: IdentityError) -> Self {
        match err {
            IdentityError::KeyFetch(e) => Self::InternalError(e),
            other => Self::VerificationFailed(other.to_string()),
        }
    }
}

/// User service for registration and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    tokens: Arc<JwtService>,
    identity: Arc<dyn IdentityVerifier>,
    token_ttl: Duration,
    third_party_token_ttl: Duration,
}

impl UserService {
    /// Create a new user service; both token lifetimes default to 24 hours
    pub fn new(
        user_repo: Arc<dyn UserRepository>,
        tokens: Arc<JwtService>,
        identity: Arc<dyn IdentityVerifier>,
    ) -> Self {
        Self {
            user_repo,
            tokens,
            identity,
            token_ttl: Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
            third_party_token_ttl: Duration::hours(DEFAULT_TOKEN_TTL_HOURS),
        }
    }

    /// Override the token lifetimes for password and third-party logins
    pub fn with_token_ttls(mut self, password_login: Duration, third_party_login: Duration) -> Self {
        self.token_ttl = password_login;
        self.third_party_token_ttl = third_party_login;
        self
    }

    /// Register a new user.
    ///
    /// No token is issued; the caller logs in separately.
    ///
    /// # Errors
    ///
    /// - `ValidationError` if name or email is empty or the password fails the policy
    /// - `UserExists` if the email is taken
    /// - `InternalError` for database or hashing errors
    pub async fn register(&self, input: RegisterInput) -> Result<User, UserServiceError> {
        let name = input.name.trim();
        let email = input.email.trim();
        if name.is_empty() {
            return Err(UserServiceError::ValidationError("Name is required".into()));
        }
        if email.is_empty() {
            return Err(UserServiceError::ValidationError("Email is required".into()));
        }

        if self.user_repo.exists_by_email(email).await? {
            return Err(UserServiceError::UserExists(email.to_string()));
        }

        let password_hash = match input.password.as_deref().filter(|p| !p.is_empty()) {
            Some(password) => {
                validate_password_policy(password)
                    .map_err(|e| UserServiceError::ValidationError(e.to_string()))?;
                Some(hash_password(password)?)
            }
            None => None,
        };

        let user = User::new(name.to_string(), email.to_string(), password_hash);
        let created = self.user_repo.create(&user).await.map_err(|e| {
            if is_unique_violation(&e) {
                UserServiceError::UserExists(email.to_string())
            } else {
                UserServiceError::InternalError(e)
            }
        })?;

        tracing::info!("Registered user {} (id {})", created.email, created.id);
        Ok(created)
    }

    /// Log in with email and password, returning a session token.
    ///
    /// Every credential failure is the same `InvalidCredentials` error.
    pub async fn login(&self, input: LoginInput) -> Result<String, UserServiceError> {
        let user = match self.user_repo.get_by_email(input.email.trim()).await? {
            Some(user) => user,
            None => {
                tracing::warn!("Login failed: unknown email");
                return Err(UserServiceError::InvalidCredentials);
            }
        };

        let Some(hash) = user.password_hash.as_deref() else {
            tracing::warn!("Login failed: user {} has no password", user.id);
            return Err(UserServiceError::InvalidCredentials);
        };

        if !verify_password(&input.password, hash)? {
            tracing::warn!("Login failed: wrong password for user {}", user.id);
            return Err(UserServiceError::InvalidCredentials);
        }

        tracing::info!("User {} logged in", user.id);
        Ok(self.tokens.issue(user.id, self.token_ttl)?)
    }

    /// Log in with an identity provider assertion, returning a session token.
    ///
    /// An unknown email signs the person up: a password-less account is
    /// created from the assertion. Existing accounts are left untouched.
    pub async fn third_party_login(&self, assertion: &str) -> Result<String, UserServiceError> {
        let claims = self.identity.verify(assertion).await.map_err(|e| {
            tracing::warn!("Third-party login rejected: {}", e);
            UserServiceError::from(e)
        })?;

        let user = match self.user_repo.get_by_email(&claims.email).await? {
            Some(user) => user,
            None => {
                let new_user = User::new(claims.name, claims.email.clone(), None)
                    .with_google_id(claims.subject);
                match self.user_repo.create(&new_user).await {
                    Ok(user) => {
                        tracing::info!("Created user {} from third-party login", user.id);
                        user
                    }
                    // Lost a race with a concurrent first sign-in
                    Err(e) if is_unique_violation(&e) => self
                        .user_repo
                        .get_by_email(&claims.email)
                        .await?
                        .ok_or(UserServiceError::InternalError(e))?,
                    Err(e) => return Err(e.into()),
                }
            }
        };

        tracing::info!("User {} logged in through identity provider", user.id);
        Ok(self.tokens.issue(user.id, self.third_party_token_ttl)?)
    }

    /// Check a session token and return the user id it carries
    pub fn validate_token(&self, token: &str) -> Result<i64, UserServiceError> {
        Ok(self.tokens.verify_user_id(token)?)
    }

    /// Resolve a session token to its user
    pub async fn get_current_user(&self, token: &str) -> Result<User, UserServiceError> {
        let user_id = self.validate_token(token)?;
        self.get_user(user_id).await
    }

    /// Load the user an authenticated request acts as
    pub async fn get_user(&self, user_id: i64) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(user_id)
            .await?
            .ok_or_else(|| UserServiceError::Unauthenticated("User no longer exists".into()))
    }
}

fn is_unique_violation(err: &anyhow::Error) -> bool {
    matches!(
        err.downcast_ref::<sqlx::Error>(),
        Some(sqlx::Error::Database(db_err)) if db_err.is_unique_violation()
    )
}

/// Input for user registration
pub type RegisterInput = CreateUserInput;

/// Input for password login
#[derive(Debug, Clone, serde::Deserialize)]
pub struct LoginInput {
    pub email: String,
    pub password: String,
}

impl LoginInput {
    /// Create a new login input
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }
}
