//! Authentication API endpoints
//!
//! Handles HTTP requests for user accounts:
//! - POST /api/users/register - Registration (no token issued)
//! - POST /api/users/login - Password login
//! - POST /api/users/google-login - Google sign-in, creating the account on first use
//! - GET /api/users/me - Current user
//! - GET /api/users/validate - Check a stored token

use axum::{
    extract::State,
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, ApiJson, AppState, AuthenticatedUser};
use crate::models::User;
use crate::services::user::{LoginInput, RegisterInput, UserServiceError};

/// Request body for user registration
#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    #[serde(default)]
    pub password: Option<String>,
}

/// Request body for password login
#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Request body for third-party login
#[derive(Debug, Deserialize)]
pub struct GoogleLoginRequest {
    /// ID token issued by Google
    pub token: String,
}

/// A plain acknowledgment
#[derive(Debug, Serialize, Deserialize)]
pub struct MessageResponse {
    pub message: String,
}

impl MessageResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Response carrying a session token
#[derive(Debug, Serialize, Deserialize)]
pub struct TokenResponse {
    pub token: String,
}

/// Response of the token validation endpoint
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidateResponse {
    pub valid: bool,
    pub user_id: i64,
}

impl From<UserServiceError> for ApiError {
    fn from(err: UserServiceError) -> Self {
        match err {
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(_) => ApiError::conflict("User already exists"),
            UserServiceError::InvalidCredentials => ApiError::invalid_credentials(),
            UserServiceError::VerificationFailed(_) => {
                ApiError::verification_failed("Google login failed")
            }
            UserServiceError::Unauthenticated(msg) => ApiError::unauthorized(msg),
            UserServiceError::InternalError(e) => ApiError::internal_error(format!("{:#}", e)),
        }
    }
}

/// Build public auth routes (no auth required)
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/register", post(register))
        .route("/login", post(login))
        .route("/google-login", post(google_login))
}

/// Build protected auth routes (requires auth middleware)
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/me", get(get_current_user))
        .route("/validate", get(validate))
}

/// POST /api/users/register - User registration
async fn register(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let input = RegisterInput::new(body.name, body.email, body.password.as_deref());
    state.user_service.register(input).await?;

    Ok((
        StatusCode::CREATED,
        Json(MessageResponse::new("User registered successfully")),
    ))
}

/// POST /api/users/login - Password login
async fn login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<LoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = state
        .user_service
        .login(LoginInput::new(body.email, body.password))
        .await?;

    Ok(Json(TokenResponse { token }))
}

/// POST /api/users/google-login - Sign in with a Google ID token.
///
/// A first sign-in with an unknown email creates a password-less account.
async fn google_login(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<GoogleLoginRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let token = state.user_service.third_party_login(&body.token).await?;
    Ok(Json(TokenResponse { token }))
}

/// GET /api/users/me - The authenticated user, without password hash
async fn get_current_user(
    State(state): State<AppState>,
    AuthenticatedUser(user_id): AuthenticatedUser,
) -> Result<Json<User>, ApiError> {
    let user = state.user_service.get_user(user_id).await?;
    Ok(Json(user))
}

/// GET /api/users/validate - Confirms the bearer token is usable
async fn validate(AuthenticatedUser(user_id): AuthenticatedUser) -> Json<ValidateResponse> {
    Json(ValidateResponse {
        valid: true,
        user_id,
    })
}
