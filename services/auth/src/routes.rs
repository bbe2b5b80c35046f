//! Authentication service routes

use axum::{
    Json, Router,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use rand::Rng;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::{
    AppState,
    jwt::TokenType,
    models::{LoginCredentials, NewProfile, ProfileResponse},
    validation,
};

/// How long a password-reset token stays valid, in seconds
const PASSWORD_RESET_TTL: u64 = 3600;

/// Response for token generation
#[derive(Serialize)]
pub struct TokenResponse {
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: u64,
}

/// Request for token refresh and logout
#[derive(Deserialize)]
pub struct RefreshTokenRequest {
    pub refresh_token: String,
}

/// Request for password reset initiation
#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    pub email: String,
}

/// Request for completing a password reset
#[derive(Deserialize)]
pub struct ResetPasswordRequest {
    pub token: String,
    pub password: String,
}

/// Create the router for the authentication service
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/auth/signup", post(signup))
        .route("/auth/login", post(login))
        .route("/auth/refresh", post(refresh_token))
        .route("/auth/logout", post(logout))
        .route("/auth/forgot-password", post(forgot_password))
        .route("/auth/reset-password", post(reset_password))
        .with_state(state)
}

/// Health check endpoint
pub async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "service": "auth-service"
    }))
}

/// Create a new account
pub async fn signup(
    State(state): State<AppState>,
    Json(payload): Json<NewProfile>,
) -> Result<impl IntoResponse, AuthError> {
    validation::validate_email(&payload.email).map_err(AuthError::BadRequest)?;
    validation::validate_full_name(&payload.full_name).map_err(AuthError::BadRequest)?;
    validation::validate_password(&payload.password).map_err(AuthError::BadRequest)?;

    let existing = state
        .profile_repository
        .find_by_email(&payload.email)
        .await
        .map_err(|e| {
            error!("Failed to look up profile: {}", e);
            AuthError::InternalServerError
        })?;

    if existing.is_some() {
        return Err(AuthError::BadRequest(
            "An account with this email already exists".to_string(),
        ));
    }

    let profile = state
        .profile_repository
        .create(&payload)
        .await
        .map_err(|e| {
            error!("Failed to create profile: {}", e);
            AuthError::InternalServerError
        })?;

    Ok((StatusCode::CREATED, Json(ProfileResponse::from(profile))))
}

/// Credential sign-in
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginCredentials>,
) -> Result<impl IntoResponse, AuthError> {
    info!("Login attempt for: {}", payload.email);

    let allowed = state
        .rate_limiter
        .is_allowed(&payload.email)
        .await
        .map_err(|e| {
            error!("Rate limiter failure: {}", e);
            AuthError::InternalServerError
        })?;

    if !allowed {
        return Err(AuthError::TooManyRequests);
    }

    let profile = state
        .profile_repository
        .find_by_email(&payload.email)
        .await
        .map_err(|e| {
            error!("Failed to look up profile: {}", e);
            AuthError::InternalServerError
        })?
        .ok_or(AuthError::Unauthorized)?;

    let verified = state
        .profile_repository
        .verify_password(&profile, &payload.password)
        .await
        .map_err(|e| {
            error!("Failed to verify password: {}", e);
            AuthError::InternalServerError
        })?;

    if !verified {
        return Err(AuthError::Unauthorized);
    }

    let access_token = state
        .jwt_service
        .generate_access_token(profile.id)
        .map_err(|e| {
            error!("Failed to generate access token: {}", e);
            AuthError::InternalServerError
        })?;

    let refresh_token = state
        .jwt_service
        .generate_refresh_token(profile.id)
        .map_err(|e| {
            error!("Failed to generate refresh token: {}", e);
            AuthError::InternalServerError
        })?;

    state
        .session_manager
        .create_session(profile.id, &refresh_token)
        .await
        .map_err(|e| {
            error!("Failed to store session: {}", e);
            AuthError::InternalServerError
        })?;

    state.rate_limiter.reset(&payload.email).await;

    let response = TokenResponse {
        access_token,
        refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt_service.access_token_expiry(),
    };

    Ok((StatusCode::OK, Json(response)))
}

/// Refresh token endpoint
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let claims = state
        .jwt_service
        .validate_token(&payload.refresh_token)
        .map_err(|_| AuthError::Unauthorized)?;

    if claims.token_type != TokenType::Refresh {
        return Err(AuthError::Unauthorized);
    }

    let is_blacklisted = state
        .jwt_service
        .is_token_blacklisted(&state.redis_pool, &payload.refresh_token)
        .await
        .map_err(|e| {
            error!("Failed to check token blacklist: {}", e);
            AuthError::InternalServerError
        })?;

    if is_blacklisted {
        return Err(AuthError::Unauthorized);
    }

    let session_valid = state
        .session_manager
        .is_session_valid(claims.sub, &payload.refresh_token)
        .await
        .map_err(|e| {
            error!("Failed to check session: {}", e);
            AuthError::InternalServerError
        })?;

    if !session_valid {
        return Err(AuthError::Unauthorized);
    }

    let profile = state
        .profile_repository
        .find_by_id(claims.sub)
        .await
        .map_err(|e| {
            error!("Failed to look up profile: {}", e);
            AuthError::InternalServerError
        })?
        .ok_or(AuthError::Unauthorized)?;

    let access_token = state
        .jwt_service
        .generate_access_token(profile.id)
        .map_err(|e| {
            error!("Failed to generate access token: {}", e);
            AuthError::InternalServerError
        })?;

    let new_refresh_token = state
        .jwt_service
        .rotate_refresh_token(&state.redis_pool, profile.id, &payload.refresh_token)
        .await
        .map_err(|e| {
            error!("Failed to rotate refresh token: {}", e);
            AuthError::InternalServerError
        })?;

    state
        .session_manager
        .update_session(profile.id, &new_refresh_token)
        .await
        .map_err(|e| {
            error!("Failed to update session: {}", e);
            AuthError::InternalServerError
        })?;

    let response = TokenResponse {
        access_token,
        refresh_token: new_refresh_token,
        token_type: "Bearer".to_string(),
        expires_in: state.jwt_service.access_token_expiry(),
    };

    Ok((StatusCode::OK, Json(response)))
}

/// Logout endpoint
pub async fn logout(
    State(state): State<AppState>,
    Json(payload): Json<RefreshTokenRequest>,
) -> Result<impl IntoResponse, AuthError> {
    info!("Logout request");

    let claims = state
        .jwt_service
        .validate_token(&payload.refresh_token)
        .map_err(|_| AuthError::Unauthorized)?;

    if claims.token_type != TokenType::Refresh {
        return Err(AuthError::Unauthorized);
    }

    let now = std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map_err(|e| {
            error!("Failed to get current time: {}", e);
            AuthError::InternalServerError
        })?
        .as_secs();

    let expiry = claims.exp.saturating_sub(now);
    state
        .jwt_service
        .blacklist_token(&state.redis_pool, &payload.refresh_token, expiry)
        .await
        .map_err(|e| {
            error!("Failed to blacklist token: {}", e);
            AuthError::InternalServerError
        })?;

    state
        .session_manager
        .delete_session(claims.sub)
        .await
        .map_err(|e| {
            error!("Failed to delete session: {}", e);
            AuthError::InternalServerError
        })?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({"message": "Logged out successfully"})),
    ))
}

/// Start a password reset
///
/// Always responds with the same message so the endpoint cannot be used
/// to probe which emails are registered.
pub async fn forgot_password(
    State(state): State<AppState>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    let profile = state
        .profile_repository
        .find_by_email(&payload.email)
        .await
        .map_err(|e| {
            error!("Failed to look up profile: {}", e);
            AuthError::InternalServerError
        })?;

    if let Some(profile) = profile {
        let token: String = rand::thread_rng()
            .sample_iter(&rand::distributions::Alphanumeric)
            .take(48)
            .map(char::from)
            .collect();

        let key = format!("password_reset:{}", token);
        state
            .redis_pool
            .set(&key, &profile.id.to_string(), Some(PASSWORD_RESET_TTL))
            .await
            .map_err(|e| {
                error!("Failed to store reset token: {}", e);
                AuthError::InternalServerError
            })?;

        // Delivery happens out of band; the token is logged for operators
        // until a mail integration exists.
        info!("Password reset token issued for {}", profile.id);
    }

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({
            "message": "If the email is registered, a reset link has been sent"
        })),
    ))
}

/// Complete a password reset
pub async fn reset_password(
    State(state): State<AppState>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<impl IntoResponse, AuthError> {
    validation::validate_password(&payload.password).map_err(AuthError::BadRequest)?;

    let key = format!("password_reset:{}", payload.token);
    let user_id = state
        .redis_pool
        .get(&key)
        .await
        .map_err(|e| {
            error!("Failed to read reset token: {}", e);
            AuthError::InternalServerError
        })?
        .ok_or(AuthError::BadRequest(
            "Invalid or expired reset token".to_string(),
        ))?;

    let user_id: uuid::Uuid = user_id
        .parse()
        .map_err(|_| AuthError::InternalServerError)?;

    state
        .profile_repository
        .update_password(user_id, &payload.password)
        .await
        .map_err(|e| {
            error!("Failed to update password: {}", e);
            AuthError::InternalServerError
        })?;

    // The token is single use, and any live session must sign in again.
    state.redis_pool.delete(&key).await.map_err(|e| {
        error!("Failed to delete reset token: {}", e);
        AuthError::InternalServerError
    })?;
    state
        .session_manager
        .delete_session(user_id)
        .await
        .map_err(|e| {
            error!("Failed to delete session: {}", e);
            AuthError::InternalServerError
        })?;

    Ok((
        StatusCode::OK,
        Json(serde_json::json!({"message": "Password updated successfully"})),
    ))
}

/// Custom error type for authentication errors
#[derive(Debug)]
pub enum AuthError {
    Unauthorized,
    BadRequest(String),
    TooManyRequests,
    InternalServerError,
}

impl IntoResponse for AuthError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            AuthError::Unauthorized => (StatusCode::UNAUTHORIZED, "Unauthorized".to_string()),
            AuthError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            AuthError::TooManyRequests => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many attempts, try again later".to_string(),
            ),
            AuthError::InternalServerError => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        let body = Json(serde_json::json!({
            "error": error_message,
        }));

        (status, body).into_response()
    }
}
