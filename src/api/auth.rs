use axum::{
    Extension, Json,
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;
use tokio::task;

use super::{
    ApiError, ApiResponse, AppState, LoginRequest, LoginResponse, RegisterRequest,
    RegisterResponse, VerifyResponse,
};
use crate::auth::password;
use crate::db::NewUser;

/// Authenticated identity extracted from a verified bearer token.
/// Carries exactly what the token claims; activity is not re-checked here.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub username: String,
    pub is_admin: bool,
}

// ============================================================================
// Middleware
// ============================================================================

/// Authorization gate for `/verify` and `/actions/*`.
///
/// Verifies the `Authorization: Bearer` token signature and expiry, then
/// hands the subject to the handler via request extensions. Account
/// existence and activity are deliberately NOT re-checked per request;
/// operations that need that guarantee re-read the account themselves.
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_bearer_token(&headers).ok_or_else(ApiError::unauthenticated)?;

    let claims = state
        .tokens
        .verify(token)
        .map_err(|_| ApiError::unauthenticated())?;

    tracing::Span::current().record("user_id", &claims.sub);

    request.extensions_mut().insert(AuthUser {
        username: claims.sub,
        is_admin: claims.admin,
    });

    Ok(next.run(request).await)
}

fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|auth| auth.strip_prefix("Bearer "))
        .map(str::trim)
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /register
/// Create an account. Username and email must each be unique.
pub async fn register(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<RegisterRequest>,
) -> Result<Json<ApiResponse<RegisterResponse>>, ApiError> {
    if payload.username.is_empty() {
        return Err(ApiError::validation("Username is required"));
    }
    if payload.email.is_empty() {
        return Err(ApiError::validation("Email is required"));
    }
    if payload.password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    // Argon2 is CPU-intensive, keep it off the async runtime
    let security = state.config.security.clone();
    let plaintext = payload.password;
    let password_hash = task::spawn_blocking(move || password::hash_password(&plaintext, &security))
        .await
        .map_err(|e| ApiError::internal(format!("Password hashing task panicked: {e}")))?
        .map_err(|e| ApiError::internal(format!("Failed to hash password: {e}")))?;

    let user = state
        .store
        .create_user(NewUser {
            username: payload.username,
            email: payload.email,
            password_hash,
        })
        .await?;

    tracing::info!("Registered user: {}", user.username);

    Ok(Json(ApiResponse::success(RegisterResponse {
        user_id: user.id,
        username: user.username,
    })))
}

/// POST /login
/// Verify credentials and issue a session token.
///
/// `last_login` is written before the token is issued, so a storage fault
/// aborts the login cleanly instead of reporting a degraded success.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ApiResponse<LoginResponse>>, ApiError> {
    let found = state.store.find_user_with_password(&payload.username).await?;

    let Some((user, stored_hash)) = found else {
        metrics::counter!("auth_login_attempts_total", "status" => "failed").increment(1);
        return Err(ApiError::Unauthorized(
            "Invalid username or password".to_string(),
        ));
    };

    let plaintext = payload.password;
    let is_valid = task::spawn_blocking(move || password::verify_password(&plaintext, &stored_hash))
        .await
        .map_err(|e| ApiError::internal(format!("Password verification task panicked: {e}")))?;

    if !is_valid {
        metrics::counter!("auth_login_attempts_total", "status" => "failed").increment(1);
        return Err(ApiError::Unauthorized(
            "Invalid username or password".to_string(),
        ));
    }

    if !user.is_active {
        metrics::counter!("auth_login_attempts_total", "status" => "inactive").increment(1);
        return Err(ApiError::Unauthorized("Account is deactivated".to_string()));
    }

    state
        .store
        .record_login(&user.username, &chrono::Utc::now().to_rfc3339())
        .await?;

    let access_token = state
        .tokens
        .issue(&user.username, user.is_admin)
        .map_err(|e| ApiError::internal(format!("Failed to issue token: {e}")))?;

    metrics::counter!("auth_login_attempts_total", "status" => "success").increment(1);
    tracing::info!("User logged in: {}", user.username);

    Ok(Json(ApiResponse::success(LoginResponse {
        access_token,
        token_type: "bearer".to_string(),
        is_admin: user.is_admin,
    })))
}

/// GET /verify
/// Confirm the presented token still maps to an existing, active account.
/// Unlike the record endpoints, this re-reads the account on every call.
pub async fn verify(
    State(state): State<Arc<AppState>>,
    Extension(auth_user): Extension<AuthUser>,
) -> Result<Json<ApiResponse<VerifyResponse>>, ApiError> {
    let user = state
        .store
        .find_user(&auth_user.username)
        .await?
        .filter(|u| u.is_active)
        .ok_or_else(ApiError::unauthenticated)?;

    Ok(Json(ApiResponse::success(VerifyResponse {
        username: user.username,
        is_admin: user.is_admin,
        email: user.email,
    })))
}
