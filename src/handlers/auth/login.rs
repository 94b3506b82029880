// handlers/auth/login.rs - POST /auth/login handler

use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::app::AppState;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: Uuid,
    pub username: String,
    pub email: String,
    pub tenant_id: String,
    pub role: String,
}

/// POST /auth/login - check credentials in the current tenant and issue a JWT
pub async fn login_post(State(state): State<AppState>, Json(payload): Json<LoginRequest>) -> ApiResult<LoginResponse> {
    let user = state
        .users
        .check_credentials(&payload.username, &payload.password)
        .await?
        .ok_or_else(|| {
            tracing::warn!(username = %payload.username, "Rejected login");
            ApiError::unauthorized("Invalid username or password")
        })?;

    let token = state.jwt.generate_token(&user)?;

    Ok(ApiResponse::success(LoginResponse {
        token,
        user_id: user.id,
        username: user.username,
        email: user.email,
        tenant_id: user.tenant_id,
        role: user.role,
    }))
}
