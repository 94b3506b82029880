// handlers/auth/register.rs - POST /auth/register handler

use axum::{extract::State, http::HeaderMap, Extension, Json};
use serde::Serialize;
use uuid::Uuid;

use crate::app::AppState;
use crate::middleware::{ApiResponse, ApiResult};
use crate::services::NewUser;
use crate::tenant::RequestContext;

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub message: &'static str,
    pub user_id: Uuid,
    pub username: String,
    pub tenant_id: String,
}

/// POST /auth/register - create a user in the request's tenant
///
/// The tenant comes from the request context. When the configured mode
/// resolved none (a new user has no token yet), the tenant header is read
/// instead. Registering without either is a 400, never a fallback into the
/// default schema.
pub async fn register_post(
    State(state): State<AppState>,
    Extension(context): Extension<RequestContext>,
    headers: HeaderMap,
    Json(payload): Json<NewUser>,
) -> ApiResult<RegisterResponse> {
    if context.current().is_none() {
        if let Some(identity) = state.interceptor.resolver().from_tenant_header(&headers) {
            tracing::debug!(tenant = %identity.token(), "Registration tenant taken from header");
            context.bind(identity)?;
        }
    }

    let user = state.users.register_user(&context, payload).await?;

    Ok(ApiResponse::created(RegisterResponse {
        message: "User registered successfully",
        user_id: user.id,
        username: user.username,
        tenant_id: user.tenant_id,
    }))
}
