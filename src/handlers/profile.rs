// handlers/profile.rs - GET /profile/me handler

use axum::Extension;
use serde::Serialize;
use uuid::Uuid;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::middleware::{ApiResponse, ApiResult};
use crate::tenant::RequestContext;

#[derive(Debug, Serialize)]
pub struct ProfileResponse {
    pub user_id: Uuid,
    pub tenant_id: String,
    pub username: String,
    pub email: String,
    pub role: String,
}

/// GET /profile/me - the authenticated user, provided they belong to the
/// tenant this request was resolved to
pub async fn profile_me(
    Extension(user): Extension<AuthUser>,
    Extension(context): Extension<RequestContext>,
) -> ApiResult<ProfileResponse> {
    if let Some(identity) = context.current() {
        if identity.token() != user.tenant_id {
            tracing::warn!(
                user = %user.username,
                user_tenant = %user.tenant_id,
                request_tenant = %identity.token(),
                "Cross-tenant profile access denied"
            );
            return Err(ApiError::forbidden("User does not belong to the current tenant"));
        }
    }

    Ok(ApiResponse::success(ProfileResponse {
        user_id: user.user_id,
        tenant_id: user.tenant_id,
        username: user.username,
        email: user.email,
        role: user.role,
    }))
}
