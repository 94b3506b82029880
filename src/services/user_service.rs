use std::sync::Arc;

use serde::Deserialize;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::auth::password::{hash_password, verify_password};
use crate::database::models::User;
use crate::database::{DatabaseError, DatabaseManager};
use crate::tenant::{ContextError, RequestContext, TenantIdentity};

const DEFAULT_ROLE: &str = "USER";

#[derive(Debug, Error)]
pub enum UserError {
    #[error(transparent)]
    Tenancy(#[from] ContextError),

    #[error("{0}")]
    InvalidInput(String),

    #[error("Username is already taken")]
    UsernameTaken,

    #[error("Email is already in use")]
    EmailInUse,

    #[error("Password hashing failed: {0}")]
    PasswordHash(String),

    #[error(transparent)]
    Database(#[from] DatabaseError),
}

impl From<sqlx::Error> for UserError {
    fn from(err: sqlx::Error) -> Self {
        UserError::Database(err.into())
    }
}

/// Registration payload. The tenant is never taken from here; it comes from
/// the request context.
#[derive(Debug, Clone, Deserialize)]
pub struct NewUser {
    pub username: String,
    pub email: String,
    pub password: String,
    #[serde(default)]
    pub role: Option<String>,
}

impl NewUser {
    fn validate(&self) -> Result<(), UserError> {
        for (field, value) in [
            ("username", &self.username),
            ("email", &self.email),
            ("password", &self.password),
        ] {
            if value.trim().is_empty() {
                return Err(UserError::InvalidInput(format!("Field '{}' is required", field)));
            }
        }
        Ok(())
    }

    /// Attach the registration to `tenant`, the only source of a user's tenant id.
    fn for_tenant(self, tenant: &TenantIdentity) -> PendingUser {
        let role = self
            .role
            .as_deref()
            .map(str::trim)
            .filter(|role| !role.is_empty())
            .unwrap_or(DEFAULT_ROLE)
            .to_string();
        PendingUser {
            username: self.username,
            email: self.email,
            password: self.password,
            tenant_id: tenant.token().to_string(),
            role,
        }
    }
}

/// A validated registration bound to its tenant, password still raw.
#[derive(Debug)]
struct PendingUser {
    username: String,
    email: String,
    password: String,
    tenant_id: String,
    role: String,
}

/// User accounts stored in each tenant's schema.
///
/// Every query runs on a connection checked out through the tenant router, so
/// reads and writes land in the schema of the request being served.
pub struct UserService {
    database: Arc<DatabaseManager>,
}

impl UserService {
    pub fn new(database: Arc<DatabaseManager>) -> Self {
        Self { database }
    }

    /// Register a user in the request's tenant. Registration needs a bound tenant.
    pub async fn register_user(&self, context: &RequestContext, new_user: NewUser) -> Result<User, UserError> {
        let identity = context.require()?;
        new_user.validate()?;
        let new_user = new_user.for_tenant(&identity);

        let mut conn = self.database.acquire().await?;

        let username_taken: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE username = $1)")
            .bind(&new_user.username)
            .fetch_one(&mut *conn)
            .await?;
        if username_taken {
            return Err(UserError::UsernameTaken);
        }

        let email_in_use: bool = sqlx::query_scalar("SELECT EXISTS(SELECT 1 FROM users WHERE email = $1)")
            .bind(&new_user.email)
            .fetch_one(&mut *conn)
            .await?;
        if email_in_use {
            return Err(UserError::EmailInUse);
        }

        let user = sqlx::query_as::<_, User>(
            r#"
            INSERT INTO users (id, username, email, password, tenant_id, role, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, NOW())
            RETURNING id, username, email, password, tenant_id, role, created_at
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(&new_user.username)
        .bind(&new_user.email)
        .bind(hash_off_runtime(new_user.password).await?)
        .bind(&new_user.tenant_id)
        .bind(&new_user.role)
        .fetch_one(&mut *conn)
        .await?;

        info!(tenant = %identity.token(), username = %user.username, "Registered user");
        Ok(user)
    }

    pub async fn find_by_username(&self, username: &str) -> Result<Option<User>, UserError> {
        let mut conn = self.database.acquire().await?;
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, password, tenant_id, role, created_at FROM users WHERE username = $1",
        )
        .bind(username)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(user)
    }

    pub async fn find_by_email(&self, email: &str) -> Result<Option<User>, UserError> {
        let mut conn = self.database.acquire().await?;
        let user = sqlx::query_as::<_, User>(
            "SELECT id, username, email, password, tenant_id, role, created_at FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_optional(&mut *conn)
        .await?;
        Ok(user)
    }

    /// The matching user when `raw_password` is correct.
    pub async fn check_credentials(&self, username: &str, raw_password: &str) -> Result<Option<User>, UserError> {
        let Some(user) = self.find_by_username(username).await? else {
            return Ok(None);
        };
        let raw_password = raw_password.to_string();
        let stored = user.password.clone();
        let matches = tokio::task::spawn_blocking(move || verify_password(&raw_password, &stored))
            .await
            .map_err(|e| UserError::PasswordHash(e.to_string()))?;
        Ok(matches.then_some(user))
    }
}

/// Runs bcrypt on the blocking pool.
async fn hash_off_runtime(raw: String) -> Result<String, UserError> {
    tokio::task::spawn_blocking(move || hash_password(&raw))
        .await
        .map_err(|e| UserError::PasswordHash(e.to_string()))?
        .map_err(|e| UserError::PasswordHash(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::database::TenantConnectionRouter;
    use serde_json::json;

    fn service() -> UserService {
        let config = DatabaseConfig {
            url: Some("postgres://tenancy@127.0.0.1:1/tenancy".to_string()),
            max_connections: 1,
            connection_timeout: 1,
        };
        let database = DatabaseManager::connect_lazy(&config, TenantConnectionRouter::default()).unwrap();
        UserService::new(Arc::new(database))
    }

    fn new_user() -> NewUser {
        NewUser {
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            password: "s3cret".to_string(),
            role: None,
        }
    }

    #[tokio::test]
    async fn registration_requires_a_tenant() {
        let result = service().register_user(&RequestContext::new(), new_user()).await;
        assert!(matches!(result, Err(UserError::Tenancy(ContextError::TenancyRequired))));
    }

    #[tokio::test]
    async fn registration_rejects_blank_fields() {
        let context = RequestContext::new();
        context.bind(TenantIdentity::new("acme").unwrap()).unwrap();
        let mut user = new_user();
        user.password = "  ".to_string();

        let result = service().register_user(&context, user).await;
        match result {
            Err(UserError::InvalidInput(msg)) => assert_eq!(msg, "Field 'password' is required"),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn tenant_comes_from_the_request_not_the_payload() {
        let payload: NewUser = serde_json::from_value(json!({
            "username": "mallory",
            "email": "mallory@example.com",
            "password": "s3cret",
            "tenant_id": "widget",
        }))
        .unwrap();

        let pending = payload.for_tenant(&TenantIdentity::new("acme").unwrap());

        assert_eq!(pending.tenant_id, "acme");
        assert_eq!(pending.role, "USER");
    }

    #[test]
    fn requested_role_is_kept() {
        let mut user = new_user();
        user.role = Some(" ADMIN ".to_string());
        let pending = user.for_tenant(&TenantIdentity::new("acme").unwrap());
        assert_eq!(pending.role, "ADMIN");
    }
}
