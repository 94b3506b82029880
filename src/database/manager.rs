use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Postgres};
use thiserror::Error;
use tracing::{debug, info};

use super::router::{SessionCheck, TenantConnectionRouter};
use crate::config::DatabaseConfig;

/// Errors from DatabaseManager
#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Missing configuration: {0}")]
    ConfigMissing(&'static str),

    #[error("Invalid database URL")]
    InvalidDatabaseUrl,

    #[error("Invalid schema name: {0}")]
    InvalidSchemaName(String),

    #[error(transparent)]
    Sqlx(#[from] sqlx::Error),
}

/// Postgres identifiers longer than this are silently truncated by the server.
const MAX_IDENTIFIER_LEN: usize = 63;

/// Single shared connection pool with tenant-aware checkout.
pub struct DatabaseManager {
    pool: PgPool,
    router: TenantConnectionRouter,
}

impl DatabaseManager {
    /// Build the pool without connecting; connections open on first use.
    pub fn connect_lazy(
        config: &DatabaseConfig,
        router: TenantConnectionRouter,
    ) -> Result<Self, DatabaseError> {
        let url = config
            .url
            .as_deref()
            .ok_or(DatabaseError::ConfigMissing("DATABASE_URL"))?;
        url::Url::parse(url).map_err(|_| DatabaseError::InvalidDatabaseUrl)?;

        let pool = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(Duration::from_secs(config.connection_timeout))
            .connect_lazy(url)?;

        info!(default_schema = %router.default_schema(), "Created shared database pool");
        Ok(Self { pool, router })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub fn router(&self) -> &TenantConnectionRouter {
        &self.router
    }

    /// Check out a connection pointed at the current request's schema.
    pub async fn acquire(&self) -> Result<PoolConnection<Postgres>, DatabaseError> {
        let schema = self.router.current_schema();
        self.acquire_for(&schema).await
    }

    /// Check out a connection pinned to `schema`, switching it unless the pooled
    /// session's search path is already exactly that schema.
    pub async fn acquire_for(&self, schema: &str) -> Result<PoolConnection<Postgres>, DatabaseError> {
        if !Self::is_valid_schema_name(schema) {
            return Err(DatabaseError::InvalidSchemaName(schema.to_string()));
        }

        let mut conn = self.pool.acquire().await?;
        let active: Option<String> = sqlx::query_scalar("SELECT current_setting('search_path')")
            .fetch_one(&mut *conn)
            .await?;

        match self.router.validate_session(active.as_deref(), schema) {
            SessionCheck::Valid => {}
            SessionCheck::Reassign { from, to } => {
                let statement = format!("SET search_path TO {}", Self::quote_identifier(&to));
                sqlx::query(&statement).execute(&mut *conn).await?;
                debug!(from = ?from, to = %to, "Reassigned session schema");
            }
        }

        Ok(conn)
    }

    /// Pings the pool to ensure connectivity
    pub async fn health_check(&self) -> Result<(), DatabaseError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }

    pub async fn close(&self) {
        self.pool.close().await;
        info!("Closed database pool");
    }

    /// Quote SQL identifier to prevent injection
    fn quote_identifier(name: &str) -> String {
        format!("\"{}\"", name.replace('"', "\"\""))
    }

    /// Tenant tokens are opaque, so anything quotable is accepted; only
    /// names Postgres cannot represent are refused.
    fn is_valid_schema_name(name: &str) -> bool {
        !name.is_empty() && name.len() <= MAX_IDENTIFIER_LEN && !name.contains('\0')
    }
}
