use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;
use thiserror::Error;

use crate::tenant::ResolutionMode;

/// Errors raised while interpreting configuration values
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Unknown tenant identifier mode '{0}' (expected header, subdomain or token)")]
    InvalidMode(String),

    #[error("Invalid tenant header name: {0}")]
    InvalidHeader(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub environment: Environment,
    pub multitenancy: MultitenancyConfig,
    pub retry: RetryConfig,
    pub external: ExternalConfig,
    pub database: DatabaseConfig,
    pub security: SecurityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Environment {
    Development,
    Staging,
    Production,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultitenancyConfig {
    pub mode: ResolutionMode,
    pub tenant_header: String,
    pub default_schema: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetryConfig {
    pub max_attempts: u32,
    pub delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalConfig {
    pub default_url: String,
    pub timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: u32,
    pub connection_timeout: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SecurityConfig {
    pub jwt_secret: String,
    pub jwt_expiry_hours: u64,
}

impl Default for MultitenancyConfig {
    fn default() -> Self {
        Self {
            mode: ResolutionMode::Header,
            tenant_header: "X-Tenant-ID".to_string(),
            default_schema: "public".to_string(),
        }
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay_ms: 1000,
        }
    }
}

impl RetryConfig {
    pub fn delay(&self) -> Duration {
        Duration::from_millis(self.delay_ms)
    }
}

impl ExternalConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let environment = match env::var("APP_ENV").as_deref() {
            Ok("production") | Ok("prod") => Environment::Production,
            Ok("staging") | Ok("stage") => Environment::Staging,
            _ => Environment::Development,
        };

        // Set defaults based on environment, then override with specific env vars
        match environment {
            Environment::Production => Self::production(),
            Environment::Staging => Self::staging(),
            Environment::Development => Self::development(),
        }
        .with_env_overrides()
    }

    fn with_env_overrides(mut self) -> Self {
        // Multitenancy overrides
        if let Ok(v) = env::var("MULTITENANCY_TENANT_IDENTIFIER_MODE") {
            match v.parse() {
                Ok(mode) => self.multitenancy.mode = mode,
                Err(e) => tracing::warn!("{}; keeping '{}'", e, self.multitenancy.mode),
            }
        }
        if let Ok(v) = env::var("MULTITENANCY_TENANT_HEADER") {
            if !v.trim().is_empty() {
                self.multitenancy.tenant_header = v.trim().to_string();
            }
        }
        if let Ok(v) = env::var("MULTITENANCY_DEFAULT_SCHEMA") {
            if !v.trim().is_empty() {
                self.multitenancy.default_schema = v.trim().to_string();
            }
        }

        // Retry overrides
        if let Ok(v) = env::var("RETRY_MAX_ATTEMPTS") {
            self.retry.max_attempts = v.parse().unwrap_or(self.retry.max_attempts);
        }
        if let Ok(v) = env::var("RETRY_DELAY_MS") {
            self.retry.delay_ms = v.parse().unwrap_or(self.retry.delay_ms);
        }

        // External API overrides
        if let Ok(v) = env::var("EXTERNAL_API_DEFAULT_URL") {
            self.external.default_url = v;
        }
        if let Ok(v) = env::var("EXTERNAL_API_TIMEOUT_SECS") {
            self.external.timeout_secs = v.parse().unwrap_or(self.external.timeout_secs);
        }

        // Database overrides
        if let Ok(v) = env::var("DATABASE_URL") {
            self.database.url = Some(v);
        }
        if let Ok(v) = env::var("DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = v.parse().unwrap_or(self.database.max_connections);
        }
        if let Ok(v) = env::var("DATABASE_CONNECTION_TIMEOUT") {
            self.database.connection_timeout = v.parse().unwrap_or(self.database.connection_timeout);
        }

        // Security overrides
        if let Ok(v) = env::var("JWT_SECRET") {
            self.security.jwt_secret = v;
        }
        if let Ok(v) = env::var("SECURITY_JWT_EXPIRY_HOURS") {
            self.security.jwt_expiry_hours = v.parse().unwrap_or(self.security.jwt_expiry_hours);
        }

        self
    }

    pub fn development() -> Self {
        Self {
            environment: Environment::Development,
            multitenancy: MultitenancyConfig::default(),
            retry: RetryConfig::default(),
            external: ExternalConfig {
                default_url: "https://jsonplaceholder.typicode.com/posts".to_string(),
                timeout_secs: 10,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 10,
                connection_timeout: 30,
            },
            security: SecurityConfig {
                jwt_secret: "development-secret-change-me".to_string(),
                jwt_expiry_hours: 24,
            },
        }
    }

    pub fn staging() -> Self {
        Self {
            environment: Environment::Staging,
            multitenancy: MultitenancyConfig::default(),
            retry: RetryConfig::default(),
            external: ExternalConfig {
                default_url: "https://jsonplaceholder.typicode.com/posts".to_string(),
                timeout_secs: 10,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 20,
                connection_timeout: 10,
            },
            security: SecurityConfig {
                jwt_secret: String::new(), // must come from JWT_SECRET
                jwt_expiry_hours: 24,
            },
        }
    }

    pub fn production() -> Self {
        Self {
            environment: Environment::Production,
            multitenancy: MultitenancyConfig::default(),
            retry: RetryConfig::default(),
            external: ExternalConfig {
                default_url: "https://jsonplaceholder.typicode.com/posts".to_string(),
                timeout_secs: 5,
            },
            database: DatabaseConfig {
                url: None,
                max_connections: 50,
                connection_timeout: 5,
            },
            security: SecurityConfig {
                jwt_secret: String::new(), // must come from JWT_SECRET
                jwt_expiry_hours: 4,
            },
        }
    }
}

// Global singleton config - initialized once at startup
pub static CONFIG: Lazy<AppConfig> = Lazy::new(AppConfig::from_env);

// Convenience function for accessing config
pub fn config() -> &'static AppConfig {
    &CONFIG
}
