use std::sync::Arc;

use anyhow::Context;
use axum::{
    middleware,
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::{cors::CorsLayer, trace::TraceLayer};

use crate::auth::JwtTokenProvider;
use crate::config::AppConfig;
use crate::database::{DatabaseManager, TenantConnectionRouter};
use crate::handlers;
use crate::middleware::{jwt_auth_middleware, tenant_context_middleware};
use crate::resilience::RetryPolicy;
use crate::services::{ExternalApiService, UserService};
use crate::tenant::{TenantInterceptor, TenantResolver};

/// Shared application state handed to every handler and middleware.
#[derive(Clone)]
pub struct AppState {
    pub interceptor: Arc<TenantInterceptor>,
    pub database: Arc<DatabaseManager>,
    pub jwt: Arc<JwtTokenProvider>,
    pub users: Arc<UserService>,
    pub external: Arc<ExternalApiService>,
}

impl AppState {
    pub fn from_config(config: &AppConfig) -> anyhow::Result<Self> {
        let jwt = Arc::new(JwtTokenProvider::new(&config.security).context("Failed to configure JWT provider")?);

        let resolver = TenantResolver::new(&config.multitenancy, jwt.clone())
            .context("Failed to configure tenant resolver")?;
        let interceptor = Arc::new(TenantInterceptor::new(Arc::new(resolver)));

        let router = TenantConnectionRouter::new(config.multitenancy.default_schema.clone());
        let database = Arc::new(
            DatabaseManager::connect_lazy(&config.database, router).context("Failed to configure database")?,
        );

        let users = Arc::new(UserService::new(database.clone()));
        let external = Arc::new(
            ExternalApiService::new(&config.external, RetryPolicy::from_config(&config.retry))
                .context("Failed to configure external API client")?,
        );

        Ok(Self {
            interceptor,
            database,
            jwt,
            users,
            external,
        })
    }
}

pub fn app(state: AppState) -> Router {
    Router::new()
        // Public
        .route("/", get(handlers::root))
        .route("/health", get(handlers::health))
        .merge(auth_routes())
        .merge(external_routes())
        // Protected
        .merge(profile_routes(state.clone()))
        .fallback(handlers::not_found)
        // Tenant context wraps every request, including fallbacks
        .layer(middleware::from_fn_with_state(state.clone(), tenant_context_middleware))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(CorsLayer::permissive()),
        )
        .with_state(state)
}

fn auth_routes() -> Router<AppState> {
    Router::new()
        .route("/auth/register", post(handlers::auth::register_post))
        .route("/auth/login", post(handlers::auth::login_post))
}

fn external_routes() -> Router<AppState> {
    Router::new().route("/external/data", get(handlers::external::external_data))
}

fn profile_routes(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/profile/me", get(handlers::profile::profile_me))
        .route_layer(middleware::from_fn_with_state(state, jwt_auth_middleware))
}
