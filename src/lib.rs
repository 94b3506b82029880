pub mod app;
pub mod auth;
pub mod config;
pub mod database;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod resilience;
pub mod services;
pub mod tenant;

pub use app::{app, AppState};
