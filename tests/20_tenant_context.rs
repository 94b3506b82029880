mod common;

use std::panic::AssertUnwindSafe;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use axum::body::Body;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::get;
use axum::{middleware, Extension, Json, Router};
use futures::FutureExt;
use serde_json::{json, Value};
use tower::ServiceExt;

use tenancy_api::error::ApiError;
use tenancy_api::middleware::tenant_context_middleware;
use tenancy_api::tenant::{RequestContext, ResolutionMode};
use tenancy_api::AppState;

type Captured = Arc<Mutex<Option<RequestContext>>>;

/// Reports what code deep inside the request sees, without any parameters
/// threaded through.
async fn whoami(State(state): State<AppState>) -> Json<Value> {
    let tenant = RequestContext::current_identity().map(|identity| identity.token().to_string());
    let schema = state.database.router().current_schema();
    Json(json!({ "tenant": tenant, "schema": schema }))
}

async fn slow_whoami(state: State<AppState>) -> Json<Value> {
    let first = RequestContext::current_identity().map(|identity| identity.token().to_string());
    tokio::time::sleep(Duration::from_millis(20)).await;
    let Json(mut body) = whoami(state).await;
    body["first"] = json!(first);
    Json(body)
}

async fn fail(
    Extension(captured): Extension<Captured>,
    Extension(context): Extension<RequestContext>,
) -> Result<Json<Value>, ApiError> {
    *captured.lock().unwrap() = Some(context);
    Err(ApiError::bad_request("business failure"))
}

async fn explode(
    Extension(captured): Extension<Captured>,
    Extension(context): Extension<RequestContext>,
) -> Json<Value> {
    *captured.lock().unwrap() = Some(context);
    panic!("handler fault");
}

async fn ok(
    Extension(captured): Extension<Captured>,
    Extension(context): Extension<RequestContext>,
) -> Json<Value> {
    *captured.lock().unwrap() = Some(context);
    Json(json!({ "ok": true }))
}

fn context_app(state: AppState, captured: Captured) -> Router {
    Router::new()
        .route("/whoami", get(whoami))
        .route("/slow", get(slow_whoami))
        .route("/ok", get(ok))
        .route("/fail", get(fail))
        .route("/explode", get(explode))
        .layer(Extension(captured))
        .layer(middleware::from_fn_with_state(state.clone(), tenant_context_middleware))
        .with_state(state)
}

fn header_app() -> (Router, Captured) {
    let captured: Captured = Arc::new(Mutex::new(None));
    (context_app(common::test_state(ResolutionMode::Header), captured.clone()), captured)
}

fn taken(captured: &Captured) -> RequestContext {
    captured.lock().unwrap().take().expect("handler captured its context")
}

#[tokio::test]
async fn header_mode_binds_trimmed_tenant_and_routes_schema() -> Result<()> {
    let (app, _) = header_app();

    let request = common::get("/whoami").header("X-Tenant-ID", "  acme ").body(Body::empty())?;
    let (status, body) = common::send(&app, request).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant"], "acme");
    assert_eq!(body["schema"], "acme");
    Ok(())
}

#[tokio::test]
async fn missing_or_blank_header_uses_default_schema() -> Result<()> {
    let (app, _) = header_app();

    let (_, body) = common::send(&app, common::get("/whoami").body(Body::empty())?).await?;
    assert_eq!(body["tenant"], Value::Null);
    assert_eq!(body["schema"], "public");

    let blank = common::get("/whoami").header("X-Tenant-ID", "   ").body(Body::empty())?;
    let (_, body) = common::send(&app, blank).await?;
    assert_eq!(body["tenant"], Value::Null);
    assert_eq!(body["schema"], "public");
    Ok(())
}

#[tokio::test]
async fn subdomain_mode_uses_first_host_label() -> Result<()> {
    let app = context_app(common::test_state(ResolutionMode::Subdomain), Arc::default());

    let request = common::get("/whoami").header("Host", "widget.example.com").body(Body::empty())?;
    let (_, body) = common::send(&app, request).await?;
    assert_eq!(body["tenant"], "widget");

    let bare = common::get("/whoami").header("Host", "localhost:3000").body(Body::empty())?;
    let (_, body) = common::send(&app, bare).await?;
    assert_eq!(body["tenant"], Value::Null);
    assert_eq!(body["schema"], "public");
    Ok(())
}

#[tokio::test]
async fn token_mode_reads_tenant_claim() -> Result<()> {
    let state = common::test_state(ResolutionMode::Token);
    let token = common::token_for(&state, "alice", "acme");
    let app = context_app(state, Arc::default());

    let request = common::get("/whoami")
        .header("Authorization", format!("Bearer {}", token))
        .body(Body::empty())?;
    let (status, body) = common::send(&app, request).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant"], "acme");
    Ok(())
}

#[tokio::test]
async fn token_mode_malformed_token_is_not_an_error() -> Result<()> {
    let app = context_app(common::test_state(ResolutionMode::Token), Arc::default());

    let request = common::get("/whoami")
        .header("Authorization", "Bearer not.a.jwt")
        .body(Body::empty())?;
    let (status, body) = common::send(&app, request).await?;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["tenant"], Value::Null);
    assert_eq!(body["schema"], "public");
    Ok(())
}

#[tokio::test]
async fn context_is_cleared_after_success() -> Result<()> {
    let (app, captured) = header_app();

    let request = common::get("/ok").header("X-Tenant-ID", "acme").body(Body::empty())?;
    let (status, _) = common::send(&app, request).await?;

    assert_eq!(status, StatusCode::OK);
    let context = taken(&captured);
    assert!(context.current().is_none());
    assert!(context.cancellation().is_cancelled());
    Ok(())
}

#[tokio::test]
async fn context_is_cleared_after_error_response() -> Result<()> {
    let (app, captured) = header_app();

    let request = common::get("/fail").header("X-Tenant-ID", "acme").body(Body::empty())?;
    let (status, body) = common::send(&app, request).await?;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["message"], "business failure");
    assert!(taken(&captured).current().is_none());
    Ok(())
}

#[tokio::test]
async fn context_is_cleared_after_handler_panic() -> Result<()> {
    let (app, captured) = header_app();

    let request = common::get("/explode").header("X-Tenant-ID", "acme").body(Body::empty())?;
    let outcome = AssertUnwindSafe(app.clone().oneshot(request)).catch_unwind().await;

    assert!(outcome.is_err());
    assert!(taken(&captured).current().is_none());
    Ok(())
}

#[tokio::test]
async fn next_request_does_not_inherit_previous_tenant() -> Result<()> {
    let (app, _) = header_app();

    let first = common::get("/whoami").header("X-Tenant-ID", "acme").body(Body::empty())?;
    let (_, body) = common::send(&app, first).await?;
    assert_eq!(body["tenant"], "acme");

    let second = common::get("/whoami").body(Body::empty())?;
    let (_, body) = common::send(&app, second).await?;
    assert_eq!(body["tenant"], Value::Null);
    assert_eq!(body["schema"], "public");
    Ok(())
}

#[tokio::test(flavor = "current_thread")]
async fn interleaved_requests_on_one_thread_stay_isolated() -> Result<()> {
    let (app, _) = header_app();

    let acme = common::get("/slow").header("X-Tenant-ID", "acme").body(Body::empty())?;
    let widget = common::get("/slow").header("X-Tenant-ID", "widget").body(Body::empty())?;

    let (acme, widget) = tokio::join!(common::send(&app, acme), common::send(&app, widget));
    let (_, acme) = acme?;
    let (_, widget) = widget?;

    assert_eq!(acme["first"], "acme");
    assert_eq!(acme["tenant"], "acme");
    assert_eq!(acme["schema"], "acme");
    assert_eq!(widget["first"], "widget");
    assert_eq!(widget["tenant"], "widget");
    assert_eq!(widget["schema"], "widget");
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_requests_across_workers_stay_isolated() -> Result<()> {
    let (app, _) = header_app();

    let mut handles = Vec::new();
    for i in 0..32 {
        let tenant = if i % 2 == 0 { "acme" } else { "widget" };
        let app = app.clone();
        handles.push(tokio::spawn(async move {
            let request = common::get("/slow").header("X-Tenant-ID", tenant).body(Body::empty())?;
            let (_, body) = common::send(&app, request).await?;
            anyhow::Ok((tenant, body))
        }));
    }

    for handle in handles {
        let (tenant, body) = handle.await??;
        assert_eq!(body["first"], tenant);
        assert_eq!(body["tenant"], tenant);
        assert_eq!(body["schema"], tenant);
    }
    Ok(())
}
