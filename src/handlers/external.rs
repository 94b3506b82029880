// handlers/external.rs - GET /external/data handler

use axum::{
    extract::{Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
};
use serde::Deserialize;

use crate::app::AppState;
use crate::error::ApiError;
use crate::resilience::ResilientCaller;

#[derive(Debug, Deserialize)]
pub struct ExternalQuery {
    pub url: Option<String>,
}

/// GET /external/data?url= - relay an upstream API response
///
/// The fetch is retried per the configured policy and abandoned as soon as
/// this request is cancelled.
pub async fn external_data(
    State(state): State<AppState>,
    Query(query): Query<ExternalQuery>,
) -> Result<Response, ApiError> {
    let url = state.external.resolve_url(query.url.as_deref())?;
    tracing::info!(url = %url, "Received request to fetch external data");

    let caller = ResilientCaller::for_current_request();
    let upstream = state.external.fetch(&caller, &url).await?;

    let status = StatusCode::from_u16(upstream.status).unwrap_or(StatusCode::OK);
    let mut response = (status, upstream.body).into_response();
    if let Some(content_type) = upstream.content_type.and_then(|ct| ct.parse::<HeaderValue>().ok()) {
        response.headers_mut().insert(header::CONTENT_TYPE, content_type);
    }
    Ok(response)
}
