use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::app::AppState;
use crate::tenant::RequestSignals;

/// Binds the request's tenant for the lifetime of the request.
///
/// The per-request context is inserted into extensions for handlers that take
/// `Extension<RequestContext>`, and installed as the task's active context for
/// code further down (services, the connection router).
pub async fn tenant_context_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Response {
    let context = state.interceptor.enter(&RequestSignals::from_request(&request));
    request.extensions_mut().insert(context.clone());

    state.interceptor.run(context, next.run(request)).await
}
