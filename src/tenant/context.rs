use std::future::Future;
use std::sync::{Arc, PoisonError, RwLock};

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use super::identity::TenantIdentity;

tokio::task_local! {
    static REQUEST_CONTEXT: RequestContext;
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ContextError {
    #[error("Tenant '{0}' is already bound to this request")]
    AlreadyBound(String),

    #[error("Tenant identification is required for this operation")]
    TenancyRequired,
}

/// Per-request tenant context.
///
/// Each request gets its own instance; clones share the same slot. The
/// interceptor installs it as a task-local for the duration of the handler, so
/// any code running inside the request can reach it through
/// [`RequestContext::active`] without threading it through signatures.
/// Concurrent requests never share an instance.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    inner: Arc<Inner>,
}

#[derive(Debug, Default)]
struct Inner {
    identity: RwLock<Option<TenantIdentity>>,
    cancellation: CancellationToken,
}

impl RequestContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Bind the tenant for this request. A bound identity is never replaced.
    pub fn bind(&self, identity: TenantIdentity) -> Result<(), ContextError> {
        let mut slot = self
            .inner
            .identity
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(existing) = slot.as_ref() {
            return Err(ContextError::AlreadyBound(existing.token().to_string()));
        }
        *slot = Some(identity);
        Ok(())
    }

    pub fn current(&self) -> Option<TenantIdentity> {
        self.inner
            .identity
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// The bound identity, or `TenancyRequired` for operations that cannot
    /// fall back to the default partition.
    pub fn require(&self) -> Result<TenantIdentity, ContextError> {
        self.current().ok_or(ContextError::TenancyRequired)
    }

    /// Drop the bound identity. Safe to call when nothing is bound.
    pub fn clear(&self) {
        self.inner
            .identity
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
    }

    /// Cancellation handle for work owned by this request.
    pub fn cancellation(&self) -> CancellationToken {
        self.inner.cancellation.clone()
    }

    /// Cancel outstanding work for this request and clear its tenant.
    pub fn close(&self) {
        self.inner.cancellation.cancel();
        self.clear();
    }

    /// Run `fut` with this context installed as the active request context.
    pub async fn scope<F: Future>(self, fut: F) -> F::Output {
        REQUEST_CONTEXT.scope(self, fut).await
    }

    /// The context of the request executing on the current task, if any.
    pub fn active() -> Option<RequestContext> {
        REQUEST_CONTEXT.try_with(Clone::clone).ok()
    }

    /// Shortcut for the active request's bound identity.
    pub fn current_identity() -> Option<TenantIdentity> {
        Self::active().and_then(|context| context.current())
    }
}
