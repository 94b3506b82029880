use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use super::context::RequestContext;
use super::resolver::{RequestSignals, TenantResolver};

/// Resolves the tenant at request entry and tears the context down on exit.
///
/// Exit handling lives in a drop guard, so the context is cleared and its
/// cancellation handle fired whether the handler returns, fails, panics, or
/// is dropped mid-flight because the client went away.
#[derive(Debug, Clone)]
pub struct TenantInterceptor {
    resolver: Arc<TenantResolver>,
}

impl TenantInterceptor {
    pub fn new(resolver: Arc<TenantResolver>) -> Self {
        Self { resolver }
    }

    pub fn resolver(&self) -> &TenantResolver {
        &self.resolver
    }

    /// Build a fresh context for one request, bound when the signal resolves.
    pub fn enter(&self, signals: &RequestSignals<'_>) -> RequestContext {
        let context = RequestContext::new();
        match self.resolver.resolve(signals) {
            Some(identity) => {
                debug!(tenant = %identity.token(), mode = %self.resolver.mode(), "tenant bound to request");
                if let Err(e) = context.bind(identity) {
                    warn!("{}", e);
                }
            }
            None => debug!(mode = %self.resolver.mode(), "no tenant resolved for request"),
        }
        context
    }

    /// Run the downstream handler inside `context`, closing it afterwards.
    pub async fn run<F: Future>(&self, context: RequestContext, handler: F) -> F::Output {
        let _exit = ExitGuard(context.clone());
        context.scope(handler).await
    }
}

struct ExitGuard(RequestContext);

impl Drop for ExitGuard {
    fn drop(&mut self) {
        self.0.close();
    }
}
