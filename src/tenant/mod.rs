// tenant/mod.rs - Request tenancy core
//
// Resolution of a tenant from the inbound request, the per-request context that
// carries it, and the interceptor that ties the two together around a handler.

pub mod context;
pub mod identity;
pub mod interceptor;
pub mod resolver;

pub use context::{ContextError, RequestContext};
pub use identity::TenantIdentity;
pub use interceptor::TenantInterceptor;
pub use resolver::{RequestSignals, ResolutionMode, TenantClaim, TenantClaimDecoder, TenantResolver};
