use serde::Serialize;

use crate::auth::AuthUser;

/// The tenant a request is bound to, plus the authenticated actor when one is known.
///
/// The token is never blank: construction trims the raw value and refuses
/// anything empty, so holders can use it verbatim as a partition qualifier.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TenantIdentity {
    token: String,
    principal: Option<AuthUser>,
}

impl TenantIdentity {
    /// Build an identity from a raw signal value. Blank values yield `None`.
    pub fn new(raw: &str) -> Option<Self> {
        let token = raw.trim();
        if token.is_empty() {
            return None;
        }
        Some(Self {
            token: token.to_string(),
            principal: None,
        })
    }

    pub fn with_principal(mut self, principal: AuthUser) -> Self {
        self.principal = Some(principal);
        self
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    pub fn principal(&self) -> Option<&AuthUser> {
        self.principal.as_ref()
    }
}
