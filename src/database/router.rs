use crate::tenant::{RequestContext, TenantIdentity};

/// Outcome of checking a pooled connection's active schema against the one a
/// unit of work needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionCheck {
    /// The connection already points at the requested schema.
    Valid,
    /// The connection must be switched before use.
    Reassign { from: Option<String>, to: String },
}

/// Maps the request's tenant onto a schema qualifier.
///
/// A bound tenant's token is used verbatim; unbound requests land in the
/// default schema. This is the only place that default is applied.
#[derive(Debug, Clone)]
pub struct TenantConnectionRouter {
    default_schema: String,
}

impl TenantConnectionRouter {
    pub fn new(default_schema: impl Into<String>) -> Self {
        Self {
            default_schema: default_schema.into(),
        }
    }

    pub fn default_schema(&self) -> &str {
        &self.default_schema
    }

    pub fn schema_for(&self, identity: Option<&TenantIdentity>) -> String {
        match identity {
            Some(identity) => identity.token().to_string(),
            None => self.default_schema.clone(),
        }
    }

    /// Schema for the request executing on the current task.
    pub fn current_schema(&self) -> String {
        self.schema_for(RequestContext::current_identity().as_ref())
    }

    /// `active` is the session's `search_path` setting. A session is valid only
    /// when pinned to exactly the requested schema; a path that merely starts
    /// with it, or falls back to other schemas, is reassigned.
    pub fn validate_session(&self, active: Option<&str>, requested: &str) -> SessionCheck {
        match active {
            Some(active) if active.trim() == Self::search_path_for(requested) => SessionCheck::Valid,
            _ => SessionCheck::Reassign {
                from: active.map(str::to_string),
                to: requested.to_string(),
            },
        }
    }

    /// How Postgres reports `search_path` after `SET search_path TO "<schema>"`:
    /// bare when the name is a plain lower-case identifier, double-quoted
    /// otherwise.
    pub fn search_path_for(schema: &str) -> String {
        let mut chars = schema.chars();
        let plain = chars
            .next()
            .map_or(false, |c| c.is_ascii_lowercase() || c == '_')
            && chars.all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_' || c == '$');
        if plain {
            schema.to_string()
        } else {
            format!("\"{}\"", schema.replace('"', "\"\""))
        }
    }
}

impl Default for TenantConnectionRouter {
    fn default() -> Self {
        Self::new("public")
    }
}
