use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use axum::http::{header, HeaderMap, HeaderName, Request};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use super::identity::TenantIdentity;
use crate::auth::{AuthUser, JwtError};
use crate::config::{ConfigError, MultitenancyConfig};

/// Which request signal names the tenant. Fixed per deployment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolutionMode {
    #[default]
    Header,
    Subdomain,
    Token,
}

impl FromStr for ResolutionMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "header" => Ok(Self::Header),
            "subdomain" => Ok(Self::Subdomain),
            "token" => Ok(Self::Token),
            _ => Err(ConfigError::InvalidMode(s.to_string())),
        }
    }
}

impl fmt::Display for ResolutionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Header => "header",
            Self::Subdomain => "subdomain",
            Self::Token => "token",
        };
        f.write_str(name)
    }
}

/// What a bearer token says about its tenant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TenantClaim {
    pub tenant_id: String,
    pub principal: Option<AuthUser>,
}

/// Reads the tenant claim out of a bearer token.
pub trait TenantClaimDecoder: Send + Sync {
    fn extract_tenant_id(&self, token: &str) -> Result<String, JwtError>;

    /// Tenant plus the authenticated actor, when the decoder can verify one.
    /// Decoders that verify signatures should override this to do it once.
    fn decode(&self, token: &str) -> Result<TenantClaim, JwtError> {
        Ok(TenantClaim {
            tenant_id: self.extract_tenant_id(token)?,
            principal: None,
        })
    }
}

/// The parts of an inbound request the resolver is allowed to look at.
#[derive(Debug, Clone, Copy)]
pub struct RequestSignals<'a> {
    pub headers: &'a HeaderMap,
    pub host: Option<&'a str>,
}

impl<'a> RequestSignals<'a> {
    pub fn new(headers: &'a HeaderMap, host: Option<&'a str>) -> Self {
        Self { headers, host }
    }

    /// Host comes from the `Host` header, falling back to an absolute-form URI.
    pub fn from_request<B>(request: &'a Request<B>) -> Self {
        let host = request
            .headers()
            .get(header::HOST)
            .and_then(|value| value.to_str().ok())
            .or_else(|| request.uri().host());
        Self::new(request.headers(), host)
    }

    /// Host with any `:port` suffix removed.
    fn server_name(&self) -> Option<&'a str> {
        let host = self.host?;
        if host.starts_with('[') {
            // IPv6 literal; never carries a subdomain
            return host.split(']').next().map(|h| h.trim_start_matches('['));
        }
        Some(host.rsplit_once(':').map_or(host, |(name, _)| name))
    }

    fn bearer_token(&self) -> Option<&'a str> {
        self.headers
            .get(header::AUTHORIZATION)?
            .to_str()
            .ok()?
            .strip_prefix("Bearer ")
    }
}

type Strategy = fn(&TenantResolver, &RequestSignals<'_>) -> Option<TenantIdentity>;

/// Extracts the tenant from a request according to the configured mode.
///
/// The extraction function is picked once in [`TenantResolver::new`].
pub struct TenantResolver {
    mode: ResolutionMode,
    header: HeaderName,
    decoder: Arc<dyn TenantClaimDecoder>,
    strategy: Strategy,
}

impl TenantResolver {
    pub fn new(
        config: &MultitenancyConfig,
        decoder: Arc<dyn TenantClaimDecoder>,
    ) -> Result<Self, ConfigError> {
        let header = HeaderName::from_str(&config.tenant_header)
            .map_err(|_| ConfigError::InvalidHeader(config.tenant_header.clone()))?;

        let strategy: Strategy = match config.mode {
            ResolutionMode::Header => Self::from_header,
            ResolutionMode::Subdomain => Self::from_subdomain,
            ResolutionMode::Token => Self::from_token,
        };

        Ok(Self {
            mode: config.mode,
            header,
            decoder,
            strategy,
        })
    }

    pub fn mode(&self) -> ResolutionMode {
        self.mode
    }

    pub fn tenant_header(&self) -> &HeaderName {
        &self.header
    }

    /// The tenant named by the configured header, whatever the mode.
    pub fn from_tenant_header(&self, headers: &HeaderMap) -> Option<TenantIdentity> {
        self.from_header(&RequestSignals::new(headers, None))
    }

    pub fn resolve(&self, signals: &RequestSignals<'_>) -> Option<TenantIdentity> {
        (self.strategy)(self, signals)
    }

    fn from_header(&self, signals: &RequestSignals<'_>) -> Option<TenantIdentity> {
        let value = signals.headers.get(&self.header)?;
        match value.to_str() {
            Ok(raw) => TenantIdentity::new(raw),
            Err(_) => {
                warn!(header = %self.header, "tenant header is not valid ASCII; ignoring");
                None
            }
        }
    }

    fn from_subdomain(&self, signals: &RequestSignals<'_>) -> Option<TenantIdentity> {
        let host = signals.server_name()?;
        let (label, _) = host.split_once('.')?;
        TenantIdentity::new(label)
    }

    fn from_token(&self, signals: &RequestSignals<'_>) -> Option<TenantIdentity> {
        let jwt = signals.bearer_token()?;
        match self.decoder.decode(jwt) {
            Ok(claim) => {
                let identity = TenantIdentity::new(&claim.tenant_id)?;
                Some(match claim.principal {
                    Some(principal) => identity.with_principal(principal),
                    None => identity,
                })
            }
            Err(e) => {
                // Authentication middleware rejects bad tokens on protected routes
                warn!("Failed to extract tenant from token: {}", e);
                debug!("continuing without a tenant");
                None
            }
        }
    }
}

impl fmt::Debug for TenantResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TenantResolver")
            .field("mode", &self.mode)
            .field("header", &self.header)
            .finish_non_exhaustive()
    }
}
