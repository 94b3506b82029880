use thiserror::Error;
use tracing::{error, info};
use url::Url;

use crate::config::ExternalConfig;
use crate::resilience::{ResilientCaller, RetryError, RetryPolicy};

#[derive(Debug, Error)]
pub enum ExternalApiError {
    #[error("Invalid external API URL '{url}': {reason}")]
    InvalidUrl { url: String, reason: String },

    #[error("Failed to build HTTP client: {0}")]
    Client(String),

    #[error("External API unavailable after {attempts} attempt(s): {source}")]
    Exhausted {
        attempts: u32,
        #[source]
        source: reqwest::Error,
    },

    #[error("External API call cancelled")]
    Cancelled,
}

impl From<RetryError<reqwest::Error>> for ExternalApiError {
    fn from(err: RetryError<reqwest::Error>) -> Self {
        match err {
            RetryError::Exhausted { attempts, last } => ExternalApiError::Exhausted { attempts, source: last },
            RetryError::Cancelled { .. } => ExternalApiError::Cancelled,
        }
    }
}

/// Upstream response relayed back to the client as-is.
#[derive(Debug, Clone)]
pub struct ExternalResponse {
    pub status: u16,
    pub content_type: Option<String>,
    pub body: String,
}

/// Fetches from third-party HTTP APIs with bounded retry.
pub struct ExternalApiService {
    client: reqwest::Client,
    policy: RetryPolicy,
    default_url: String,
}

impl ExternalApiService {
    pub fn new(config: &ExternalConfig, policy: RetryPolicy) -> Result<Self, ExternalApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()
            .map_err(|e| ExternalApiError::Client(e.to_string()))?;
        Ok(Self {
            client,
            policy,
            default_url: config.default_url.clone(),
        })
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// The requested URL, or the configured default when none is given.
    pub fn resolve_url(&self, requested: Option<&str>) -> Result<Url, ExternalApiError> {
        let raw = match requested.map(str::trim) {
            Some(url) if !url.is_empty() => url,
            _ => self.default_url.as_str(),
        };
        let url = Url::parse(raw).map_err(|e| ExternalApiError::InvalidUrl {
            url: raw.to_string(),
            reason: e.to_string(),
        })?;
        match url.scheme() {
            "http" | "https" => Ok(url),
            scheme => Err(ExternalApiError::InvalidUrl {
                url: raw.to_string(),
                reason: format!("unsupported scheme '{}'", scheme),
            }),
        }
    }

    /// GET `url`; connection errors, timeouts and error statuses are all retried.
    pub async fn fetch(&self, caller: &ResilientCaller, url: &Url) -> Result<ExternalResponse, ExternalApiError> {
        info!(url = %url, "Fetching data from external API");

        let client = &self.client;
        let result = caller
            .call(&self.policy, move || async move {
                let response = client.get(url.clone()).send().await?.error_for_status()?;
                let status = response.status().as_u16();
                let content_type = response
                    .headers()
                    .get(reqwest::header::CONTENT_TYPE)
                    .and_then(|value| value.to_str().ok())
                    .map(str::to_string);
                let body = response.text().await?;
                Ok::<_, reqwest::Error>(ExternalResponse {
                    status,
                    content_type,
                    body,
                })
            })
            .await;

        match result {
            Ok(response) => {
                info!(url = %url, status = response.status, "Retrieved data from external API");
                Ok(response)
            }
            Err(e) => {
                error!(url = %url, "Failed to fetch external data: {}", e);
                Err(e.into())
            }
        }
    }
}
