//! Mapping HTTP transport and status failures onto [`ServiceError`].

use std::time::Duration;

use anyhow::Context;
use thiserror::Error;

use gradewise_core::error::ServiceError;

/// Used when a 429 response carries no usable `retry-after` header.
const DEFAULT_RETRY_AFTER_SECS: u64 = 5;

/// Errors raised while building a client, before any request is made.
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("missing API key for {0}")]
    MissingApiKey(&'static str),

    #[error("invalid base URL '{0}'")]
    InvalidBaseUrl(String),
}

/// HTTP client with the request timeout applied.
pub(crate) fn http_client(timeout_secs: u64) -> anyhow::Result<reqwest::Client> {
    reqwest::Client::builder()
        .timeout(Duration::from_secs(timeout_secs))
        .build()
        .context("failed to build HTTP client")
}

pub(crate) fn require_key(api_key: &str, service: &'static str) -> Result<(), ProviderError> {
    if api_key.trim().is_empty() {
        return Err(ProviderError::MissingApiKey(service));
    }
    Ok(())
}

pub(crate) fn normalize_base_url(base_url: &str) -> Result<String, ProviderError> {
    let trimmed = base_url.trim().trim_end_matches('/');
    if !(trimmed.starts_with("http://") || trimmed.starts_with("https://")) {
        return Err(ProviderError::InvalidBaseUrl(base_url.to_string()));
    }
    Ok(trimmed.to_string())
}

/// Failure to send a request or read its response.
pub(crate) fn transport_error(error: reqwest::Error, timeout_secs: u64) -> ServiceError {
    if error.is_timeout() {
        ServiceError::Timeout(timeout_secs)
    } else {
        ServiceError::NetworkError(error.to_string())
    }
}

/// Pass successful responses through; turn error statuses into the matching
/// [`ServiceError`].
pub(crate) async fn check_status(
    response: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    let status = response.status().as_u16();
    if status == 429 {
        let retry_after = response
            .headers()
            .get("retry-after")
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.trim().parse::<u64>().ok())
            .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
        return Err(ServiceError::RateLimited {
            retry_after_ms: retry_after * 1000,
        });
    }
    if status == 401 || status == 403 {
        let body = response.text().await.unwrap_or_default();
        return Err(ServiceError::AuthenticationFailed(body));
    }
    if status >= 400 {
        let body = response.text().await.unwrap_or_default();
        return Err(ServiceError::ApiError {
            status,
            message: body,
        });
    }
    Ok(response)
}
