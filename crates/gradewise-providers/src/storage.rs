//! Object storage reachable over plain HTTP GET.

use async_trait::async_trait;
use tracing::instrument;

use gradewise_core::error::ServiceError;
use gradewise_core::traits::ObjectStore;

use crate::error::{check_status, http_client, normalize_base_url, transport_error};

pub const DEFAULT_TIMEOUT_SECS: u64 = 30;

/// Fetches `{base_url}/{key}`, optionally with a bearer token.
pub struct HttpObjectStore {
    base_url: String,
    bearer_token: Option<String>,
    timeout_secs: u64,
    client: reqwest::Client,
}

impl HttpObjectStore {
    pub fn new(
        base_url: &str,
        bearer_token: Option<String>,
        timeout_secs: Option<u64>,
    ) -> anyhow::Result<Self> {
        let timeout_secs = timeout_secs.unwrap_or(DEFAULT_TIMEOUT_SECS);
        Ok(Self {
            base_url: normalize_base_url(base_url)?,
            bearer_token: bearer_token.filter(|t| !t.trim().is_empty()),
            timeout_secs,
            client: http_client(timeout_secs)?,
        })
    }
}

#[async_trait]
impl ObjectStore for HttpObjectStore {
    #[instrument(skip(self))]
    async fn fetch(&self, key: &str) -> Result<Vec<u8>, ServiceError> {
        let mut request = self
            .client
            .get(format!("{}/{}", self.base_url, key.trim_start_matches('/')));
        if let Some(token) = &self.bearer_token {
            request = request.bearer_auth(token);
        }

        let response = request
            .send()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;
        let response = check_status(response).await?;
        let bytes = response
            .bytes()
            .await
            .map_err(|e| transport_error(e, self.timeout_secs))?;
        if bytes.is_empty() {
            return Err(ServiceError::InvalidResponse(format!("object {key} is empty")));
        }
        Ok(bytes.to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_object_bytes() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/audio/s1/q1.wav"))
            .and(header("Authorization", "Bearer token-1"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![1u8, 2, 3]))
            .mount(&server)
            .await;

        let store =
            HttpObjectStore::new(&format!("{}/", server.uri()), Some("token-1".into()), None)
                .unwrap();
        assert_eq!(store.fetch("/audio/s1/q1.wav").await.unwrap(), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn missing_object_is_not_retryable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let store = HttpObjectStore::new(&server.uri(), None, None).unwrap();
        let err = store.fetch("nope.wav").await.unwrap_err();
        assert!(matches!(err, ServiceError::ApiError { status: 404, .. }));
        assert!(!err.is_retryable());
    }

    #[tokio::test]
    async fn empty_object_is_invalid() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let store = HttpObjectStore::new(&server.uri(), None, None).unwrap();
        assert!(matches!(
            store.fetch("empty.wav").await.unwrap_err(),
            ServiceError::InvalidResponse(_)
        ));
    }
}
