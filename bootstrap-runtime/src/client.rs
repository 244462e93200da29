//! Runtime API client
//!
//! The transport seam of the runtime: fetching the next invocation and
//! posting results back. [`HttpRuntimeClient`] talks to the real endpoint;
//! tests substitute their own [`RuntimeApiClient`].

use async_trait::async_trait;
use bootstrap_core::protocol::{
    invocation_error_path, invocation_response_path, HEADER_ERROR_TYPE, INIT_ERROR_PATH,
    NEXT_INVOCATION_PATH,
};
use bootstrap_core::ErrorDescriptor;
use bytes::Bytes;
use reqwest::Client;
use thiserror::Error;
use tracing::debug;

use crate::invocation::Invocation;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Failed to create HTTP client: {0}")]
    Build(#[source] reqwest::Error),

    #[error("Request to {url} failed: {source}")]
    Request {
        url: String,
        #[source]
        source: reqwest::Error,
    },

    #[error("Unexpected status {status} from {url}")]
    Status { url: String, status: u16 },
}

/// Operations the runtime loop needs from the control plane
#[async_trait]
pub trait RuntimeApiClient: Send + Sync {
    /// Block until the next invocation is available
    async fn next_invocation(&self) -> Result<Invocation, TransportError>;

    /// Report a successful result
    async fn post_response(&self, request_id: &str, body: Bytes) -> Result<(), TransportError>;

    /// Report a failed invocation
    async fn post_error(&self, request_id: &str, error: &ErrorDescriptor) -> Result<(), TransportError>;

    /// Report a failure that happened before the loop started
    async fn post_init_error(&self, error: &ErrorDescriptor) -> Result<(), TransportError>;
}

/// Client for the Lambda Runtime API over HTTP
#[derive(Debug, Clone)]
pub struct HttpRuntimeClient {
    base_url: String,
    client: Client,
}

impl HttpRuntimeClient {
    /// Create a client for a `host:port` endpoint.
    ///
    /// No request timeout is set: `next` is a long poll.
    pub fn new(runtime_api: &str) -> Result<Self, TransportError> {
        let client = Client::builder()
            .no_proxy()
            .build()
            .map_err(TransportError::Build)?;

        let base_url = if runtime_api.starts_with("http://") || runtime_api.starts_with("https://") {
            runtime_api.trim_end_matches('/').to_string()
        } else {
            format!("http://{}", runtime_api.trim_end_matches('/'))
        };

        Ok(Self { base_url, client })
    }

    /// Get the base URL
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    async fn post(
        &self,
        path: &str,
        body: Bytes,
        error_type: Option<&str>,
    ) -> Result<(), TransportError> {
        let url = self.url(path);

        let mut request = self.client.post(&url).body(body);
        if let Some(error_type) = error_type {
            request = request
                .header(HEADER_ERROR_TYPE, error_type)
                .header("Content-Type", "application/json");
        }

        let response = request.send().await.map_err(|source| TransportError::Request {
            url: url.clone(),
            source,
        })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url,
                status: status.as_u16(),
            });
        }

        debug!(url = %url, status = status.as_u16(), "Posted to runtime API");
        Ok(())
    }
}

#[async_trait]
impl RuntimeApiClient for HttpRuntimeClient {
    async fn next_invocation(&self) -> Result<Invocation, TransportError> {
        let url = self.url(NEXT_INVOCATION_PATH);

        let response = self
            .client
            .get(&url)
            .send()
            .await
            .map_err(|source| TransportError::Request {
                url: url.clone(),
                source,
            })?;

        let status = response.status();
        if !status.is_success() {
            return Err(TransportError::Status {
                url,
                status: status.as_u16(),
            });
        }

        let headers: Vec<(String, String)> = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value
                    .to_str()
                    .ok()
                    .map(|v| (name.as_str().to_string(), v.to_string()))
            })
            .collect();

        let body = response
            .bytes()
            .await
            .map_err(|source| TransportError::Request { url, source })?;

        Ok(Invocation::from_parts(body, headers))
    }

    async fn post_response(&self, request_id: &str, body: Bytes) -> Result<(), TransportError> {
        self.post(&invocation_response_path(request_id), body, None)
            .await
    }

    async fn post_error(&self, request_id: &str, error: &ErrorDescriptor) -> Result<(), TransportError> {
        self.post(
            &invocation_error_path(request_id),
            Bytes::from(error.to_json()),
            Some(error.error_type_str()),
        )
        .await
    }

    async fn post_init_error(&self, error: &ErrorDescriptor) -> Result<(), TransportError> {
        self.post(
            INIT_ERROR_PATH,
            Bytes::from(error.to_json()),
            Some(error.error_type_str()),
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url_from_host_port() {
        let client = HttpRuntimeClient::new("127.0.0.1:9001").unwrap();
        assert_eq!(client.base_url(), "http://127.0.0.1:9001");
        assert_eq!(
            client.url(NEXT_INVOCATION_PATH),
            "http://127.0.0.1:9001/2018-06-01/runtime/invocation/next"
        );
    }

    #[test]
    fn test_base_url_with_scheme() {
        let client = HttpRuntimeClient::new("http://localhost:9001/").unwrap();
        assert_eq!(client.base_url(), "http://localhost:9001");
    }

    #[tokio::test]
    async fn test_unreachable_endpoint_is_a_transport_error() {
        // Port 9 (discard) is not expected to accept HTTP connections
        let client = HttpRuntimeClient::new("127.0.0.1:9").unwrap();

        let result = client.next_invocation().await;
        assert!(matches!(result, Err(TransportError::Request { .. })));
    }
}
