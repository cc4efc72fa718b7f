//! HTTP client abstraction for external API communication.
//!
//! This module provides a trait-based abstraction over HTTP clients, enabling
//! dependency injection and easy mocking in tests.

use crate::error::{HowtoError, Result};
use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;

/// Upper bound on a single completion request.
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Trait for HTTP communication with external APIs.
///
/// # Example
///
/// ```ignore
/// use howto::http_client::{HttpClient, ReqwestHttpClient};
///
/// let client = ReqwestHttpClient::new()?;
/// let response = client.post_json(
///     "https://api.example.com/endpoint",
///     &[("Content-Type", "application/json")],
///     &serde_json::json!({"key": "value"}),
/// ).await?;
/// ```
#[async_trait]
pub trait HttpClient: Send + Sync {
    /// Sends a POST request with JSON body and returns the response text.
    ///
    /// # Errors
    ///
    /// Returns [`HowtoError::Network`] if the request cannot be completed
    /// within the timeout or the body cannot be read.
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<String>;
}

/// HTTP client implementation using reqwest.
pub struct ReqwestHttpClient {
    client: Client,
}

impl ReqwestHttpClient {
    /// Creates a client bounded by [`REQUEST_TIMEOUT`].
    pub fn new() -> Result<Self> {
        Self::with_timeout(REQUEST_TIMEOUT)
    }

    pub fn with_timeout(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HowtoError::Network(format!("failed to build HTTP client: {}", e)))?;
        Ok(Self { client })
    }
}

#[async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn post_json(
        &self,
        url: &str,
        headers: &[(&str, &str)],
        body: &serde_json::Value,
    ) -> Result<String> {
        let mut request = self.client.post(url);

        for (key, value) in headers {
            request = request.header(*key, *value);
        }

        let response = request.json(body).send().await?;
        Ok(response.text().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_host_is_network_error() {
        let client = ReqwestHttpClient::with_timeout(Duration::from_millis(500)).unwrap();
        // Port 9 on localhost: nothing listens there in a test environment.
        let result = client
            .post_json("http://127.0.0.1:9/v1/chat/completions", &[], &serde_json::json!({}))
            .await;
        assert!(matches!(result, Err(HowtoError::Network(_))));
    }
}
