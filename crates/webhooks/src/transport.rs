//! Injectable HTTP transport for outbound deliveries.
//!
//! The dispatcher only ever talks to subscriber endpoints through this
//! trait; tests inject scripted implementations and production uses the
//! reqwest-backed default.

use async_trait::async_trait;

use crate::error::TransportError;

/// Outcome of one HTTP POST to a subscriber endpoint.
#[derive(Debug, Clone)]
pub struct TransportResponse {
    pub status_code: u16,
    /// Canonical reason phrase ("Service Unavailable"), empty if unknown.
    pub status_text: String,
}

impl TransportResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(
        &self,
        url: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) -> Result<TransportResponse, TransportError>;
}

/// Default transport backed by a shared reqwest client.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent("hookrelay/1.0")
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpTransport {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn send(
        &self,
        url: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) -> Result<TransportResponse, TransportError> {
        let mut request = self.client.post(url).body(body.to_vec());
        for (name, value) in headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransportError::Request(e.to_string()))?;

        let status = response.status();
        Ok(TransportResponse {
            status_code: status.as_u16(),
            status_text: status.canonical_reason().unwrap_or("").to_string(),
        })
    }
}
