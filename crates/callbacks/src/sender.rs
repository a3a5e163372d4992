//! Outbound delivery seam for job callbacks.

use std::time::Duration;

use async_trait::async_trait;

/// Sends one callback payload to a registered URL and reports the HTTP
/// status code, or a string describing the network failure.
#[async_trait]
pub trait CallbackSender: Send + Sync {
    async fn send(
        &self,
        url: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) -> Result<u16, String>;
}

/// Default sender over reqwest.
pub struct HttpCallbackSender {
    client: reqwest::Client,
}

impl HttpCallbackSender {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .user_agent("hookrelay/1.0")
            .timeout(Duration::from_secs(30))
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpCallbackSender {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl CallbackSender for HttpCallbackSender {
    async fn send(
        &self,
        url: &str,
        body: &[u8],
        headers: &[(String, String)],
    ) -> Result<u16, String> {
        let mut request = self.client.post(url).body(body.to_vec());
        for (name, value) in headers {
            request = request.header(name, value);
        }
        let response = request.send().await.map_err(|e| e.to_string())?;
        Ok(response.status().as_u16())
    }
}
