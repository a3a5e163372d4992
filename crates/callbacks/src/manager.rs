//! Per-job callback registration, verified fan-out, and failure retry.
//!
//! Inbound render notifications arrive as raw bytes plus an HMAC-SHA256
//! signature verified against a shared secret before any parsing. On a
//! valid notification the manager fans out to every callback registered
//! for that job whose subscribed kinds include the event type, tracking
//! per-record failure counts through the pluggable store.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use url::Url;

use hookrelay_shared::signature;

use crate::error::{CallbackError, CallbackResult};
use crate::sender::{CallbackSender, HttpCallbackSender};
use crate::store::{CallbackStore, InMemoryCallbackStore};

const DEFAULT_MAX_RETRIES: u32 = 3;

/// Render lifecycle kinds a callback can subscribe to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CallbackEventKind {
    Started,
    Progress,
    Completed,
    Failed,
    Timeout,
}

impl CallbackEventKind {
    pub fn parse(s: &str) -> Option<Self> {
        match s.strip_prefix("render.").unwrap_or(s) {
            "started" => Some(Self::Started),
            "progress" => Some(Self::Progress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "timeout" => Some(Self::Timeout),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Progress => "progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::Timeout => "timeout",
        }
    }
}

/// A registered callback target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCallback {
    pub url: String,
    #[serde(default)]
    pub headers: HashMap<String, String>,
    /// Per-callback signing secret for outbound delivery.
    #[serde(default)]
    pub secret: Option<String>,
    pub events: Vec<CallbackEventKind>,
}

/// Lifetime record of one callback registration. Created on registration,
/// mutated on each delivery attempt, never deleted automatically.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallbackRecord {
    pub job_id: String,
    pub callback: JobCallback,
    pub failed_attempts: u32,
    pub last_attempt_at: Option<OffsetDateTime>,
    pub last_error: Option<String>,
    /// Most recent event delivered (or attempted) to this callback; the
    /// retry envelope reuses it.
    pub last_event: Option<CallbackEventKind>,
}

/// Outcome of one inbound notification.
#[derive(Debug, Clone)]
pub struct WebhookOutcome {
    pub job_id: String,
    pub event: CallbackEventKind,
    /// Callbacks whose subscriptions matched the event.
    pub matched: usize,
    /// Matched callbacks that were delivered successfully.
    pub delivered: usize,
}

pub struct JobCallbackManager {
    store: Arc<dyn CallbackStore>,
    sender: Arc<dyn CallbackSender>,
    max_retries: u32,
}

impl JobCallbackManager {
    pub fn new() -> Self {
        Self {
            store: Arc::new(InMemoryCallbackStore::new()),
            sender: Arc::new(HttpCallbackSender::new()),
            max_retries: DEFAULT_MAX_RETRIES,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn CallbackStore>) -> Self {
        self.store = store;
        self
    }

    pub fn with_sender(mut self, sender: Arc<dyn CallbackSender>) -> Self {
        self.sender = sender;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Validate and append one callback record for a job.
    pub async fn register_callback(
        &self,
        job_id: &str,
        callback: JobCallback,
    ) -> CallbackResult<()> {
        Url::parse(&callback.url)
            .map_err(|e| CallbackError::InvalidCallback(format!("invalid url: {e}")))?;
        if callback.events.is_empty() {
            return Err(CallbackError::InvalidCallback(
                "at least one subscribed event kind is required".to_string(),
            ));
        }

        let mut records = self.store.get(job_id).await?;
        records.push(CallbackRecord {
            job_id: job_id.to_string(),
            callback,
            failed_attempts: 0,
            last_attempt_at: None,
            last_error: None,
            last_event: None,
        });
        self.store.set(job_id, records).await?;
        tracing::info!(job_id = job_id, "Registered job callback");
        Ok(())
    }

    pub async fn get_callbacks(&self, job_id: &str) -> CallbackResult<Vec<CallbackRecord>> {
        self.store.get(job_id).await
    }

    pub async fn remove_callbacks(&self, job_id: &str) -> CallbackResult<()> {
        self.store.delete(job_id).await
    }

    /// Verify and fan out one inbound notification.
    ///
    /// The signature is checked over the raw bytes with a constant-time
    /// comparison before anything is parsed; a missing or mismatched
    /// signature rejects the request with no callback invoked.
    pub async fn process_webhook(
        &self,
        raw_payload: &[u8],
        provided_signature: Option<&str>,
        secret: &str,
    ) -> CallbackResult<WebhookOutcome> {
        let provided = provided_signature.ok_or(CallbackError::SignatureMissing)?;
        if !signature::verify(secret, raw_payload, provided) {
            tracing::warn!("Rejected job notification with invalid signature");
            return Err(CallbackError::SignatureInvalid);
        }

        let parsed: serde_json::Value = serde_json::from_slice(raw_payload)
            .map_err(|e| CallbackError::Payload(e.to_string()))?;
        let job_id = string_field(&parsed, &["renderId", "render_id", "jobId", "job_id"])
            .ok_or_else(|| CallbackError::Payload("missing renderId".to_string()))?;
        let type_name = string_field(&parsed, &["type", "event_type"])
            .ok_or_else(|| CallbackError::Payload("missing type".to_string()))?;
        let event = CallbackEventKind::parse(&type_name)
            .ok_or_else(|| CallbackError::Payload(format!("unknown event type '{type_name}'")))?;

        let mut records = self.store.get(&job_id).await?;
        let mut matched = 0;
        let mut delivered = 0;
        for record in &mut records {
            if !record.callback.events.contains(&event) {
                continue;
            }
            matched += 1;
            record.last_event = Some(event);
            if self.deliver(record, raw_payload).await {
                delivered += 1;
            }
        }
        self.store.set(&job_id, records).await?;

        tracing::info!(
            job_id = %job_id,
            event = event.as_str(),
            matched = matched,
            delivered = delivered,
            "Processed job notification"
        );

        Ok(WebhookOutcome {
            job_id,
            event,
            matched,
            delivered,
        })
    }

    /// Re-attempt delivery for every record that has failed but not yet
    /// exhausted its retry budget. Returns the number of records retried.
    pub async fn retry_failed_callbacks(&self, job_id: &str) -> CallbackResult<usize> {
        let mut records = self.store.get(job_id).await?;
        let mut retried = 0;
        for record in &mut records {
            if record.failed_attempts == 0 || record.failed_attempts >= self.max_retries {
                continue;
            }
            // A failed attempt always records which event it carried.
            let Some(event) = record.last_event else {
                continue;
            };
            retried += 1;
            let envelope = serde_json::json!({
                "type": event.as_str(),
                "renderId": job_id,
                "retry": true,
                "attempt": record.failed_attempts + 1,
                "timestamp": OffsetDateTime::now_utc().unix_timestamp(),
            });
            let body = envelope.to_string();
            if self.deliver(record, body.as_bytes()).await {
                record.failed_attempts = 0;
            }
        }
        self.store.set(job_id, records).await?;
        Ok(retried)
    }

    /// Send one payload to a record's URL, updating its bookkeeping. A
    /// non-2xx status counts as a failure.
    async fn deliver(&self, record: &mut CallbackRecord, body: &[u8]) -> bool {
        let mut headers: Vec<(String, String)> = vec![(
            "Content-Type".to_string(),
            "application/json".to_string(),
        )];
        if let Some(secret) = &record.callback.secret {
            headers.push((
                "X-Webhook-Signature".to_string(),
                signature::sign_prefixed(secret, body),
            ));
        }
        for (name, value) in &record.callback.headers {
            headers.push((name.clone(), value.clone()));
        }

        record.last_attempt_at = Some(OffsetDateTime::now_utc());
        match self.sender.send(&record.callback.url, body, &headers).await {
            Ok(status) if (200..300).contains(&status) => {
                record.last_error = None;
                true
            }
            Ok(status) => {
                record.failed_attempts += 1;
                record.last_error = Some(format!("HTTP {status}"));
                tracing::warn!(
                    job_id = %record.job_id,
                    url = %record.callback.url,
                    status = status,
                    "Job callback delivery failed"
                );
                false
            }
            Err(e) => {
                record.failed_attempts += 1;
                record.last_error = Some(e.clone());
                tracing::warn!(
                    job_id = %record.job_id,
                    url = %record.callback.url,
                    error = %e,
                    "Job callback delivery failed"
                );
                false
            }
        }
    }
}

impl Default for JobCallbackManager {
    fn default() -> Self {
        Self::new()
    }
}

fn string_field(value: &serde_json::Value, names: &[&str]) -> Option<String> {
    names
        .iter()
        .find_map(|name| value.get(name))
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;

    struct RecordedSend {
        url: String,
        body: Vec<u8>,
        headers: Vec<(String, String)>,
    }

    /// Sender that returns a scripted sequence of results; the last entry
    /// repeats once exhausted.
    struct MockSender {
        script: Vec<Result<u16, String>>,
        calls: Arc<Mutex<Vec<RecordedSend>>>,
        cursor: Mutex<usize>,
    }

    impl MockSender {
        fn always(status: u16) -> Self {
            Self::sequence(vec![Ok(status)])
        }

        fn sequence(script: Vec<Result<u16, String>>) -> Self {
            Self {
                script,
                calls: Arc::new(Mutex::new(Vec::new())),
                cursor: Mutex::new(0),
            }
        }
    }

    #[async_trait]
    impl CallbackSender for MockSender {
        async fn send(
            &self,
            url: &str,
            body: &[u8],
            headers: &[(String, String)],
        ) -> Result<u16, String> {
            self.calls.lock().await.push(RecordedSend {
                url: url.to_string(),
                body: body.to_vec(),
                headers: headers.to_vec(),
            });
            let mut cursor = self.cursor.lock().await;
            let index = (*cursor).min(self.script.len() - 1);
            *cursor += 1;
            self.script[index].clone()
        }
    }

    fn manager_with(sender: Arc<MockSender>) -> JobCallbackManager {
        JobCallbackManager::new()
            .with_store(Arc::new(InMemoryCallbackStore::new()))
            .with_sender(sender)
    }

    fn callback(url: &str, events: Vec<CallbackEventKind>) -> JobCallback {
        JobCallback {
            url: url.to_string(),
            headers: HashMap::new(),
            secret: None,
            events,
        }
    }

    fn signed(payload: &serde_json::Value, secret: &str) -> (Vec<u8>, String) {
        let body = payload.to_string().into_bytes();
        let sig = signature::sign_prefixed(secret, &body);
        (body, sig)
    }

    #[tokio::test]
    async fn registration_rejects_bad_url_and_empty_events() {
        let manager = manager_with(Arc::new(MockSender::always(200)));

        let bad_url = manager
            .register_callback("job-1", callback("not a url", vec![CallbackEventKind::Completed]))
            .await;
        assert!(matches!(bad_url, Err(CallbackError::InvalidCallback(_))));

        let no_events = manager
            .register_callback("job-1", callback("https://example.com/cb", vec![]))
            .await;
        assert!(matches!(no_events, Err(CallbackError::InvalidCallback(_))));
    }

    #[tokio::test]
    async fn missing_or_invalid_signature_rejects_before_parse() {
        let sender = Arc::new(MockSender::always(200));
        let manager = manager_with(Arc::clone(&sender));

        // Garbage bytes: if verification ran after parsing, this would be a
        // payload error instead.
        let garbage = b"{not json";
        assert!(matches!(
            manager.process_webhook(garbage, None, "s").await,
            Err(CallbackError::SignatureMissing)
        ));
        assert!(matches!(
            manager.process_webhook(garbage, Some("sha256=00"), "s").await,
            Err(CallbackError::SignatureInvalid)
        ));
        assert!(sender.calls.lock().await.is_empty());
    }

    #[tokio::test]
    async fn fan_out_is_filtered_by_subscribed_kinds() {
        let sender = Arc::new(MockSender::always(200));
        let manager = manager_with(Arc::clone(&sender));
        manager
            .register_callback(
                "job-1",
                callback("https://a.example.com/cb", vec![CallbackEventKind::Completed]),
            )
            .await
            .unwrap();
        manager
            .register_callback(
                "job-1",
                callback("https://b.example.com/cb", vec![CallbackEventKind::Failed]),
            )
            .await
            .unwrap();

        let (body, sig) = signed(
            &serde_json::json!({"type": "render.completed", "renderId": "job-1"}),
            "shared-secret",
        );
        let outcome = manager
            .process_webhook(&body, Some(&sig), "shared-secret")
            .await
            .unwrap();

        assert_eq!(outcome.event, CallbackEventKind::Completed);
        assert_eq!(outcome.matched, 1);
        assert_eq!(outcome.delivered, 1);

        let calls = sender.calls.lock().await;
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].url, "https://a.example.com/cb");
        assert_eq!(calls[0].body, body);
    }

    #[tokio::test]
    async fn per_callback_secret_signs_the_outbound_body() {
        let sender = Arc::new(MockSender::always(200));
        let manager = manager_with(Arc::clone(&sender));
        let mut cb = callback("https://a.example.com/cb", vec![CallbackEventKind::Completed]);
        cb.secret = Some("cb-secret".to_string());
        manager.register_callback("job-1", cb).await.unwrap();

        let (body, sig) = signed(
            &serde_json::json!({"type": "completed", "renderId": "job-1"}),
            "shared-secret",
        );
        manager
            .process_webhook(&body, Some(&sig), "shared-secret")
            .await
            .unwrap();

        let calls = sender.calls.lock().await;
        let sig_header = calls[0]
            .headers
            .iter()
            .find(|(name, _)| name == "X-Webhook-Signature")
            .map(|(_, value)| value.clone())
            .unwrap();
        assert_eq!(sig_header, signature::sign_prefixed("cb-secret", &calls[0].body));
    }

    #[tokio::test]
    async fn failures_accumulate_and_retry_resets_on_success() {
        let sender = Arc::new(MockSender::sequence(vec![Ok(500), Ok(200)]));
        let manager = manager_with(Arc::clone(&sender));
        manager
            .register_callback(
                "job-1",
                callback("https://a.example.com/cb", vec![CallbackEventKind::Failed]),
            )
            .await
            .unwrap();

        let (body, sig) = signed(
            &serde_json::json!({"type": "failed", "renderId": "job-1"}),
            "s",
        );
        let outcome = manager.process_webhook(&body, Some(&sig), "s").await.unwrap();
        assert_eq!(outcome.delivered, 0);

        let record = &manager.get_callbacks("job-1").await.unwrap()[0];
        assert_eq!(record.failed_attempts, 1);
        assert_eq!(record.last_error.as_deref(), Some("HTTP 500"));

        let retried = manager.retry_failed_callbacks("job-1").await.unwrap();
        assert_eq!(retried, 1);

        let record = &manager.get_callbacks("job-1").await.unwrap()[0];
        assert_eq!(record.failed_attempts, 0);
        assert!(record.last_error.is_none());

        // Retry envelope is synthetic, not the original payload.
        let calls = sender.calls.lock().await;
        let retry_body: serde_json::Value = serde_json::from_slice(&calls[1].body).unwrap();
        assert_eq!(retry_body["type"], "failed");
        assert_eq!(retry_body["renderId"], "job-1");
        assert_eq!(retry_body["retry"], true);
    }

    #[tokio::test]
    async fn exhausted_records_are_not_retried() {
        let sender = Arc::new(MockSender::always(500));
        let manager = manager_with(Arc::clone(&sender)).with_max_retries(2);
        manager
            .register_callback(
                "job-1",
                callback("https://a.example.com/cb", vec![CallbackEventKind::Completed]),
            )
            .await
            .unwrap();

        let (body, sig) = signed(
            &serde_json::json!({"type": "completed", "job_id": "job-1"}),
            "s",
        );
        manager.process_webhook(&body, Some(&sig), "s").await.unwrap();
        assert_eq!(manager.retry_failed_callbacks("job-1").await.unwrap(), 1);
        // failed_attempts is now 2 == max_retries; no further retries.
        assert_eq!(manager.retry_failed_callbacks("job-1").await.unwrap(), 0);
    }

    #[tokio::test]
    async fn unknown_event_type_is_a_payload_error() {
        let manager = manager_with(Arc::new(MockSender::always(200)));
        let (body, sig) = signed(
            &serde_json::json!({"type": "render.paused", "job_id": "job-1"}),
            "s",
        );
        assert!(matches!(
            manager.process_webhook(&body, Some(&sig), "s").await,
            Err(CallbackError::Payload(_))
        ));
    }
}
