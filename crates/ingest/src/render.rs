//! Render pipeline hub.
//!
//! Accepts lifecycle notifications from the render fleet. Event types come
//! in both bare (`completed`) and namespaced (`render.completed`) forms, and
//! payloads do not always carry an event id, so the idempotency key falls
//! back to `render_id:type:timestamp`.

use std::collections::HashMap;

use tokio::sync::Mutex;

use hookrelay_shared::{signature, DedupeWindow};

use crate::error::{IngestError, IngestResult};
use crate::event::{invoke_handlers, Handler, InboundEvent, ProcessOutcome};
use crate::router::{
    decode_body, enforce_signature, optional_str_aliased, required_str, timestamp_or_now,
};

const PROVIDER: &str = "render";

/// Lifecycle stages of a render job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RenderEventKind {
    Started,
    Progress,
    Completed,
    Failed,
    TimedOut,
}

impl RenderEventKind {
    /// Parse both bare and `render.`-prefixed type names.
    pub fn parse(s: &str) -> Option<Self> {
        match s.strip_prefix("render.").unwrap_or(s) {
            "started" => Some(Self::Started),
            "progress" => Some(Self::Progress),
            "completed" => Some(Self::Completed),
            "failed" => Some(Self::Failed),
            "timeout" => Some(Self::TimedOut),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Started => "started",
            Self::Progress => "progress",
            Self::Completed => "completed",
            Self::Failed => "failed",
            Self::TimedOut => "timeout",
        }
    }
}

pub struct RenderEventHub {
    secret: Option<String>,
    by_kind: HashMap<RenderEventKind, Vec<Handler>>,
    global: Vec<Handler>,
    seen: Mutex<DedupeWindow>,
}

impl RenderEventHub {
    pub fn new() -> Self {
        Self {
            secret: None,
            by_kind: HashMap::new(),
            global: Vec::new(),
            seen: Mutex::new(DedupeWindow::default()),
        }
    }

    /// Require a valid `sha256=<hex>` signature on every processed payload.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn on_kind(&mut self, kind: RenderEventKind, handler: Handler) {
        self.by_kind.entry(kind).or_default().push(handler);
    }

    /// Register a handler invoked for every event.
    pub fn on_any(&mut self, handler: Handler) {
        self.global.push(handler);
    }

    /// Check a `sha256=<hex>` signature over the raw payload bytes.
    pub fn verify_signature(&self, body: &[u8], provided: &str) -> bool {
        match &self.secret {
            Some(secret) => signature::verify(secret, body, provided),
            None => false,
        }
    }

    /// Parse a raw payload into a canonical event.
    ///
    /// Requires `renderId` (or `render_id`) and a recognised `type`;
    /// `event_id` is optional and synthesised from
    /// `render_id:type:timestamp` when absent.
    pub fn parse(&self, body: &str) -> IngestResult<InboundEvent> {
        let raw = decode_body(body)?;
        let render_id = optional_str_aliased(&raw, "renderId", "render_id")
            .ok_or(IngestError::MissingField("renderId"))?;
        let type_name = required_str(&raw, "type")?;
        let kind = RenderEventKind::parse(&type_name).ok_or_else(|| {
            IngestError::InvalidField {
                field: "type",
                reason: format!("unknown render event type '{type_name}'"),
            }
        })?;
        let timestamp = timestamp_or_now(raw.get("timestamp"));

        let event_id = optional_str_aliased(&raw, "event_id", "eventId").unwrap_or_else(|| {
            format!("{render_id}:{}:{}", kind.as_str(), timestamp.unix_timestamp())
        });

        Ok(InboundEvent {
            provider: PROVIDER,
            event_id,
            event_type: kind.as_str().to_string(),
            category: None,
            timestamp,
            payload: raw,
        })
    }

    /// Verify, parse, deduplicate, and fan out one render notification.
    pub async fn process(
        &self,
        body: &str,
        signature: Option<&str>,
    ) -> IngestResult<ProcessOutcome> {
        enforce_signature(self.secret.as_deref(), body.as_bytes(), signature)?;

        let event = self.parse(body)?;

        if !self.seen.lock().await.insert(event.event_id.clone()) {
            tracing::info!(
                event_id = %event.event_id,
                event_type = %event.event_type,
                "Duplicate render event - skipping handlers"
            );
            return Ok(ProcessOutcome {
                event_id: event.event_id,
                event_type: event.event_type,
                category: None,
                handled: true,
                handler_count: 0,
            });
        }

        let mut handlers: Vec<Handler> = Vec::new();
        if let Some(kind) = RenderEventKind::parse(&event.event_type) {
            if let Some(for_kind) = self.by_kind.get(&kind) {
                handlers.extend(for_kind.iter().cloned());
            }
        }
        handlers.extend(self.global.iter().cloned());

        let handler_count = invoke_handlers(PROVIDER, &event, handlers).await;

        Ok(ProcessOutcome {
            event_id: event.event_id,
            event_type: event.event_type,
            category: None,
            handled: true,
            handler_count,
        })
    }
}

impl Default for RenderEventHub {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tokio::sync::Mutex;

    use super::*;
    use crate::event::handler;

    fn counting_handler(count: Arc<Mutex<usize>>) -> Handler {
        handler(move |_event| {
            let count = Arc::clone(&count);
            async move {
                *count.lock().await += 1;
                Ok(())
            }
        })
    }

    fn payload(render_id: &str, event_type: &str, timestamp: i64) -> String {
        serde_json::json!({
            "renderId": render_id,
            "type": event_type,
            "compositionId": "main",
            "timestamp": timestamp,
            "outputUrl": "https://cdn.example.com/out.mp4",
        })
        .to_string()
    }

    #[test]
    fn snake_case_render_id_is_accepted() {
        let hub = RenderEventHub::new();
        let body = serde_json::json!({"render_id": "r-1", "type": "started"}).to_string();
        assert!(hub.parse(&body).is_ok());
    }

    #[test]
    fn provider_event_id_is_read_in_either_spelling() {
        let hub = RenderEventHub::new();
        let snake = serde_json::json!({
            "renderId": "r-1", "type": "started", "event_id": "ev-1"
        })
        .to_string();
        let camel = serde_json::json!({
            "renderId": "r-1", "type": "started", "eventId": "ev-1"
        })
        .to_string();
        assert_eq!(hub.parse(&snake).unwrap().event_id, "ev-1");
        assert_eq!(hub.parse(&camel).unwrap().event_id, "ev-1");
    }

    #[test]
    fn kind_parses_bare_and_prefixed_forms() {
        assert_eq!(RenderEventKind::parse("started"), Some(RenderEventKind::Started));
        assert_eq!(
            RenderEventKind::parse("render.started"),
            Some(RenderEventKind::Started)
        );
        assert_eq!(
            RenderEventKind::parse("render.timeout"),
            Some(RenderEventKind::TimedOut)
        );
        assert_eq!(RenderEventKind::parse("render.paused"), None);
    }

    #[test]
    fn prefixed_type_normalizes_to_bare_event_type() {
        let hub = RenderEventHub::new();
        let event = hub.parse(&payload("r-1", "render.completed", 1700000000)).unwrap();
        assert_eq!(event.event_type, "completed");
        assert_eq!(event.event_id, "r-1:completed:1700000000");
    }

    #[test]
    fn verify_signature_requires_a_configured_secret() {
        let unsigned = RenderEventHub::new();
        assert!(!unsigned.verify_signature(b"body", "sha256=00"));

        let hub = RenderEventHub::new().with_secret("render-secret");
        let good = hookrelay_shared::signature::sign_prefixed("render-secret", b"body");
        assert!(hub.verify_signature(b"body", &good));
        assert!(!hub.verify_signature(b"tampered", &good));
    }

    #[tokio::test]
    async fn same_lifecycle_notification_is_processed_once() {
        let count = Arc::new(Mutex::new(0));
        let mut hub = RenderEventHub::new();
        hub.on_kind(RenderEventKind::Completed, counting_handler(Arc::clone(&count)));

        let body = payload("r-2", "completed", 1700000000);
        hub.process(&body, None).await.unwrap();
        let second = hub.process(&body, None).await.unwrap();

        assert_eq!(second.handler_count, 0);
        assert_eq!(*count.lock().await, 1);
    }

    #[tokio::test]
    async fn progress_updates_at_different_timestamps_all_run() {
        let count = Arc::new(Mutex::new(0));
        let mut hub = RenderEventHub::new();
        hub.on_kind(RenderEventKind::Progress, counting_handler(Arc::clone(&count)));

        hub.process(&payload("r-3", "progress", 1700000000), None)
            .await
            .unwrap();
        hub.process(&payload("r-3", "progress", 1700000005), None)
            .await
            .unwrap();

        assert_eq!(*count.lock().await, 2);
    }

    #[tokio::test]
    async fn unknown_type_is_rejected() {
        let hub = RenderEventHub::new();
        let body = payload("r-4", "cancelled", 1700000000);
        assert!(matches!(
            hub.process(&body, None).await,
            Err(IngestError::InvalidField { field: "type", .. })
        ));
    }
}
