//! Content platform hub.
//!
//! The platform is loose about field naming (snake_case and camelCase both
//! appear in the wild) and does not always carry an event id. Payloads with
//! no id get a synthetic one derived from the payload digest so the
//! idempotency window still applies to byte-identical redeliveries.

use std::collections::HashMap;

use tokio::sync::Mutex;

use hookrelay_shared::{signature, DedupeWindow};

use crate::error::{IngestError, IngestResult};
use crate::event::{invoke_handlers, Handler, InboundEvent, ProcessOutcome};
use crate::router::{decode_body, enforce_signature, optional_str_aliased, timestamp_or_now};

const PROVIDER: &str = "content";

pub struct ContentEventHub {
    secret: Option<String>,
    by_type: HashMap<String, Vec<Handler>>,
    global: Vec<Handler>,
    seen: Mutex<DedupeWindow>,
}

impl ContentEventHub {
    pub fn new() -> Self {
        Self {
            secret: None,
            by_type: HashMap::new(),
            global: Vec::new(),
            seen: Mutex::new(DedupeWindow::default()),
        }
    }

    /// Require a valid `sha256=<hex>` signature on every processed payload.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    pub fn on_event_type(&mut self, event_type: impl Into<String>, handler: Handler) {
        self.by_type.entry(event_type.into()).or_default().push(handler);
    }

    /// Register a handler invoked for every event.
    pub fn on_any(&mut self, handler: Handler) {
        self.global.push(handler);
    }

    /// Parse a raw payload into a canonical event.
    ///
    /// `event_type`/`eventType` is required; `event_id`/`eventId` falls back
    /// to a digest of the payload bytes when absent.
    pub fn parse(&self, body: &str) -> IngestResult<InboundEvent> {
        let raw = decode_body(body)?;
        let event_type = optional_str_aliased(&raw, "event_type", "eventType")
            .ok_or(IngestError::MissingField("event_type"))?;
        let event_id = optional_str_aliased(&raw, "event_id", "eventId")
            .unwrap_or_else(|| signature::payload_digest(body.as_bytes()));
        let timestamp =
            timestamp_or_now(raw.get("timestamp").or_else(|| raw.get("created_at")));

        Ok(InboundEvent {
            provider: PROVIDER,
            event_id,
            event_type,
            category: None,
            timestamp,
            payload: raw,
        })
    }

    /// Verify, parse, deduplicate, and fan out one platform payload.
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
                "Duplicate content event - skipping handlers"
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
        if let Some(exact) = self.by_type.get(&event.event_type) {
            handlers.extend(exact.iter().cloned());
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

impl Default for ContentEventHub {
    fn default() -> Self {
        Self::new()
    }
}
