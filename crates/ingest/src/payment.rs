//! Payment provider hub (Stripe-shaped events).
//!
//! Categorises events by the longest matching type prefix, deduplicates by
//! provider event id, and fans out to exact-type, category, and wildcard
//! handlers in registration order.

use std::collections::HashMap;

use tokio::sync::Mutex;

use hookrelay_shared::DedupeWindow;

use crate::error::IngestResult;
use crate::event::{invoke_handlers, Handler, InboundEvent, ProcessOutcome};
use crate::router::{decode_body, enforce_signature, required_str};

const PROVIDER: &str = "payment";

/// Closed set of payment event categories.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentCategory {
    Checkout,
    Subscription,
    Invoice,
    PaymentIntent,
    Customer,
    Charge,
    Dispute,
}

impl PaymentCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Checkout => "checkout",
            Self::Subscription => "subscription",
            Self::Invoice => "invoice",
            Self::PaymentIntent => "payment_intent",
            Self::Customer => "customer",
            Self::Charge => "charge",
            Self::Dispute => "dispute",
        }
    }
}

/// Fixed prefix table. Declaration order is irrelevant: matching is always
/// longest-prefix-first, so `charge.dispute` can never be swallowed by the
/// generic `charge` prefix.
const CATEGORY_PREFIXES: [(&str, PaymentCategory); 7] = [
    ("checkout.session", PaymentCategory::Checkout),
    ("customer.subscription", PaymentCategory::Subscription),
    ("invoice", PaymentCategory::Invoice),
    ("payment_intent", PaymentCategory::PaymentIntent),
    ("customer", PaymentCategory::Customer),
    ("charge", PaymentCategory::Charge),
    ("charge.dispute", PaymentCategory::Dispute),
];

pub struct PaymentEventHub {
    secret: Option<String>,
    /// Prefixes sorted by descending length at construction.
    prefixes: Vec<(&'static str, PaymentCategory)>,
    by_type: HashMap<String, Vec<Handler>>,
    by_category: HashMap<PaymentCategory, Vec<Handler>>,
    wildcard: Vec<Handler>,
    seen: Mutex<DedupeWindow>,
}

impl PaymentEventHub {
    pub fn new() -> Self {
        let mut prefixes = CATEGORY_PREFIXES.to_vec();
        prefixes.sort_by_key(|(prefix, _)| std::cmp::Reverse(prefix.len()));
        Self {
            secret: None,
            prefixes,
            by_type: HashMap::new(),
            by_category: HashMap::new(),
            wildcard: Vec::new(),
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

    pub fn on_category(&mut self, category: PaymentCategory, handler: Handler) {
        self.by_category.entry(category).or_default().push(handler);
    }

    /// Register a wildcard handler invoked for every event.
    pub fn on_any(&mut self, handler: Handler) {
        self.wildcard.push(handler);
    }

    pub fn categorize(&self, event_type: &str) -> Option<PaymentCategory> {
        self.prefixes
            .iter()
            .find(|(prefix, _)| event_type.starts_with(prefix))
            .map(|(_, category)| *category)
    }

    /// Parse a raw payload into a canonical event.
    ///
    /// Requires `{id, type, data}`; `created` (unix seconds) feeds the
    /// event timestamp when present.
    pub fn parse(&self, body: &str) -> IngestResult<InboundEvent> {
        let raw = decode_body(body)?;
        let event_id = required_str(&raw, "id")?;
        let event_type = required_str(&raw, "type")?;
        if raw.get("data").map_or(true, |d| d.is_null()) {
            return Err(crate::error::IngestError::MissingField("data"));
        }

        let category = self.categorize(&event_type).map(|c| c.as_str().to_string());
        let timestamp = crate::router::timestamp_or_now(raw.get("created"));

        Ok(InboundEvent {
            provider: PROVIDER,
            event_id,
            event_type,
            category,
            timestamp,
            payload: raw,
        })
    }

    /// Verify, parse, deduplicate, and fan out one provider payload.
    ///
    /// A duplicate event id short-circuits to `handled = true` with zero
    /// handlers invoked.
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
                "Duplicate payment event - skipping handlers"
            );
            return Ok(ProcessOutcome {
                event_id: event.event_id,
                event_type: event.event_type,
                category: event.category,
                handled: true,
                handler_count: 0,
            });
        }

        let mut handlers: Vec<Handler> = Vec::new();
        if let Some(exact) = self.by_type.get(&event.event_type) {
            handlers.extend(exact.iter().cloned());
        }
        if let Some(category) = self.categorize(&event.event_type) {
            if let Some(for_category) = self.by_category.get(&category) {
                handlers.extend(for_category.iter().cloned());
            }
        }
        handlers.extend(self.wildcard.iter().cloned());

        let handler_count = invoke_handlers(PROVIDER, &event, handlers).await;
        tracing::info!(
            event_id = %event.event_id,
            event_type = %event.event_type,
            handler_count = handler_count,
            "Processed payment event"
        );

        Ok(ProcessOutcome {
            event_id: event.event_id,
            event_type: event.event_type,
            category: event.category,
            handled: true,
            handler_count,
        })
    }
}

impl Default for PaymentEventHub {
    fn default() -> Self {
        Self::new()
    }
}
