// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! HookRelay Outbound Webhooks
//!
//! Reliable delivery of platform events to subscriber URLs.
//!
//! ## Features
//!
//! - **Subscriptions**: register URLs against named events or the `"*"`
//!   wildcard, with per-subscription retry policies
//! - **Signed delivery**: every payload carries an HMAC-SHA256
//!   `X-Webhook-Signature` over the exact bytes transmitted
//! - **Retry with backoff**: bounded attempts with exponential delays;
//!   terminal failures are recorded, never thrown
//! - **Bounded history**: the last 100 deliveries per subscription
//! - **Managed subscriptions**: allow-listed event vocabulary, generated
//!   secrets, and aggregated delivery statistics

pub mod config;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod manager;
pub mod transport;


// Config
pub use config::{DispatcherConfig, RetryPolicy};

// Dispatcher
pub use dispatcher::{
    Delivery, DeliveryStatus, EventSelector, WebhookDispatcher, WebhookSubscription,
};

// Error
pub use error::{TransportError, WebhookError, WebhookResult};

// Events
pub use events::SystemEvent;

// Manager
pub use manager::{
    CreateSubscriptionInput, ManagedSubscription, SubscriptionManager, SubscriptionStats,
};

// Transport
pub use transport::{HttpTransport, Transport, TransportResponse};

use std::sync::Arc;

/// Outbound webhook service wiring the dispatcher and manager together.
pub struct WebhookService {
    pub dispatcher: Arc<WebhookDispatcher>,
    pub subscriptions: SubscriptionManager,
}

impl WebhookService {
    /// Build with the reqwest-backed transport and environment-derived
    /// configuration.
    pub fn from_env() -> Self {
        Self::new(Arc::new(HttpTransport::new()), DispatcherConfig::from_env())
    }

    pub fn new(transport: Arc<dyn Transport>, config: DispatcherConfig) -> Self {
        let dispatcher = Arc::new(WebhookDispatcher::with_config(transport, config));
        let subscriptions = SubscriptionManager::new(Arc::clone(&dispatcher));
        Self {
            dispatcher,
            subscriptions,
        }
    }
}
