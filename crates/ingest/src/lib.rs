// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! HookRelay Inbound Ingestion
//!
//! Provider-specific hubs that verify, normalise, and dispatch inbound
//! webhooks.
//!
//! ## Hubs
//!
//! - **Payment**: Stripe-shaped events with longest-prefix categorisation
//!   and an idempotency window keyed on the provider event id
//! - **Ads**: Meta-shaped change notifications with the subscribe
//!   verification handshake; each `entry[].changes[]` element routes
//!   independently
//! - **Content**: loose field naming (snake_case or camelCase) with a
//!   payload-digest fallback event id
//! - **Render**: render fleet lifecycle notifications with a synthetic
//!   `render_id:type:timestamp` idempotency key
//!
//! All hubs verify an optional `sha256=<hex>` signature over the raw
//! payload bytes before any parsing when a secret is configured.

pub mod ads;
pub mod content;
pub mod error;
pub mod event;
pub mod payment;
pub mod render;

mod router;

// Error
pub use error::{IngestError, IngestResult};

// Canonical event model
pub use event::{handler, Handler, HandlerFuture, InboundEvent, ProcessOutcome};

// Hubs
pub use ads::{AdsObjectType, AdsPlatformHub, VerificationRequest, VerificationResponse};
pub use content::ContentEventHub;
pub use payment::{PaymentCategory, PaymentEventHub};
pub use render::{RenderEventHub, RenderEventKind};
