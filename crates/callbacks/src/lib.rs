// Test code patterns (expected in test files):
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! HookRelay Job Callbacks
//!
//! Per-render-job callback registration and verified fan-out.
//!
//! Inbound notifications are authenticated with a timing-safe HMAC-SHA256
//! check over the raw bytes before any parsing. Matching callbacks receive
//! the payload (signed per-callback when a secret is registered), and
//! failed deliveries can be retried while under the retry budget. Records
//! persist through a pluggable [`CallbackStore`]; the default keeps them
//! in memory.

pub mod error;
pub mod manager;
pub mod sender;
pub mod store;

// Error
pub use error::{CallbackError, CallbackResult};

// Manager
pub use manager::{
    CallbackEventKind, CallbackRecord, JobCallback, JobCallbackManager, WebhookOutcome,
};

// Delivery seam
pub use sender::{CallbackSender, HttpCallbackSender};

// Persistence
pub use store::{CallbackStore, InMemoryCallbackStore};
