// Test code patterns:
#![cfg_attr(test, allow(clippy::unwrap_used))]
#![cfg_attr(test, allow(clippy::expect_used))]

//! HookRelay Shared Primitives
//!
//! Building blocks used by every other crate in the workspace:
//!
//! - **Signatures**: HMAC-SHA256 signing and timing-safe verification of
//!   webhook payloads
//! - **Dedup window**: bounded, insertion-ordered set used for inbound
//!   event idempotency
//! - **Id generation**: injectable id source so callers can run with UUIDs
//!   in production and deterministic sequences in tests

pub mod dedupe;
pub mod ids;
pub mod signature;

pub use dedupe::DedupeWindow;
pub use ids::{IdGenerator, SequenceGenerator, UuidGenerator};
