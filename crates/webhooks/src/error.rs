//! Error types for the outbound webhook crate.

use thiserror::Error;

pub type WebhookResult<T> = Result<T, WebhookError>;

#[derive(Error, Debug)]
pub enum WebhookError {
    #[error("invalid webhook url: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("unknown event \"{requested}\"; permitted events: {allowed}")]
    UnknownEvent { requested: String, allowed: String },

    #[error("subscription not found: {0}")]
    SubscriptionNotFound(String),
}

/// Failure of a single outbound delivery attempt.
///
/// Transport errors are never surfaced to the dispatch caller; they are
/// retried per policy and recorded on the terminal `Delivery`.
#[derive(Error, Debug)]
pub enum TransportError {
    #[error("{0}")]
    Request(String),

    #[error("attempt timed out after {0}ms")]
    TimedOut(u64),
}
