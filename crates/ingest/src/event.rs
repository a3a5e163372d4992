//! Canonical inbound events and handler plumbing shared by every hub.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;

/// A provider payload parsed into canonical form.
///
/// Parsing is all-or-nothing: malformed input yields a validation error,
/// never a partially populated event.
#[derive(Debug, Clone, Serialize)]
pub struct InboundEvent {
    /// Which hub produced this event ("payment", "ads", ...).
    pub provider: &'static str,
    /// Provider-assigned (or synthesized) idempotency key.
    pub event_id: String,
    pub event_type: String,
    pub category: Option<String>,
    pub timestamp: OffsetDateTime,
    pub payload: Value,
}

/// Outcome of processing one inbound payload.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutcome {
    pub event_id: String,
    pub event_type: String,
    pub category: Option<String>,
    /// True when the event was accepted, including the duplicate case.
    pub handled: bool,
    /// Handlers invoked; zero for a duplicate event.
    pub handler_count: usize,
}

pub type HandlerFuture = Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send>>;

/// An async handler invoked with a canonical event.
pub type Handler = Arc<dyn Fn(InboundEvent) -> HandlerFuture + Send + Sync>;

/// Wrap an async closure into a registrable [`Handler`].
pub fn handler<F, Fut>(f: F) -> Handler
where
    F: Fn(InboundEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
{
    Arc::new(move |event| Box::pin(f(event)))
}

/// Invoke handlers sequentially in registration order, awaiting each before
/// the next. Handler failures are logged and do not abort later handlers.
pub(crate) async fn invoke_handlers(
    provider: &'static str,
    event: &InboundEvent,
    handlers: Vec<Handler>,
) -> usize {
    let count = handlers.len();
    for handler in handlers {
        if let Err(e) = handler(event.clone()).await {
            tracing::error!(
                provider = provider,
                event_id = %event.event_id,
                event_type = %event.event_type,
                error = %e,
                "Inbound event handler failed"
            );
        }
    }
    count
}
