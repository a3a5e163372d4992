//! System event vocabulary for user-facing subscriptions.
//!
//! `SubscriptionManager` only accepts event names from this closed set (or
//! the `"*"` wildcard); upstream job processors dispatch these on lifecycle
//! transitions.

use serde::{Deserialize, Serialize};

/// All events the platform emits to subscribers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemEvent {
    // Render lifecycle
    RenderStarted,
    RenderCompleted,
    RenderFailed,

    // Asset events
    AssetUploaded,
    AssetDeleted,

    // Ads events
    AdPublished,
    AdRejected,

    // Content events
    ContentPublished,

    // Billing events
    PaymentSucceeded,
    PaymentFailed,
    SubscriptionUpdated,
}

impl SystemEvent {
    pub fn all() -> Vec<Self> {
        vec![
            Self::RenderStarted,
            Self::RenderCompleted,
            Self::RenderFailed,
            Self::AssetUploaded,
            Self::AssetDeleted,
            Self::AdPublished,
            Self::AdRejected,
            Self::ContentPublished,
            Self::PaymentSucceeded,
            Self::PaymentFailed,
            Self::SubscriptionUpdated,
        ]
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RenderStarted => "render.started",
            Self::RenderCompleted => "render.completed",
            Self::RenderFailed => "render.failed",
            Self::AssetUploaded => "asset.uploaded",
            Self::AssetDeleted => "asset.deleted",
            Self::AdPublished => "ad.published",
            Self::AdRejected => "ad.rejected",
            Self::ContentPublished => "content.published",
            Self::PaymentSucceeded => "payment.succeeded",
            Self::PaymentFailed => "payment.failed",
            Self::SubscriptionUpdated => "subscription.updated",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        Self::all().into_iter().find(|e| e.as_str() == s)
    }

    /// Comma-separated list of every permitted event name, for error
    /// messages.
    pub fn allowed_names() -> String {
        Self::all()
            .iter()
            .map(|e| e.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }
}

impl std::fmt::Display for SystemEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
