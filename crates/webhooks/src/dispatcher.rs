//! Outbound webhook dispatcher.
//!
//! Owns subscriptions and bounded delivery history, signs payloads, and
//! executes retry-with-backoff delivery through the injected transport.
//! `dispatch` never fails: every outcome, success or terminal failure,
//! becomes a `Delivery` record returned to the caller.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::{RwLock, Semaphore};
use tokio::task::JoinSet;

use hookrelay_shared::{signature, IdGenerator, UuidGenerator};

use crate::config::{DispatcherConfig, RetryPolicy};
use crate::error::{TransportError, WebhookError, WebhookResult};
use crate::transport::Transport;

/// Which events a subscription receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventSelector {
    /// The `"*"` wildcard: every dispatched event.
    All,
    Named(HashSet<String>),
}

impl EventSelector {
    /// Build from raw event names; any `"*"` entry selects everything.
    pub fn from_names<S: AsRef<str>>(names: &[S]) -> Self {
        if names.iter().any(|n| n.as_ref() == "*") {
            Self::All
        } else {
            Self::Named(names.iter().map(|n| n.as_ref().to_string()).collect())
        }
    }

    pub fn matches(&self, event: &str) -> bool {
        match self {
            Self::All => true,
            Self::Named(names) => names.contains(event),
        }
    }
}

/// A stored delivery rule: target URL, secret, and retry policy.
#[derive(Debug, Clone)]
pub struct WebhookSubscription {
    pub id: String,
    pub url: String,
    pub events: EventSelector,
    pub secret: String,
    pub active: bool,
    pub retry_policy: RetryPolicy,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    Pending,
    Delivered,
    Failed,
}

/// One attempted transmission (including its retries) of an event to a
/// single subscriber endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct Delivery {
    pub id: String,
    pub subscription_id: String,
    pub event: String,
    pub payload: Value,
    pub status: DeliveryStatus,
    pub attempts: u32,
    pub last_attempt_at: Option<OffsetDateTime>,
    pub response_code: Option<u16>,
    pub error: Option<String>,
}

/// Outbound webhook dispatcher with in-memory subscription and history
/// state.
///
/// Shared state is behind `tokio::sync::RwLock`; the dispatcher is safe for
/// concurrent tasks within one process. Multi-process deployments need an
/// externally atomic store instead.
pub struct WebhookDispatcher {
    subscriptions: RwLock<HashMap<String, WebhookSubscription>>,
    history: RwLock<HashMap<String, VecDeque<Delivery>>>,
    transport: Arc<dyn Transport>,
    ids: Arc<dyn IdGenerator>,
    config: DispatcherConfig,
}

impl WebhookDispatcher {
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::with_config(transport, DispatcherConfig::default())
    }

    pub fn with_config(transport: Arc<dyn Transport>, config: DispatcherConfig) -> Self {
        Self {
            subscriptions: RwLock::new(HashMap::new()),
            history: RwLock::new(HashMap::new()),
            transport,
            ids: Arc::new(UuidGenerator),
            config,
        }
    }

    /// Replace the id source (tests use a deterministic sequence).
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Register a subscription. Fails only on a malformed url.
    pub async fn register(
        &self,
        url: &str,
        events: &[String],
        secret: &str,
        retry_policy: Option<RetryPolicy>,
    ) -> WebhookResult<WebhookSubscription> {
        url::Url::parse(url)?;

        let subscription = WebhookSubscription {
            id: self.ids.next_id(),
            url: url.to_string(),
            events: EventSelector::from_names(events),
            secret: secret.to_string(),
            active: true,
            retry_policy: retry_policy.unwrap_or(self.config.default_retry),
            created_at: OffsetDateTime::now_utc(),
        };

        let mut subscriptions = self.subscriptions.write().await;
        subscriptions.insert(subscription.id.clone(), subscription.clone());

        tracing::info!(
            webhook_id = %subscription.id,
            url = %subscription.url,
            "Registered webhook subscription"
        );
        Ok(subscription)
    }

    /// Remove a subscription and its delivery history. Idempotent.
    pub async fn unregister(&self, id: &str) {
        let removed = self.subscriptions.write().await.remove(id);
        self.history.write().await.remove(id);
        if removed.is_some() {
            tracing::info!(webhook_id = %id, "Unregistered webhook subscription");
        }
    }

    /// Enable or disable dispatch for a subscription.
    pub async fn set_active(&self, id: &str, active: bool) -> WebhookResult<()> {
        let mut subscriptions = self.subscriptions.write().await;
        let subscription = subscriptions
            .get_mut(id)
            .ok_or_else(|| WebhookError::SubscriptionNotFound(id.to_string()))?;
        subscription.active = active;
        Ok(())
    }

    pub async fn get_subscription(&self, id: &str) -> Option<WebhookSubscription> {
        self.subscriptions.read().await.get(id).cloned()
    }

    pub async fn list_subscriptions(&self) -> Vec<WebhookSubscription> {
        self.subscriptions.read().await.values().cloned().collect()
    }

    /// Delivery history for a subscription, oldest first. Capped at the
    /// configured history limit.
    pub async fn get_deliveries(&self, subscription_id: &str) -> Vec<Delivery> {
        self.history
            .read()
            .await
            .get(subscription_id)
            .map(|entries| entries.iter().cloned().collect())
            .unwrap_or_default()
    }

    /// Fan an event out to every active matching subscription.
    ///
    /// Deliveries run in parallel, bounded by the max-in-flight semaphore;
    /// a failure on one subscription cannot prevent delivery to the others.
    /// Returns exactly one `Delivery` per matching subscription, in
    /// completion order.
    pub async fn dispatch(&self, event: &str, payload: Value) -> Vec<Delivery> {
        let matching: Vec<WebhookSubscription> = self
            .subscriptions
            .read()
            .await
            .values()
            .filter(|s| s.active && s.events.matches(event))
            .cloned()
            .collect();

        if matching.is_empty() {
            tracing::debug!(event = %event, "No active subscriptions for event");
            return Vec::new();
        }

        let semaphore = Arc::new(Semaphore::new(self.config.max_in_flight.max(1)));
        let mut tasks = JoinSet::new();

        for subscription in matching {
            let transport = Arc::clone(&self.transport);
            let semaphore = Arc::clone(&semaphore);
            let delivery_id = self.ids.next_id();
            let event = event.to_string();
            let payload = payload.clone();
            let attempt_timeout = self.config.attempt_timeout;

            tasks.spawn(async move {
                // The semaphore is never closed; a failed acquire just means
                // this delivery proceeds without a permit.
                let _permit = semaphore.acquire_owned().await;
                deliver_with_retry(
                    transport.as_ref(),
                    &subscription,
                    &event,
                    payload,
                    delivery_id,
                    attempt_timeout,
                )
                .await
            });
        }

        let mut deliveries = Vec::new();
        while let Some(joined) = tasks.join_next().await {
            match joined {
                Ok(delivery) => deliveries.push(delivery),
                Err(e) => {
                    tracing::error!(error = %e, event = %event, "Delivery task aborted");
                }
            }
        }

        let mut history = self.history.write().await;
        for delivery in &deliveries {
            let entries = history
                .entry(delivery.subscription_id.clone())
                .or_default();
            if entries.len() >= self.config.history_limit {
                entries.pop_front();
            }
            entries.push_back(delivery.clone());
        }

        deliveries
    }
}

/// Deliver one signed payload with retry-with-backoff.
///
/// The signature covers the exact byte sequence transmitted. The delay
/// before retrying after the failed zero-based attempt `i` is
/// `backoff_ms * multiplier^i`; after `max_attempts` the delivery is
/// terminal-failed with the last error kept verbatim.
async fn deliver_with_retry(
    transport: &dyn Transport,
    subscription: &WebhookSubscription,
    event: &str,
    payload: Value,
    delivery_id: String,
    attempt_timeout: Duration,
) -> Delivery {
    let dispatched_at = OffsetDateTime::now_utc();
    let envelope = serde_json::json!({
        "event": event,
        "payload": payload,
        "timestamp": dispatched_at.unix_timestamp(),
    });

    let mut delivery = Delivery {
        id: delivery_id,
        subscription_id: subscription.id.clone(),
        event: event.to_string(),
        payload,
        status: DeliveryStatus::Pending,
        attempts: 0,
        last_attempt_at: None,
        response_code: None,
        error: None,
    };

    let body = match serde_json::to_vec(&envelope) {
        Ok(bytes) => bytes,
        Err(e) => {
            delivery.status = DeliveryStatus::Failed;
            delivery.error = Some(e.to_string());
            return delivery;
        }
    };

    let headers = vec![
        ("Content-Type".to_string(), "application/json".to_string()),
        (
            "X-Webhook-Signature".to_string(),
            signature::sign_prefixed(&subscription.secret, &body),
        ),
        ("X-Webhook-Id".to_string(), subscription.id.clone()),
        ("X-Webhook-Event".to_string(), event.to_string()),
        ("X-Delivery-Id".to_string(), delivery.id.clone()),
    ];

    let policy = subscription.retry_policy;
    let max_attempts = policy.max_attempts.max(1);

    for attempt in 0..max_attempts {
        delivery.attempts = attempt + 1;
        delivery.last_attempt_at = Some(OffsetDateTime::now_utc());

        let outcome =
            match tokio::time::timeout(attempt_timeout, transport.send(&subscription.url, &body, &headers))
                .await
            {
                Ok(result) => result,
                Err(_) => Err(TransportError::TimedOut(attempt_timeout.as_millis() as u64)),
            };

        match outcome {
            Ok(response) if response.is_success() => {
                delivery.status = DeliveryStatus::Delivered;
                delivery.response_code = Some(response.status_code);
                delivery.error = None;
                tracing::info!(
                    webhook_id = %subscription.id,
                    event = %event,
                    attempts = delivery.attempts,
                    "Webhook delivered"
                );
                return delivery;
            }
            Ok(response) => {
                delivery.response_code = Some(response.status_code);
                delivery.error = Some(if response.status_text.is_empty() {
                    format!("HTTP {}", response.status_code)
                } else {
                    response.status_text
                });
            }
            Err(e) => {
                delivery.response_code = None;
                delivery.error = Some(e.to_string());
            }
        }

        if attempt + 1 < max_attempts {
            let delay = policy.delay_after(attempt);
            tracing::debug!(
                webhook_id = %subscription.id,
                attempt = delivery.attempts,
                delay_ms = delay.as_millis() as u64,
                "Delivery attempt failed; backing off"
            );
            tokio::time::sleep(delay).await;
        }
    }

    delivery.status = DeliveryStatus::Failed;
    tracing::warn!(
        webhook_id = %subscription.id,
        event = %event,
        attempts = delivery.attempts,
        error = ?delivery.error,
        "Webhook delivery failed after exhausting retries"
    );
    delivery
}
