//! User-facing subscription management over the dispatcher.
//!
//! Restricts subscriptions to the allow-listed `SystemEvent` vocabulary,
//! generates signing secrets when callers omit one, and aggregates delivery
//! statistics from the dispatcher's history.

use std::collections::HashMap;
use std::sync::Arc;

use serde::Serialize;
use serde_json::Value;
use time::OffsetDateTime;
use tokio::sync::RwLock;

use hookrelay_shared::{signature, IdGenerator, UuidGenerator};

use crate::config::RetryPolicy;
use crate::dispatcher::{Delivery, DeliveryStatus, WebhookDispatcher};
use crate::error::{WebhookError, WebhookResult};
use crate::events::SystemEvent;

/// Input for creating a managed subscription.
#[derive(Debug, Clone)]
pub struct CreateSubscriptionInput {
    pub name: String,
    pub url: String,
    pub events: Vec<String>,
    pub secret: Option<String>,
    pub metadata: Option<Value>,
    pub retry_policy: Option<RetryPolicy>,
}

/// Higher-level subscription record kept alongside the dispatcher's
/// `WebhookSubscription`.
#[derive(Debug, Clone, Serialize)]
pub struct ManagedSubscription {
    pub id: String,
    pub name: String,
    pub webhook_id: String,
    pub url: String,
    pub events: Vec<String>,
    pub active: bool,
    pub metadata: Value,
    pub created_at: OffsetDateTime,
    pub updated_at: OffsetDateTime,
}

/// Aggregated delivery statistics for one subscription.
#[derive(Debug, Clone, Default, Serialize)]
pub struct SubscriptionStats {
    pub total_deliveries: usize,
    pub successful_deliveries: usize,
    pub failed_deliveries: usize,
    pub last_delivery_at: Option<OffsetDateTime>,
}

pub struct SubscriptionManager {
    dispatcher: Arc<WebhookDispatcher>,
    records: RwLock<HashMap<String, ManagedSubscription>>,
    ids: Arc<dyn IdGenerator>,
}

impl SubscriptionManager {
    pub fn new(dispatcher: Arc<WebhookDispatcher>) -> Self {
        Self {
            dispatcher,
            records: RwLock::new(HashMap::new()),
            ids: Arc::new(UuidGenerator),
        }
    }

    /// Replace the id source (tests use a deterministic sequence).
    pub fn with_id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// Create a subscription. Every requested event must be in the system
    /// allowlist or be `"*"`; the error lists the permitted names.
    pub async fn create(
        &self,
        input: CreateSubscriptionInput,
    ) -> WebhookResult<ManagedSubscription> {
        validate_events(&input.events)?;

        let secret = input
            .secret
            .unwrap_or_else(signature::generate_secret);

        let webhook = self
            .dispatcher
            .register(&input.url, &input.events, &secret, input.retry_policy)
            .await?;

        let now = OffsetDateTime::now_utc();
        let record = ManagedSubscription {
            id: self.ids.next_id(),
            name: input.name,
            webhook_id: webhook.id,
            url: input.url,
            events: input.events,
            active: true,
            metadata: input.metadata.unwrap_or(Value::Null),
            created_at: now,
            updated_at: now,
        };

        self.records
            .write()
            .await
            .insert(record.id.clone(), record.clone());

        tracing::info!(
            subscription_id = %record.id,
            webhook_id = %record.webhook_id,
            name = %record.name,
            "Created managed subscription"
        );
        Ok(record)
    }

    pub async fn get(&self, id: &str) -> Option<ManagedSubscription> {
        self.records.read().await.get(id).cloned()
    }

    pub async fn list(&self) -> Vec<ManagedSubscription> {
        self.records.read().await.values().cloned().collect()
    }

    pub async fn delete(&self, id: &str) -> WebhookResult<()> {
        let record = self
            .records
            .write()
            .await
            .remove(id)
            .ok_or_else(|| WebhookError::SubscriptionNotFound(id.to_string()))?;
        self.dispatcher.unregister(&record.webhook_id).await;
        tracing::info!(subscription_id = %id, "Deleted managed subscription");
        Ok(())
    }

    pub async fn set_active(&self, id: &str, active: bool) -> WebhookResult<()> {
        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| WebhookError::SubscriptionNotFound(id.to_string()))?;
        self.dispatcher.set_active(&record.webhook_id, active).await?;
        record.active = active;
        record.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    /// Replace the subscribed events by re-registering with the dispatcher.
    ///
    /// The replacement produces a new webhook id; delivery history does not
    /// carry over across this operation.
    pub async fn update_events(&self, id: &str, events: Vec<String>) -> WebhookResult<()> {
        validate_events(&events)?;

        let mut records = self.records.write().await;
        let record = records
            .get_mut(id)
            .ok_or_else(|| WebhookError::SubscriptionNotFound(id.to_string()))?;

        let previous = self
            .dispatcher
            .get_subscription(&record.webhook_id)
            .await
            .ok_or_else(|| WebhookError::SubscriptionNotFound(record.webhook_id.clone()))?;

        self.dispatcher.unregister(&record.webhook_id).await;
        let replacement = self
            .dispatcher
            .register(
                &record.url,
                &events,
                &previous.secret,
                Some(previous.retry_policy),
            )
            .await?;
        if !record.active {
            self.dispatcher.set_active(&replacement.id, false).await?;
        }

        tracing::info!(
            subscription_id = %id,
            old_webhook_id = %record.webhook_id,
            new_webhook_id = %replacement.id,
            "Rotated webhook registration for event update"
        );

        record.webhook_id = replacement.id;
        record.events = events;
        record.updated_at = OffsetDateTime::now_utc();
        Ok(())
    }

    /// Aggregate the dispatcher's delivery history for a subscription.
    pub async fn get_stats(&self, id: &str) -> WebhookResult<SubscriptionStats> {
        let webhook_id = {
            let records = self.records.read().await;
            records
                .get(id)
                .map(|r| r.webhook_id.clone())
                .ok_or_else(|| WebhookError::SubscriptionNotFound(id.to_string()))?
        };

        let deliveries = self.dispatcher.get_deliveries(&webhook_id).await;
        let mut stats = SubscriptionStats {
            total_deliveries: deliveries.len(),
            ..SubscriptionStats::default()
        };
        for delivery in &deliveries {
            match delivery.status {
                DeliveryStatus::Delivered => stats.successful_deliveries += 1,
                DeliveryStatus::Failed => stats.failed_deliveries += 1,
                DeliveryStatus::Pending => {}
            }
            if delivery.last_attempt_at > stats.last_delivery_at {
                stats.last_delivery_at = delivery.last_attempt_at;
            }
        }
        Ok(stats)
    }

    /// Dispatch a system event through the underlying dispatcher.
    pub async fn dispatch(&self, event: SystemEvent, payload: Value) -> Vec<Delivery> {
        self.dispatcher.dispatch(event.as_str(), payload).await
    }
}

fn validate_events(events: &[String]) -> WebhookResult<()> {
    for name in events {
        if name != "*" && SystemEvent::parse(name).is_none() {
            return Err(WebhookError::UnknownEvent {
                requested: name.clone(),
                allowed: SystemEvent::allowed_names(),
            });
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::transport::testing::MockTransport;
    use hookrelay_shared::SequenceGenerator;

    fn manager(transport: MockTransport) -> SubscriptionManager {
        let dispatcher = Arc::new(
            WebhookDispatcher::new(Arc::new(transport))
                .with_id_generator(Arc::new(SequenceGenerator::new("wh"))),
        );
        SubscriptionManager::new(dispatcher)
            .with_id_generator(Arc::new(SequenceGenerator::new("sub")))
    }

    fn input(events: &[&str]) -> CreateSubscriptionInput {
        CreateSubscriptionInput {
            name: "ci".into(),
            url: "https://example.com/hook".into(),
            events: events.iter().map(|e| e.to_string()).collect(),
            secret: None,
            metadata: None,
            retry_policy: None,
        }
    }

    #[tokio::test]
    async fn create_rejects_unknown_events_and_lists_the_allowlist() {
        let m = manager(MockTransport::always(200));
        let err = m.create(input(&["order.paid"])).await.unwrap_err();
        match err {
            WebhookError::UnknownEvent { requested, allowed } => {
                assert_eq!(requested, "order.paid");
                assert!(allowed.contains("render.completed"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn create_accepts_wildcard_and_generates_a_secret() {
        let m = manager(MockTransport::always(200));
        let record = m.create(input(&["*"])).await.unwrap();
        assert_eq!(record.id, "sub-1");
        assert_eq!(record.webhook_id, "wh-1");

        let webhook = m.dispatcher.get_subscription(&record.webhook_id).await.unwrap();
        assert_eq!(webhook.secret.len(), 64);
    }

    #[tokio::test]
    async fn stats_reflect_dispatched_deliveries() {
        let m = manager(MockTransport::always(200));
        let record = m.create(input(&["render.completed"])).await.unwrap();

        m.dispatch(SystemEvent::RenderCompleted, serde_json::json!({"render_id": "r1"}))
            .await;

        let stats = m.get_stats(&record.id).await.unwrap();
        assert_eq!(stats.total_deliveries, 1);
        assert_eq!(stats.successful_deliveries, 1);
        assert_eq!(stats.failed_deliveries, 0);
        assert!(stats.last_delivery_at.is_some());
    }

    #[tokio::test]
    async fn update_events_rotates_the_webhook_id_and_drops_history() {
        let m = manager(MockTransport::always(200));
        let record = m.create(input(&["render.completed"])).await.unwrap();
        m.dispatch(SystemEvent::RenderCompleted, serde_json::json!({}))
            .await;
        assert_eq!(m.get_stats(&record.id).await.unwrap().total_deliveries, 1);

        m.update_events(&record.id, vec!["render.failed".into()])
            .await
            .unwrap();

        let updated = m.get(&record.id).await.unwrap();
        assert_ne!(updated.webhook_id, record.webhook_id);
        assert_eq!(updated.events, vec!["render.failed".to_string()]);
        // History lives with the webhook registration and is not carried
        // over on rotation.
        assert_eq!(m.get_stats(&record.id).await.unwrap().total_deliveries, 0);

        // The rotated registration keeps the original secret.
        let webhook = m.dispatcher.get_subscription(&updated.webhook_id).await.unwrap();
        assert_eq!(webhook.secret.len(), 64);
    }

    #[tokio::test]
    async fn set_active_false_stops_dispatch() {
        let m = manager(MockTransport::always(200));
        let record = m.create(input(&["*"])).await.unwrap();
        m.set_active(&record.id, false).await.unwrap();

        let deliveries = m
            .dispatch(SystemEvent::AssetUploaded, serde_json::json!({}))
            .await;
        assert!(deliveries.is_empty());
    }

    #[tokio::test]
    async fn delete_removes_record_and_registration() {
        let m = manager(MockTransport::always(200));
        let record = m.create(input(&["*"])).await.unwrap();
        m.delete(&record.id).await.unwrap();
        assert!(m.get(&record.id).await.is_none());
        assert!(m.dispatcher.get_subscription(&record.webhook_id).await.is_none());
        assert!(matches!(
            m.delete(&record.id).await,
            Err(WebhookError::SubscriptionNotFound(_))
        ));
    }
}
