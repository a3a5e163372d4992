//! Ads platform hub (Meta-shaped change notifications).
//!
//! Handles the subscribe verification handshake and routes each change in
//! `entry[].changes[]` independently by `(object type, field)`. This hub
//! carries no idempotency window: the platform redelivers change batches
//! without stable event ids, and handlers for field changes are expected to
//! be idempotent on their own state.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::error::{IngestError, IngestResult};
use crate::event::{invoke_handlers, Handler, InboundEvent, ProcessOutcome};
use crate::router::{decode_body, enforce_signature, timestamp_or_now};

const PROVIDER: &str = "ads";

/// Field name that matches every change for an object type.
const ANY_FIELD: &str = "*";

/// Object types the platform can send change notifications for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AdsObjectType {
    Page,
    User,
    AdAccount,
    Instagram,
    Permissions,
}

impl AdsObjectType {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "page" => Some(Self::Page),
            "user" => Some(Self::User),
            "ad_account" => Some(Self::AdAccount),
            "instagram" => Some(Self::Instagram),
            "permissions" => Some(Self::Permissions),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Page => "page",
            Self::User => "user",
            Self::AdAccount => "ad_account",
            Self::Instagram => "instagram",
            Self::Permissions => "permissions",
        }
    }
}

/// Query parameters of the subscribe handshake.
#[derive(Debug, Clone, Deserialize)]
pub struct VerificationRequest {
    pub mode: String,
    pub verify_token: String,
    pub challenge: String,
}

/// Outcome of the handshake: echo the challenge on success, 403 otherwise.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VerificationResponse {
    pub status_code: u16,
    pub body: String,
}

pub struct AdsPlatformHub {
    verify_token: String,
    secret: Option<String>,
    handlers: HashMap<(AdsObjectType, String), Vec<Handler>>,
}

impl AdsPlatformHub {
    pub fn new(verify_token: impl Into<String>) -> Self {
        Self {
            verify_token: verify_token.into(),
            secret: None,
            handlers: HashMap::new(),
        }
    }

    /// Require a valid `sha256=<hex>` signature on every processed payload.
    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = Some(secret.into());
        self
    }

    /// Register a handler for changes to one field of an object type.
    pub fn on_field(
        &mut self,
        object: AdsObjectType,
        field: impl Into<String>,
        handler: Handler,
    ) {
        self.handlers
            .entry((object, field.into()))
            .or_default()
            .push(handler);
    }

    /// Register a handler for every change to an object type.
    pub fn on_object(&mut self, object: AdsObjectType, handler: Handler) {
        self.on_field(object, ANY_FIELD, handler);
    }

    /// Answer the subscribe handshake. The challenge is echoed back only
    /// when the mode is `subscribe` and the token matches.
    pub fn handle_verification(&self, request: &VerificationRequest) -> VerificationResponse {
        if request.mode == "subscribe" && request.verify_token == self.verify_token {
            VerificationResponse {
                status_code: 200,
                body: request.challenge.clone(),
            }
        } else {
            tracing::warn!(mode = %request.mode, "Rejected ads platform verification");
            VerificationResponse {
                status_code: 403,
                body: "Forbidden".to_string(),
            }
        }
    }

    /// Verify and fan out one change notification batch.
    ///
    /// Each element of `entry[].changes[]` is routed independently; the
    /// outcome counts handler invocations across the whole batch.
    pub async fn process(
        &self,
        body: &str,
        signature: Option<&str>,
    ) -> IngestResult<ProcessOutcome> {
        enforce_signature(self.secret.as_deref(), body.as_bytes(), signature)?;

        let raw = decode_body(body)?;
        let object_name = raw
            .get("object")
            .and_then(|v| v.as_str())
            .ok_or(IngestError::MissingField("object"))?
            .to_string();
        let object = AdsObjectType::parse(&object_name).ok_or_else(|| {
            IngestError::InvalidField {
                field: "object",
                reason: format!("unknown object type '{object_name}'"),
            }
        })?;
        let entries = raw
            .get("entry")
            .and_then(|v| v.as_array())
            .ok_or(IngestError::MissingField("entry"))?;

        // Validate every change in the batch before any handler runs, so a
        // malformed element cannot leave earlier changes partially
        // processed.
        let mut routed: Vec<(InboundEvent, Vec<Handler>)> = Vec::new();
        let mut first_entry_id: Option<String> = None;
        for entry in entries {
            let entry_id = entry
                .get("id")
                .map(|v| match v.as_str() {
                    Some(s) => s.to_string(),
                    None => v.to_string(),
                })
                .unwrap_or_default();
            if first_entry_id.is_none() && !entry_id.is_empty() {
                first_entry_id = Some(entry_id.clone());
            }
            let timestamp = timestamp_or_now(entry.get("time"));
            let changes = entry
                .get("changes")
                .and_then(|v| v.as_array())
                .map(Vec::as_slice)
                .unwrap_or(&[]);

            for change in changes {
                let field = change
                    .get("field")
                    .and_then(|v| v.as_str())
                    .ok_or(IngestError::MissingField("field"))?
                    .to_string();

                let event = InboundEvent {
                    provider: PROVIDER,
                    event_id: entry_id.clone(),
                    event_type: field.clone(),
                    category: Some(object.as_str().to_string()),
                    timestamp,
                    payload: change.clone(),
                };

                let mut matched: Vec<Handler> = Vec::new();
                if let Some(for_field) = self.handlers.get(&(object, field.clone())) {
                    matched.extend(for_field.iter().cloned());
                }
                if field != ANY_FIELD {
                    if let Some(for_object) =
                        self.handlers.get(&(object, ANY_FIELD.to_string()))
                    {
                        matched.extend(for_object.iter().cloned());
                    }
                }
                routed.push((event, matched));
            }
        }

        let mut handler_count = 0;
        for (event, matched) in routed {
            handler_count += invoke_handlers(PROVIDER, &event, matched).await;
        }

        tracing::info!(
            object = object.as_str(),
            entries = entries.len(),
            handler_count = handler_count,
            "Processed ads platform notification"
        );

        Ok(ProcessOutcome {
            event_id: first_entry_id.unwrap_or_default(),
            event_type: object_name.clone(),
            category: Some(object_name),
            handled: true,
            handler_count,
        })
    }
}
