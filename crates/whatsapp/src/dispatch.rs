use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::Mutex;

use crate::webhook::{InboundMessage, MessageContent, WebhookPayload};

pub const DEFAULT_DEDUP_CAPACITY: usize = 1_024;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EventContext {
    pub correlation_id: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum HandlerResult {
    Processed,
    Ignored,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventHandlerError {
    #[error("inbound message handler failure: {0}")]
    Inbound(String),
}

/// Receives each readable inbound message.
#[async_trait]
pub trait InboundMessageService: Send + Sync {
    async fn handle_text(
        &self,
        message: &InboundMessage,
        text: &str,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError>;

    /// Called for media and other content the conversation cannot read.
    async fn handle_unsupported(
        &self,
        _message: &InboundMessage,
        _kind: &str,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        Ok(HandlerResult::Ignored)
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispatchSummary {
    pub processed: usize,
    pub ignored: usize,
    pub duplicates: usize,
    pub failed: usize,
}

/// Meta redelivers webhooks it considers unacknowledged, so message ids seen
/// recently are skipped.
pub struct WebhookDispatcher {
    service: Arc<dyn InboundMessageService>,
    seen: Mutex<SeenMessages>,
}

struct SeenMessages {
    order: VecDeque<String>,
    ids: HashSet<String>,
    capacity: usize,
}

impl SeenMessages {
    /// `false` when the id was already recorded.
    fn insert(&mut self, id: &str) -> bool {
        if self.ids.contains(id) {
            return false;
        }
        if self.order.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.ids.remove(&oldest);
            }
        }
        self.order.push_back(id.to_string());
        self.ids.insert(id.to_string());
        true
    }
}

impl WebhookDispatcher {
    pub fn new(service: Arc<dyn InboundMessageService>) -> Self {
        Self::with_capacity(service, DEFAULT_DEDUP_CAPACITY)
    }

    pub fn with_capacity(service: Arc<dyn InboundMessageService>, capacity: usize) -> Self {
        Self {
            service,
            seen: Mutex::new(SeenMessages {
                order: VecDeque::new(),
                ids: HashSet::new(),
                capacity: capacity.max(1),
            }),
        }
    }

    /// Handles messages in delivery order. Handler failures are logged and
    /// counted; they never fail the webhook as a whole.
    pub async fn dispatch(&self, payload: &WebhookPayload, ctx: &EventContext) -> DispatchSummary {
        let mut summary = DispatchSummary::default();
        for message in payload.inbound_messages() {
            if !message.message_id.is_empty() && !self.seen.lock().await.insert(&message.message_id) {
                tracing::debug!(
                    event_name = "whatsapp.webhook.duplicate",
                    message_id = %message.message_id,
                    correlation_id = %ctx.correlation_id,
                    "skipping redelivered message"
                );
                summary.duplicates += 1;
                continue;
            }

            let result = match &message.content {
                MessageContent::Text(text) => self.service.handle_text(&message, text, ctx).await,
                MessageContent::Unsupported { kind } => {
                    self.service.handle_unsupported(&message, kind, ctx).await
                }
            };
            match result {
                Ok(HandlerResult::Processed) => summary.processed += 1,
                Ok(HandlerResult::Ignored) => summary.ignored += 1,
                Err(error) => {
                    tracing::error!(
                        event_name = "whatsapp.webhook.handler_failed",
                        message_id = %message.message_id,
                        contact_id = %message.contact,
                        correlation_id = %ctx.correlation_id,
                        error = %error,
                        "inbound message handler failed"
                    );
                    summary.failed += 1;
                }
            }
        }
        summary
    }
}
