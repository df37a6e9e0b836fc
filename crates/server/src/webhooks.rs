//! WhatsApp Cloud API webhook: subscription challenge and inbound messages.

use std::sync::Arc;

use async_trait::async_trait;
use axum::body::Bytes;
use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::get;
use axum::{Json, Router};
use secrecy::SecretString;
use tracing::{info, warn};

use listing_agent::replies;
use listing_agent::runtime::MessageOutcome;
use listing_agent::ConversationManager;
use listing_whatsapp::signature::SIGNATURE_HEADER;
use listing_whatsapp::{
    verify_challenge, verify_signature, ChallengeQuery, DispatchSummary, EventContext,
    EventHandlerError, HandlerResult, InboundMessage, InboundMessageService, WebhookDispatcher,
    WebhookPayload,
};

use crate::api::{bad_request, correlation_id, failure, ApiFailure};

/// Feeds webhook messages into the conversation runtime.
pub struct ConversationInbound {
    manager: Arc<ConversationManager>,
}

impl ConversationInbound {
    pub fn new(manager: Arc<ConversationManager>) -> Self {
        Self { manager }
    }
}

#[async_trait]
impl InboundMessageService for ConversationInbound {
    async fn handle_text(
        &self,
        message: &InboundMessage,
        text: &str,
        _ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let processed = self
            .manager
            .handle_inbound(&message.contact, text)
            .await
            .map_err(|error| EventHandlerError::Inbound(error.to_string()))?;
        Ok(match processed.outcome {
            MessageOutcome::NoActiveSession => HandlerResult::Ignored,
            _ => HandlerResult::Processed,
        })
    }

    async fn handle_unsupported(
        &self,
        message: &InboundMessage,
        kind: &str,
        ctx: &EventContext,
    ) -> Result<HandlerResult, EventHandlerError> {
        let delivery =
            self.manager.collaborators().messenger.send(&message.contact, replies::TEXT_ONLY).await;
        info!(
            event_name = "conversation.unsupported_content",
            contact_id = %message.contact,
            correlation_id = %ctx.correlation_id,
            kind,
            delivered = delivery.is_sent(),
            "asked contact to reply with text"
        );
        Ok(HandlerResult::Ignored)
    }
}

#[derive(Clone)]
pub struct WebhookState {
    pub dispatcher: Arc<WebhookDispatcher>,
    pub verify_token: Option<SecretString>,
    pub app_secret: Option<SecretString>,
}

pub fn router(state: WebhookState) -> Router {
    Router::new()
        .route("/webhooks/whatsapp", get(verify).post(receive))
        .with_state(state)
}

pub async fn verify(
    State(state): State<WebhookState>,
    Query(query): Query<ChallengeQuery>,
) -> Result<String, (StatusCode, &'static str)> {
    let Some(expected) = state.verify_token.as_ref() else {
        return Err((StatusCode::FORBIDDEN, "webhook verification is not configured"));
    };
    verify_challenge(&query, expected).map_err(|error| {
        warn!(event_name = "whatsapp.webhook.challenge_rejected", error = %error, "challenge rejected");
        (StatusCode::FORBIDDEN, "verification failed")
    })
}

pub async fn receive(
    State(state): State<WebhookState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DispatchSummary>, ApiFailure> {
    let correlation_id = correlation_id(&headers);

    if let Some(secret) = state.app_secret.as_ref() {
        let header = headers.get(SIGNATURE_HEADER).and_then(|value| value.to_str().ok());
        if let Err(error) = verify_signature(secret, &body, header) {
            warn!(
                event_name = "whatsapp.webhook.signature_rejected",
                correlation_id = %correlation_id,
                error = %error,
                "rejecting unsigned or tampered webhook"
            );
            return Err(failure(StatusCode::UNAUTHORIZED, error.to_string()));
        }
    }

    let payload: WebhookPayload = serde_json::from_slice(&body)
        .map_err(|error| bad_request(format!("invalid webhook payload: {error}")))?;
    let summary = state.dispatcher.dispatch(&payload, &EventContext { correlation_id: correlation_id.clone() }).await;
    info!(
        event_name = "whatsapp.webhook.dispatched",
        correlation_id = %correlation_id,
        processed = summary.processed,
        ignored = summary.ignored,
        duplicates = summary.duplicates,
        failed = summary.failed,
        "webhook payload handled"
    );
    Ok(Json(summary))
}
