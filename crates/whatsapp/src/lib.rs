//! WhatsApp Integration - Cloud API transport for seller conversations
//!
//! This crate provides the WhatsApp interface for the listing intake:
//! - **Webhook** (`webhook`) - Inbound payload model and message extraction
//! - **Signature** (`signature`) - Verification challenge and `X-Hub-Signature-256` checks
//! - **Dispatch** (`dispatch`) - Deduplicates redelivered messages and routes them to a handler
//! - **Client** (`client`) - Outbound text messages through the Graph API
//!
//! # Getting Started
//!
//! 1. Create a WhatsApp Business app at https://developers.facebook.com/apps
//! 2. Point the webhook at `/webhooks/whatsapp` and subscribe to `messages`
//! 3. Set env vars: `LISTING_WHATSAPP_PHONE_NUMBER_ID`, `LISTING_WHATSAPP_ACCESS_TOKEN`,
//!    `LISTING_WHATSAPP_VERIFY_TOKEN` and optionally `LISTING_WHATSAPP_APP_SECRET`
//!
//! # Architecture
//!
//! ```text
//! Meta webhook → verify_signature → WebhookDispatcher → InboundMessageService → Conversation
//!                                                                                  ↓
//!                                           WhatsAppClient ← OutboundMessenger ← Reply
//! ```

pub mod client;
pub mod dispatch;
pub mod signature;
pub mod webhook;

pub use client::{WhatsAppClient, WhatsAppError};
pub use dispatch::{
    DispatchSummary, EventContext, EventHandlerError, HandlerResult, InboundMessageService,
    WebhookDispatcher,
};
pub use signature::{verify_challenge, verify_signature, ChallengeQuery, SignatureError};
pub use webhook::{InboundMessage, MessageContent, WebhookPayload};
