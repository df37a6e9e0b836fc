use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use listing_core::domain::property::ContactId;

/// Top-level body Meta posts to the webhook.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookPayload {
    #[serde(default)]
    pub object: String,
    #[serde(default)]
    pub entry: Vec<WebhookEntry>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookEntry {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub changes: Vec<WebhookChange>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookChange {
    #[serde(default)]
    pub field: String,
    #[serde(default)]
    pub value: ChangeValue,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChangeValue {
    #[serde(default)]
    pub contacts: Vec<WebhookContact>,
    #[serde(default)]
    pub messages: Vec<WebhookMessage>,
    #[serde(default)]
    pub statuses: Vec<serde_json::Value>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookContact {
    #[serde(default)]
    pub wa_id: String,
    #[serde(default)]
    pub profile: Option<ContactProfile>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContactProfile {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WebhookMessage {
    #[serde(default)]
    pub from: String,
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub timestamp: Option<String>,
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default)]
    pub text: Option<TextBody>,
    #[serde(default)]
    pub button: Option<ButtonBody>,
    #[serde(default)]
    pub interactive: Option<InteractiveBody>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBody {
    #[serde(default)]
    pub body: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ButtonBody {
    #[serde(default)]
    pub text: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractiveBody {
    #[serde(default)]
    pub button_reply: Option<ReplyOption>,
    #[serde(default)]
    pub list_reply: Option<ReplyOption>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplyOption {
    #[serde(default)]
    pub id: String,
    #[serde(default)]
    pub title: String,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageContent {
    Text(String),
    /// Images, audio, locations and anything else the conversation cannot read.
    Unsupported { kind: String },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct InboundMessage {
    pub message_id: String,
    pub contact: ContactId,
    pub profile_name: Option<String>,
    pub content: MessageContent,
    pub received_at: Option<DateTime<Utc>>,
}

impl InboundMessage {
    pub fn text(&self) -> Option<&str> {
        match &self.content {
            MessageContent::Text(text) => Some(text),
            MessageContent::Unsupported { .. } => None,
        }
    }
}

impl WebhookPayload {
    /// Flattens every message in the payload, in delivery order. Status
    /// callbacks carry no messages and yield nothing.
    pub fn inbound_messages(&self) -> Vec<InboundMessage> {
        let mut inbound = Vec::new();
        for change in self.entry.iter().flat_map(|entry| entry.changes.iter()) {
            if change.field != "messages" {
                continue;
            }
            for message in &change.value.messages {
                let profile_name = change
                    .value
                    .contacts
                    .iter()
                    .find(|contact| contact.wa_id == message.from)
                    .and_then(|contact| contact.profile.as_ref())
                    .and_then(|profile| profile.name.clone());
                inbound.push(InboundMessage {
                    message_id: message.id.clone(),
                    contact: ContactId::normalized(&message.from),
                    profile_name,
                    content: content_of(message),
                    received_at: message.timestamp.as_deref().and_then(parse_epoch),
                });
            }
        }
        inbound
    }
}

fn content_of(message: &WebhookMessage) -> MessageContent {
    let text = match message.kind.as_str() {
        "text" => message.text.as_ref().map(|text| text.body.clone()),
        "button" => message.button.as_ref().map(|button| button.text.clone()),
        "interactive" => message.interactive.as_ref().and_then(|interactive| {
            interactive
                .button_reply
                .as_ref()
                .or(interactive.list_reply.as_ref())
                .map(|reply| reply.title.clone())
        }),
        _ => None,
    };
    match text {
        Some(text) if !text.trim().is_empty() => MessageContent::Text(text),
        _ => MessageContent::Unsupported { kind: message.kind.clone() },
    }
}

fn parse_epoch(raw: &str) -> Option<DateTime<Utc>> {
    let seconds = raw.trim().parse::<i64>().ok()?;
    Utc.timestamp_opt(seconds, 0).single()
}
