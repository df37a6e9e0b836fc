//! Contracts for the external services the conversation core talks to.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::property::{ContactId, PropertyRecord};

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Delivery {
    Sent { message_id: Option<String> },
    Failed { error: String },
}

impl Delivery {
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum CollaboratorError {
    #[error("transport failure: {0}")]
    Transport(String),
    #[error("remote rejected request: {0}")]
    Rejected(String),
    #[error("collaborator not configured: {0}")]
    NotConfigured(String),
}

/// Sends a text message to a contact. Implementations report failures in the
/// returned [`Delivery`] rather than erroring; callers only log them.
#[async_trait]
pub trait OutboundMessenger: Send + Sync {
    async fn send(&self, contact: &ContactId, text: &str) -> Delivery;
}

#[async_trait]
pub trait SubjectExporter: Send + Sync {
    async fn export(&self, record: &PropertyRecord) -> Result<(), CollaboratorError>;
}

#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn notify_completion(&self, record: &PropertyRecord) -> Result<(), CollaboratorError>;
}

/// Messenger used when no WhatsApp credentials are configured.
#[derive(Clone, Copy, Debug, Default)]
pub struct LoggingMessenger;

#[async_trait]
impl OutboundMessenger for LoggingMessenger {
    async fn send(&self, contact: &ContactId, text: &str) -> Delivery {
        tracing::info!(
            event_name = "messaging.outbound.logged",
            contact_id = %contact,
            chars = text.chars().count(),
            "outbound message not delivered; messenger disabled"
        );
        Delivery::Sent { message_id: None }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopExporter;

#[async_trait]
impl SubjectExporter for NoopExporter {
    async fn export(&self, record: &PropertyRecord) -> Result<(), CollaboratorError> {
        tracing::debug!(event_name = "export.skipped", property_id = %record.id, "export disabled");
        Ok(())
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct NoopNotifier;

#[async_trait]
impl CompletionNotifier for NoopNotifier {
    async fn notify_completion(&self, record: &PropertyRecord) -> Result<(), CollaboratorError> {
        tracing::debug!(
            event_name = "notification.skipped",
            property_id = %record.id,
            "notification disabled"
        );
        Ok(())
    }
}

fn lock<T: Clone>(items: &Mutex<Vec<T>>) -> Vec<T> {
    match items.lock() {
        Ok(items) => items.clone(),
        Err(poisoned) => poisoned.into_inner().clone(),
    }
}

fn push<T>(items: &Mutex<Vec<T>>, item: T) {
    match items.lock() {
        Ok(mut items) => items.push(item),
        Err(poisoned) => poisoned.into_inner().push(item),
    }
}

/// Captures outbound messages; optionally reports every delivery as failed.
#[derive(Clone, Default)]
pub struct RecordingMessenger {
    sent: Arc<Mutex<Vec<(ContactId, String)>>>,
    fail: bool,
}

impl RecordingMessenger {
    pub fn failing() -> Self {
        Self { sent: Arc::default(), fail: true }
    }

    pub fn messages(&self) -> Vec<(ContactId, String)> {
        lock(&self.sent)
    }

    pub fn messages_to(&self, contact: &ContactId) -> Vec<String> {
        self.messages()
            .into_iter()
            .filter(|(recipient, _)| recipient == contact)
            .map(|(_, text)| text)
            .collect()
    }
}

#[async_trait]
impl OutboundMessenger for RecordingMessenger {
    async fn send(&self, contact: &ContactId, text: &str) -> Delivery {
        push(&self.sent, (contact.clone(), text.to_string()));
        if self.fail {
            Delivery::Failed { error: "simulated delivery failure".to_string() }
        } else {
            Delivery::Sent { message_id: Some(format!("wamid.test-{}", lock(&self.sent).len())) }
        }
    }
}

#[derive(Clone, Default)]
pub struct RecordingExporter {
    exported: Arc<Mutex<Vec<PropertyRecord>>>,
    fail: bool,
}

impl RecordingExporter {
    pub fn failing() -> Self {
        Self { exported: Arc::default(), fail: true }
    }

    pub fn exported(&self) -> Vec<PropertyRecord> {
        lock(&self.exported)
    }
}

#[async_trait]
impl SubjectExporter for RecordingExporter {
    async fn export(&self, record: &PropertyRecord) -> Result<(), CollaboratorError> {
        push(&self.exported, record.clone());
        if self.fail {
            return Err(CollaboratorError::Transport("simulated export failure".to_string()));
        }
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct RecordingNotifier {
    notified: Arc<Mutex<Vec<PropertyRecord>>>,
    fail: bool,
}

impl RecordingNotifier {
    pub fn failing() -> Self {
        Self { notified: Arc::default(), fail: true }
    }

    pub fn notified(&self) -> Vec<PropertyRecord> {
        lock(&self.notified)
    }
}

#[async_trait]
impl CompletionNotifier for RecordingNotifier {
    async fn notify_completion(&self, record: &PropertyRecord) -> Result<(), CollaboratorError> {
        push(&self.notified, record.clone());
        if self.fail {
            return Err(CollaboratorError::Rejected("simulated notification failure".to_string()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use chrono::Utc;

    use super::{
        CompletionNotifier, Delivery, OutboundMessenger, RecordingExporter, RecordingMessenger,
        RecordingNotifier, SubjectExporter,
    };
    use crate::domain::property::{ContactId, OwnerDetails, PropertyId, PropertyRecord};

    fn record() -> PropertyRecord {
        PropertyRecord::new(
            PropertyId("PROP-1".to_string()),
            ContactId("573001112233".to_string()),
            OwnerDetails { name: "Ana".to_string(), ..OwnerDetails::default() },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn recording_messenger_keeps_messages_per_contact() {
        let messenger = RecordingMessenger::default();
        let ana = ContactId("573001112233".to_string());
        let luis = ContactId("573004445566".to_string());

        assert!(messenger.send(&ana, "hola").await.is_sent());
        let _ = messenger.send(&luis, "buenas").await;

        assert_eq!(messenger.messages_to(&ana), vec!["hola".to_string()]);
        assert_eq!(messenger.messages().len(), 2);
    }

    #[tokio::test]
    async fn failing_fakes_still_record_calls() {
        let messenger = RecordingMessenger::failing();
        let exporter = RecordingExporter::failing();
        let notifier = RecordingNotifier::failing();
        let record = record();

        assert!(matches!(messenger.send(&record.contact_id, "x").await, Delivery::Failed { .. }));
        assert!(exporter.export(&record).await.is_err());
        assert!(notifier.notify_completion(&record).await.is_err());
        assert_eq!(exporter.exported().len(), 1);
        assert_eq!(notifier.notified().len(), 1);
    }
}
