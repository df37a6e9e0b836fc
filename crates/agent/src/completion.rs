use std::sync::Arc;

use tokio::task::JoinHandle;

use listing_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use listing_core::collaborators::{CollaboratorError, CompletionNotifier, SubjectExporter};
use listing_core::domain::property::PropertyRecord;

/// Fans a completed record out to export and staff notification.
///
/// Callers persist the terminal state before firing; nothing here can move the
/// session back out of COMPLETED.
#[derive(Clone)]
pub struct CompletionTrigger {
    exporter: Arc<dyn SubjectExporter>,
    notifier: Arc<dyn CompletionNotifier>,
    audit: Arc<dyn AuditSink>,
}

impl CompletionTrigger {
    pub fn new(
        exporter: Arc<dyn SubjectExporter>,
        notifier: Arc<dyn CompletionNotifier>,
        audit: Arc<dyn AuditSink>,
    ) -> Self {
        Self { exporter, notifier, audit }
    }

    /// Spawns the fan-out and returns immediately.
    pub fn fire(&self, record: PropertyRecord) -> JoinHandle<()> {
        let exporter = Arc::clone(&self.exporter);
        let notifier = Arc::clone(&self.notifier);
        let audit = Arc::clone(&self.audit);
        tokio::spawn(async move {
            let (exported, notified) =
                tokio::join!(exporter.export(&record), notifier.notify_completion(&record));
            let context = AuditContext::new(
                Some(record.id.clone()),
                Some(record.contact_id.clone()),
                uuid::Uuid::new_v4().to_string(),
                "completion-trigger",
            );

            match &exported {
                Ok(()) => tracing::info!(
                    event_name = "completion.exported",
                    property_id = %record.id,
                    contact_id = %record.contact_id,
                    "property exported"
                ),
                Err(error) => tracing::error!(
                    event_name = "completion.export_failed",
                    property_id = %record.id,
                    contact_id = %record.contact_id,
                    error = %error,
                    "property export failed"
                ),
            }
            audit.emit(outcome_event(&context, "completion.export", &exported));

            match &notified {
                Ok(()) => tracing::info!(
                    event_name = "completion.notified",
                    property_id = %record.id,
                    "staff notified of completed property"
                ),
                Err(error) => tracing::error!(
                    event_name = "completion.notify_failed",
                    property_id = %record.id,
                    contact_id = %record.contact_id,
                    error = %error,
                    "completion notification failed"
                ),
            }
            audit.emit(outcome_event(&context, "completion.notification", &notified));
        })
    }
}

fn outcome_event(
    context: &AuditContext,
    event_type: &str,
    result: &Result<(), CollaboratorError>,
) -> AuditEvent {
    match result {
        Ok(()) => AuditEvent::new(context, event_type, AuditCategory::Completion, AuditOutcome::Success),
        Err(error) => AuditEvent::new(context, event_type, AuditCategory::Completion, AuditOutcome::Failed)
            .with_metadata("error", error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use chrono::Utc;
    use listing_core::audit::{AuditOutcome, InMemoryAuditSink};
    use listing_core::collaborators::{RecordingExporter, RecordingNotifier};
    use listing_core::domain::property::{ContactId, OwnerDetails, PropertyId, PropertyRecord};

    use super::CompletionTrigger;

    fn record() -> PropertyRecord {
        PropertyRecord::new(
            PropertyId("PROP-1".to_string()),
            ContactId("573001112233".to_string()),
            OwnerDetails { name: "Ana".to_string(), ..OwnerDetails::default() },
            Utc::now(),
        )
    }

    #[tokio::test]
    async fn fans_out_to_exporter_and_notifier() {
        let exporter = RecordingExporter::default();
        let notifier = RecordingNotifier::default();
        let audit = InMemoryAuditSink::default();
        let trigger = CompletionTrigger::new(
            Arc::new(exporter.clone()),
            Arc::new(notifier.clone()),
            Arc::new(audit.clone()),
        );

        trigger.fire(record()).await.expect("task completes");

        assert_eq!(exporter.exported().len(), 1);
        assert_eq!(notifier.notified().len(), 1);
        let events = audit.events();
        assert_eq!(events.len(), 2);
        assert!(events.iter().all(|event| event.outcome == AuditOutcome::Success));
    }

    #[tokio::test]
    async fn export_failure_does_not_stop_notification() {
        let notifier = RecordingNotifier::default();
        let audit = InMemoryAuditSink::default();
        let trigger = CompletionTrigger::new(
            Arc::new(RecordingExporter::failing()),
            Arc::new(notifier.clone()),
            Arc::new(audit.clone()),
        );

        trigger.fire(record()).await.expect("task completes without panicking");
        assert_eq!(notifier.notified().len(), 1);

        let events = audit.events();
        let export = events
            .iter()
            .find(|event| event.event_type == "completion.export")
            .expect("export outcome audited");
        assert_eq!(export.outcome, AuditOutcome::Failed);
        assert!(export.metadata.contains_key("error"));
        assert_eq!(export.property_id.as_ref().map(|id| id.0.as_str()), Some("PROP-1"));
        let notification = events
            .iter()
            .find(|event| event.event_type == "completion.notification")
            .expect("notification outcome audited");
        assert_eq!(notification.outcome, AuditOutcome::Success);
    }
}
