//! Operator overrides and dashboard queries over conversations.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::task::JoinHandle;

use listing_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome};
use listing_core::collaborators::Delivery;
use listing_core::completion::CompletionEngine;
use listing_core::domain::property::{PropertyRecord, PropertyStatus};
use listing_core::domain::session::{Session, SessionId, SessionState};
use listing_core::flows::{FlowContext, FlowEngine, ListingIntakeFlow, SessionEvent};
use listing_core::questions::next_field;
use listing_db::RepositoryError;

use crate::completion::CompletionTrigger;
use crate::locks::ContactLocks;
use crate::runtime::{deliver, Collaborators, ConversationError, ConversationManager};

#[derive(Debug)]
pub struct ForcedCompletion {
    pub session: Session,
    pub completion_task: JoinHandle<()>,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct SessionOverview {
    pub session: Session,
    pub owner_name: String,
    pub property_status: PropertyStatus,
    pub completion_percentage: f64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct DashboardStats {
    pub sessions_by_state: BTreeMap<String, u64>,
    pub total_sessions: u64,
    /// Completed over all sessions, 0.0 when there are none.
    pub completion_rate: f64,
}

pub struct AdminService {
    collaborators: Collaborators,
    engine: CompletionEngine,
    locks: Arc<ContactLocks>,
    trigger: CompletionTrigger,
    flow: FlowEngine<ListingIntakeFlow>,
}

impl AdminService {
    pub fn for_manager(manager: &ConversationManager) -> Self {
        Self {
            collaborators: manager.collaborators().clone(),
            engine: manager.engine().clone(),
            locks: manager.locks(),
            trigger: manager.trigger().clone(),
            flow: FlowEngine::default(),
        }
    }

    /// Closes the session as COMPLETED regardless of the requirement gate and
    /// fires export and notification.
    pub async fn force_complete(
        &self,
        session_id: &SessionId,
        reason: &str,
    ) -> Result<ForcedCompletion, ConversationError> {
        let now = Utc::now();
        let (mut session, _guard) = self.locked_session(session_id).await?;
        let mut record = self.property_for(&session).await?;
        let audit = self.audit_context(&session);

        let outcome = self.flow.apply_with_audit(
            &session.state,
            &SessionEvent::AdminForceComplete,
            &FlowContext::default(),
            self.collaborators.audit.as_ref(),
            &audit,
        )?;
        session.state = outcome.to;
        session.closed_reason = Some(format!("admin: {reason}"));
        session.context.current_field = None;
        session.updated_at = now;

        self.collaborators.properties.update_status(&record.id, PropertyStatus::Complete, now).await?;
        record.status = PropertyStatus::Complete;
        record.updated_at = now;
        self.collaborators.sessions.save(session.clone()).await?;

        tracing::warn!(
            event_name = "admin.force_completed",
            session_id = %session.id,
            property_id = %record.id,
            reason,
            "session completed by operator"
        );
        let completion_task = self.trigger.fire(record);
        Ok(ForcedCompletion { session, completion_task })
    }

    /// Puts a closed session back to ACTIVE and resumes at the next missing field.
    pub async fn reopen(&self, session_id: &SessionId) -> Result<Session, ConversationError> {
        let now = Utc::now();
        let (mut session, _guard) = self.locked_session(session_id).await?;
        let record = self.property_for(&session).await?;

        if let Some(active) = self.collaborators.sessions.find_active_by_contact(&session.contact_id).await? {
            if active.id != session.id {
                return Err(RepositoryError::Conflict(format!(
                    "contact {} already has active session {}",
                    session.contact_id, active.id
                ))
                .into());
            }
        }

        let outcome = self.flow.apply_with_audit(
            &session.state,
            &SessionEvent::AdminReopen,
            &FlowContext::default(),
            self.collaborators.audit.as_ref(),
            &self.audit_context(&session),
        )?;
        session.state = outcome.to;
        session.closed_reason = None;
        session.context.current_field = next_field(self.engine.tracker(), &record.fields);
        session.touch(now);

        if record.status == PropertyStatus::Complete {
            self.collaborators.properties.update_status(&record.id, PropertyStatus::Collecting, now).await?;
        }
        self.collaborators.sessions.save(session.clone()).await?;

        tracing::warn!(
            event_name = "admin.reopened",
            session_id = %session.id,
            property_id = %record.id,
            "session reopened by operator"
        );
        Ok(session)
    }

    /// Sends operator-written text to the session's contact without touching state.
    pub async fn send_manual_message(
        &self,
        session_id: &SessionId,
        text: &str,
    ) -> Result<Delivery, ConversationError> {
        let session = self.session(session_id).await?;
        let delivery = deliver(
            self.collaborators.messenger.as_ref(),
            &session.contact_id,
            text,
            Some(&session.property_id),
        )
        .await;

        let outcome = if delivery.is_sent() { AuditOutcome::Success } else { AuditOutcome::Failed };
        self.collaborators.audit.emit(
            AuditEvent::new(&self.audit_context(&session), "admin.manual_message", AuditCategory::Admin, outcome)
                .with_metadata("session_id", session.id.0.clone()),
        );
        Ok(delivery)
    }

    pub async fn list_sessions(
        &self,
        state: Option<SessionState>,
        limit: u32,
    ) -> Result<Vec<SessionOverview>, ConversationError> {
        let sessions = self.collaborators.sessions.list(state, limit).await?;
        let mut overviews = Vec::with_capacity(sessions.len());
        for session in sessions {
            let record = self.property_for(&session).await?;
            let snapshot = self.engine.tracker().completeness(&record.fields);
            overviews.push(SessionOverview {
                owner_name: record.owner.name,
                property_status: record.status,
                completion_percentage: snapshot.percentage,
                session,
            });
        }
        Ok(overviews)
    }

    pub async fn stats(&self) -> Result<DashboardStats, ConversationError> {
        let counts = self.collaborators.sessions.count_by_state().await?;
        let mut stats = DashboardStats::default();
        for (state, count) in counts {
            stats.total_sessions += count;
            stats.sessions_by_state.insert(state.as_str().to_string(), count);
        }
        let completed = stats.sessions_by_state.get(SessionState::Completed.as_str()).copied().unwrap_or(0);
        if stats.total_sessions > 0 {
            stats.completion_rate = completed as f64 / stats.total_sessions as f64;
        }
        Ok(stats)
    }

    async fn session(&self, session_id: &SessionId) -> Result<Session, ConversationError> {
        self.collaborators
            .sessions
            .find_by_id(session_id)
            .await?
            .ok_or_else(|| ConversationError::SessionNotFound(session_id.to_string()))
    }

    /// Reads the session, takes its contact lock, then re-reads under the lock.
    async fn locked_session(
        &self,
        session_id: &SessionId,
    ) -> Result<(Session, crate::locks::ContactGuard), ConversationError> {
        let contact = self.session(session_id).await?.contact_id;
        let guard = self.locks.lock(&contact).await;
        Ok((self.session(session_id).await?, guard))
    }

    async fn property_for(&self, session: &Session) -> Result<PropertyRecord, ConversationError> {
        self.collaborators
            .properties
            .find_by_id(&session.property_id)
            .await?
            .ok_or_else(|| ConversationError::PropertyNotFound(session.property_id.to_string()))
    }

    fn audit_context(&self, session: &Session) -> AuditContext {
        AuditContext::new(
            Some(session.property_id.clone()),
            Some(session.contact_id.clone()),
            uuid::Uuid::new_v4().to_string(),
            "admin",
        )
    }
}

/// Seconds since the session last heard from the contact.
pub fn idle_seconds(session: &Session, now: DateTime<Utc>) -> i64 {
    (now - session.last_activity_at).num_seconds().max(0)
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use listing_core::domain::property::{FieldName, PropertyFields, PropertyStatus, PropertyType};
    use listing_core::domain::session::SessionState;
    use listing_core::errors::DomainError;
    use listing_db::{PropertyRepository, SessionRepository};

    use super::{idle_seconds, AdminService};
    use crate::runtime::tests::{contact, harness, nearly_complete_house, seed};
    use crate::runtime::ConversationError;
    use crate::sweeper::IdleSweeper;

    fn house() -> PropertyFields {
        PropertyFields { property_type: Some(PropertyType::House), ..PropertyFields::default() }
    }

    #[tokio::test]
    async fn force_complete_closes_session_and_exports() {
        let harness = harness();
        let seeded = seed(&harness, "573001112233", house(), Some(FieldName::BuiltArea), Utc::now()).await;
        let admin = AdminService::for_manager(&harness.manager);

        let forced = admin.force_complete(&seeded.id, "vendedor entregó datos por teléfono").await.expect("forced");
        forced.completion_task.await.expect("fan-out finished");

        assert_eq!(forced.session.state, SessionState::Completed);
        assert_eq!(
            forced.session.closed_reason.as_deref(),
            Some("admin: vendedor entregó datos por teléfono")
        );
        let record = harness.properties.find_by_id(&seeded.property_id).await.expect("read").expect("exists");
        assert_eq!(record.status, PropertyStatus::Complete);
        assert_eq!(harness.exporter.exported().len(), 1);
        assert_eq!(harness.notifier.notified().len(), 1);
    }

    #[tokio::test]
    async fn force_complete_rejects_already_completed_sessions() {
        let harness = harness();
        let seeded = seed(&harness, "573001112233", house(), None, Utc::now()).await;
        let admin = AdminService::for_manager(&harness.manager);
        admin.force_complete(&seeded.id, "first").await.expect("first force");

        let error = admin.force_complete(&seeded.id, "second").await.expect_err("terminal");
        assert!(matches!(error, ConversationError::Domain(DomainError::FlowTransition(_))));
    }

    #[tokio::test]
    async fn reopen_resumes_a_timed_out_session_at_the_next_field() {
        let harness = harness();
        let now = Utc::now();
        let seeded = seed(&harness, "573001112233", nearly_complete_house(), None, now - Duration::hours(30)).await;
        IdleSweeper::for_manager(&harness.manager, Duration::hours(24)).sweep_once(now).await.expect("sweep");

        let reopened = AdminService::for_manager(&harness.manager).reopen(&seeded.id).await.expect("reopened");

        assert_eq!(reopened.state, SessionState::Active);
        assert_eq!(reopened.closed_reason, None);
        assert_eq!(reopened.context.current_field, Some(FieldName::Highlights));
        let active = harness
            .sessions
            .find_active_by_contact(&contact("573001112233"))
            .await
            .expect("read")
            .expect("active again");
        assert_eq!(active.id, seeded.id);
    }

    #[tokio::test]
    async fn reopen_refuses_when_contact_already_has_an_active_session() {
        let harness = harness();
        let now = Utc::now();
        let old = seed(&harness, "573001112233", house(), None, now - Duration::hours(30)).await;
        IdleSweeper::for_manager(&harness.manager, Duration::hours(24)).sweep_once(now).await.expect("sweep");
        seed(&harness, "573001112233", house(), None, now).await;

        let error = AdminService::for_manager(&harness.manager).reopen(&old.id).await.expect_err("conflict");
        assert!(matches!(error, ConversationError::Persistence(listing_db::RepositoryError::Conflict(_))));
    }

    #[tokio::test]
    async fn manual_message_goes_to_the_session_contact() {
        let harness = harness();
        let seeded = seed(&harness, "573001112233", house(), Some(FieldName::BuiltArea), Utc::now()).await;
        let admin = AdminService::for_manager(&harness.manager);

        let delivery = admin.send_manual_message(&seeded.id, "Hola Ana, soy tu asesor.").await.expect("sent");

        assert!(delivery.is_sent());
        assert_eq!(
            harness.messenger.messages_to(&contact("573001112233")),
            vec!["Hola Ana, soy tu asesor.".to_string()]
        );
        let unchanged = harness.sessions.find_by_id(&seeded.id).await.expect("read").expect("exists");
        assert_eq!(unchanged, seeded);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found() {
        let harness = harness();
        let admin = AdminService::for_manager(&harness.manager);
        let error = admin
            .send_manual_message(&listing_core::domain::session::SessionId("SES-missing".to_string()), "hola")
            .await
            .expect_err("missing");
        assert!(matches!(error, ConversationError::SessionNotFound(_)));
    }

    #[tokio::test]
    async fn listing_and_stats_cover_every_state() {
        let harness = harness();
        let done = seed(&harness, "573001112233", house(), None, Utc::now()).await;
        seed(&harness, "573004445566", nearly_complete_house(), Some(FieldName::Highlights), Utc::now()).await;
        let admin = AdminService::for_manager(&harness.manager);
        admin.force_complete(&done.id, "cierre manual").await.expect("forced");

        let active = admin.list_sessions(Some(SessionState::Active), 10).await.expect("list");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].owner_name, "Ana");
        assert!(active[0].completion_percentage > 90.0);
        assert_eq!(admin.list_sessions(None, 10).await.expect("list all").len(), 2);

        let stats = admin.stats().await.expect("stats");
        assert_eq!(stats.total_sessions, 2);
        assert_eq!(stats.sessions_by_state.get("completed"), Some(&1));
        assert!((stats.completion_rate - 0.5).abs() < f64::EPSILON);
        assert!(idle_seconds(&active[0].session, Utc::now()) < 60);
    }
}
