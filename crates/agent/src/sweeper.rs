//! Periodic scan that closes sessions nobody has touched within the idle timeout.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use listing_core::audit::{AuditContext, AuditSink};
use listing_core::collaborators::OutboundMessenger;
use listing_core::domain::session::SessionId;
use listing_core::flows::{FlowContext, FlowEngine, ListingIntakeFlow, SessionEvent};
use listing_db::{RepositoryError, SessionRepository};

use crate::locks::ContactLocks;
use crate::replies;
use crate::runtime::{deliver, ConversationManager};

pub const IDLE_REASON: &str = "idle timeout";

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct SweepReport {
    pub scanned: usize,
    pub timed_out: Vec<SessionId>,
    /// Contacts mid-message when the sweep reached them; retried next tick.
    pub skipped_busy: usize,
    pub failed: usize,
}

pub struct IdleSweeper {
    sessions: Arc<dyn SessionRepository>,
    messenger: Arc<dyn OutboundMessenger>,
    audit: Arc<dyn AuditSink>,
    locks: Arc<ContactLocks>,
    flow: FlowEngine<ListingIntakeFlow>,
    idle_timeout: Duration,
}

impl IdleSweeper {
    pub fn new(
        sessions: Arc<dyn SessionRepository>,
        messenger: Arc<dyn OutboundMessenger>,
        audit: Arc<dyn AuditSink>,
        locks: Arc<ContactLocks>,
        idle_timeout: Duration,
    ) -> Self {
        Self { sessions, messenger, audit, locks, flow: FlowEngine::default(), idle_timeout }
    }

    /// Shares the manager's repositories and contact locks.
    pub fn for_manager(manager: &ConversationManager, idle_timeout: Duration) -> Self {
        let collaborators = manager.collaborators();
        Self::new(
            Arc::clone(&collaborators.sessions),
            Arc::clone(&collaborators.messenger),
            Arc::clone(&collaborators.audit),
            manager.locks(),
            idle_timeout,
        )
    }

    pub fn idle_timeout(&self) -> Duration {
        self.idle_timeout
    }

    pub async fn sweep_once(&self, now: DateTime<Utc>) -> Result<SweepReport, RepositoryError> {
        let cutoff = now - self.idle_timeout;
        let candidates = self.sessions.list_idle_since(cutoff).await?;
        let mut report = SweepReport { scanned: candidates.len(), ..SweepReport::default() };

        for candidate in candidates {
            let Some(_guard) = self.locks.try_lock(&candidate.contact_id).await else {
                tracing::debug!(
                    event_name = "sweeper.session_busy",
                    session_id = %candidate.id,
                    contact_id = %candidate.contact_id,
                    "contact is being processed; skipping"
                );
                report.skipped_busy += 1;
                continue;
            };

            // The message that just released the lock may have refreshed activity.
            let mut session = match self.sessions.find_by_id(&candidate.id).await {
                Ok(Some(session)) if session.is_active() && session.is_idle_since(cutoff) => session,
                Ok(_) => continue,
                Err(error) => {
                    tracing::error!(
                        event_name = "sweeper.reload_failed",
                        session_id = %candidate.id,
                        error = %error,
                        "could not reload idle session"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            let audit = AuditContext::new(
                Some(session.property_id.clone()),
                Some(session.contact_id.clone()),
                format!("sweep-{}", now.timestamp()),
                "sweeper",
            );
            let outcome = match self.flow.apply_with_audit(
                &session.state,
                &SessionEvent::IdleTimeoutElapsed,
                &FlowContext::default(),
                self.audit.as_ref(),
                &audit,
            ) {
                Ok(outcome) => outcome,
                Err(error) => {
                    tracing::error!(
                        event_name = "sweeper.transition_rejected",
                        session_id = %session.id,
                        error = %error,
                        "idle session could not be timed out"
                    );
                    report.failed += 1;
                    continue;
                }
            };

            session.state = outcome.to;
            session.closed_reason = Some(IDLE_REASON.to_string());
            session.context.current_field = None;
            session.updated_at = now;
            if let Err(error) = self.sessions.save(session.clone()).await {
                tracing::error!(
                    event_name = "sweeper.persist_failed",
                    session_id = %session.id,
                    error = %error,
                    "failed to persist timed-out session"
                );
                report.failed += 1;
                continue;
            }

            tracing::info!(
                event_name = "sweeper.session_timed_out",
                session_id = %session.id,
                contact_id = %session.contact_id,
                property_id = %session.property_id,
                last_activity_at = %session.last_activity_at,
                "closed idle session"
            );
            deliver(
                self.messenger.as_ref(),
                &session.contact_id,
                replies::TIMEOUT_NOTICE,
                Some(&session.property_id),
            )
            .await;
            report.timed_out.push(session.id);
        }

        if !report.timed_out.is_empty() || report.failed > 0 {
            tracing::info!(
                event_name = "sweeper.completed",
                scanned = report.scanned,
                timed_out = report.timed_out.len(),
                skipped_busy = report.skipped_busy,
                failed = report.failed,
                "idle sweep finished"
            );
        }
        Ok(report)
    }

    /// Runs [`Self::sweep_once`] every `interval` until `shutdown` flips to true.
    pub fn spawn(self, interval: std::time::Duration, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if let Err(error) = self.sweep_once(Utc::now()).await {
                            tracing::error!(
                                event_name = "sweeper.scan_failed",
                                error = %error,
                                "idle sweep could not list sessions"
                            );
                        }
                        self.locks.prune().await;
                    }
                    changed = shutdown.changed() => {
                        if changed.is_err() || *shutdown.borrow() {
                            tracing::info!(event_name = "sweeper.stopped", "idle sweeper stopped");
                            break;
                        }
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};
    use tokio::sync::watch;

    use listing_core::domain::property::{FieldName, PropertyFields, PropertyType};
    use listing_core::domain::session::SessionState;
    use listing_db::SessionRepository;

    use super::{IdleSweeper, IDLE_REASON};
    use crate::replies;
    use crate::runtime::tests::{contact, harness, seed};

    fn house() -> PropertyFields {
        PropertyFields { property_type: Some(PropertyType::House), ..PropertyFields::default() }
    }

    #[tokio::test]
    async fn idle_session_times_out_with_a_single_notice() {
        let harness = harness();
        let now = Utc::now();
        let stale = seed(&harness, "573001112233", house(), Some(FieldName::BuiltArea), now - Duration::hours(25)).await;
        let fresh = seed(&harness, "573004445566", house(), Some(FieldName::BuiltArea), now - Duration::hours(2)).await;
        let sweeper = IdleSweeper::for_manager(&harness.manager, Duration::hours(24));

        let report = sweeper.sweep_once(now).await.expect("sweep");
        assert_eq!(report.timed_out, vec![stale.id.clone()]);

        let closed = harness.sessions.find_by_id(&stale.id).await.expect("read").expect("exists");
        assert_eq!(closed.state, SessionState::TimedOut);
        assert_eq!(closed.closed_reason.as_deref(), Some(IDLE_REASON));
        let untouched = harness.sessions.find_by_id(&fresh.id).await.expect("read").expect("exists");
        assert_eq!(untouched.state, SessionState::Active);

        let second = sweeper.sweep_once(now + Duration::minutes(5)).await.expect("second sweep");
        assert!(second.timed_out.is_empty());
        let notices = harness.messenger.messages_to(&contact("573001112233"));
        assert_eq!(notices, vec![replies::TIMEOUT_NOTICE.to_string()]);
        assert!(harness.messenger.messages_to(&contact("573004445566")).is_empty());
    }

    #[tokio::test]
    async fn message_after_timeout_gets_no_active_session_reply() {
        let harness = harness();
        let now = Utc::now();
        seed(&harness, "573001112233", house(), Some(FieldName::BuiltArea), now - Duration::hours(30)).await;
        IdleSweeper::for_manager(&harness.manager, Duration::hours(24)).sweep_once(now).await.expect("sweep");

        let processed = harness
            .manager
            .handle_inbound(&contact("573001112233"), "120 metros")
            .await
            .expect("processed");
        assert_eq!(processed.reply, replies::NO_ACTIVE_SESSION);
    }

    #[tokio::test]
    async fn busy_contact_is_skipped_until_released() {
        let harness = harness();
        let now = Utc::now();
        let stale = seed(&harness, "573001112233", house(), None, now - Duration::hours(48)).await;
        let sweeper = IdleSweeper::for_manager(&harness.manager, Duration::hours(24));
        let locks = harness.manager.locks();

        let guard = locks.lock(&contact("573001112233")).await;
        let report = sweeper.sweep_once(now).await.expect("sweep");
        assert_eq!(report.skipped_busy, 1);
        assert!(report.timed_out.is_empty());
        drop(guard);

        let report = sweeper.sweep_once(now).await.expect("sweep");
        assert_eq!(report.timed_out, vec![stale.id]);
    }

    #[tokio::test]
    async fn spawned_loop_stops_on_shutdown() {
        let harness = harness();
        let (sender, receiver) = watch::channel(false);
        let handle = IdleSweeper::for_manager(&harness.manager, Duration::hours(24))
            .spawn(std::time::Duration::from_millis(10), receiver);

        sender.send(true).expect("receiver alive");
        tokio::time::timeout(std::time::Duration::from_secs(2), handle)
            .await
            .expect("loop exits promptly")
            .expect("task did not panic");
    }
}
