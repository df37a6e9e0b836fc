use thiserror::Error;

use crate::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use crate::domain::property::FieldName;
use crate::domain::session::SessionState;
use crate::flows::states::{FlowAction, FlowContext, SessionEvent, TransitionOutcome};

pub trait FlowDefinition {
    fn name(&self) -> &'static str;
    fn initial_state(&self) -> SessionState;
    fn transition(
        &self,
        current: &SessionState,
        event: &SessionEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>;
}

#[derive(Clone, Debug, Default)]
pub struct ListingIntakeFlow;

impl FlowDefinition for ListingIntakeFlow {
    fn name(&self) -> &'static str {
        "listing_intake"
    }

    fn initial_state(&self) -> SessionState {
        SessionState::Active
    }

    fn transition(
        &self,
        current: &SessionState,
        event: &SessionEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        transition_listing_intake(current, event, context)
    }
}

pub struct FlowEngine<F> {
    flow: F,
}

impl<F> FlowEngine<F>
where
    F: FlowDefinition,
{
    pub fn new(flow: F) -> Self {
        Self { flow }
    }

    pub fn name(&self) -> &'static str {
        self.flow.name()
    }

    pub fn initial_state(&self) -> SessionState {
        self.flow.initial_state()
    }

    pub fn apply(
        &self,
        current: &SessionState,
        event: &SessionEvent,
        context: &FlowContext,
    ) -> Result<TransitionOutcome, FlowTransitionError> {
        self.flow.transition(current, event, context)
    }

    pub fn apply_with_audit<S>(
        &self,
        current: &SessionState,
        event: &SessionEvent,
        context: &FlowContext,
        sink: &S,
        audit: &AuditContext,
    ) -> Result<TransitionOutcome, FlowTransitionError>
    where
        S: AuditSink + ?Sized,
    {
        let result = self.apply(current, event, context);
        match &result {
            Ok(outcome) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "session.transition_applied",
                        AuditCategory::Conversation,
                        AuditOutcome::Success,
                    )
                    .with_metadata("from", outcome.from.as_str())
                    .with_metadata("to", outcome.to.as_str())
                    .with_metadata("event", format!("{:?}", outcome.event)),
                );
            }
            Err(error) => {
                sink.emit(
                    AuditEvent::new(
                        audit,
                        "session.transition_rejected",
                        AuditCategory::Conversation,
                        AuditOutcome::Rejected,
                    )
                    .with_metadata("error", error.to_string()),
                );
            }
        }
        result
    }
}

impl Default for FlowEngine<ListingIntakeFlow> {
    fn default() -> Self {
        Self::new(ListingIntakeFlow)
    }
}

#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FlowTransitionError {
    #[error("missing required fields before completing from {state:?}: {missing_fields:?}")]
    MissingRequiredFields { state: SessionState, missing_fields: Vec<FieldName> },
    #[error("minimum requirements not met before completing from {state:?}: {failed:?}")]
    RequirementsNotMet { state: SessionState, failed: Vec<String> },
    #[error("invalid transition from {state:?} using event {event:?}")]
    InvalidTransition { state: SessionState, event: SessionEvent },
}

fn transition_listing_intake(
    current: &SessionState,
    event: &SessionEvent,
    context: &FlowContext,
) -> Result<TransitionOutcome, FlowTransitionError> {
    use FlowAction::{
        ExportSubject, NotifyStaff, PersistTerminalState, PromptNextField, SendCompletionMessage,
        SendTimeoutNotice,
    };
    use SessionEvent::{
        AdminForceComplete, AdminReopen, CompletionConfirmed, IdleTimeoutElapsed, MessageProcessed,
        Superseded,
    };
    use SessionState::{Active, Completed, TimedOut};

    let (to, actions) = match (current, event) {
        (Active, MessageProcessed) => (Active, vec![PromptNextField]),
        (Active, CompletionConfirmed) => {
            if !context.missing_required_fields.is_empty() {
                return Err(FlowTransitionError::MissingRequiredFields {
                    state: *current,
                    missing_fields: context.missing_required_fields.clone(),
                });
            }
            if !context.failed_requirements.is_empty() {
                return Err(FlowTransitionError::RequirementsNotMet {
                    state: *current,
                    failed: context.failed_requirements.clone(),
                });
            }
            (
                Completed,
                vec![PersistTerminalState, SendCompletionMessage, ExportSubject, NotifyStaff],
            )
        }
        (Active, IdleTimeoutElapsed) => (TimedOut, vec![PersistTerminalState, SendTimeoutNotice]),
        (Active, Superseded) => (TimedOut, vec![PersistTerminalState]),
        (Active, AdminForceComplete) | (TimedOut, AdminForceComplete) => {
            (Completed, vec![PersistTerminalState, ExportSubject, NotifyStaff])
        }
        (Completed, AdminReopen) | (TimedOut, AdminReopen) => (Active, vec![PromptNextField]),
        _ => {
            return Err(FlowTransitionError::InvalidTransition {
                state: *current,
                event: event.clone(),
            });
        }
    };

    Ok(TransitionOutcome { from: *current, to, event: event.clone(), actions })
}

#[cfg(test)]
mod tests {
    use crate::audit::{AuditContext, InMemoryAuditSink};
    use crate::domain::property::{ContactId, FieldName, PropertyId};
    use crate::domain::session::SessionState;
    use crate::flows::engine::{FlowDefinition, FlowEngine, FlowTransitionError, ListingIntakeFlow};
    use crate::flows::states::{FlowAction, FlowContext, SessionEvent};

    #[test]
    fn active_sessions_loop_on_processed_messages() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(&SessionState::Active, &SessionEvent::MessageProcessed, &FlowContext::default())
            .expect("active self-loop");

        assert_eq!(outcome.to, SessionState::Active);
        assert_eq!(outcome.actions, vec![FlowAction::PromptNextField]);
    }

    #[test]
    fn completion_requires_clean_context() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(&SessionState::Active, &SessionEvent::CompletionConfirmed, &FlowContext::default())
            .expect("active -> completed");

        assert_eq!(outcome.to, SessionState::Completed);
        assert_eq!(outcome.actions.first(), Some(&FlowAction::PersistTerminalState));
        assert!(outcome.actions.contains(&FlowAction::ExportSubject));
        assert!(outcome.actions.contains(&FlowAction::NotifyStaff));
    }

    #[test]
    fn missing_fields_block_completion() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(
                &SessionState::Active,
                &SessionEvent::CompletionConfirmed,
                &FlowContext {
                    missing_required_fields: vec![FieldName::Stratum],
                    failed_requirements: Vec::new(),
                },
            )
            .expect_err("must reject missing fields");

        assert!(matches!(error, FlowTransitionError::MissingRequiredFields { .. }));
    }

    #[test]
    fn failed_requirements_block_completion() {
        let engine = FlowEngine::default();
        let error = engine
            .apply(
                &SessionState::Active,
                &SessionEvent::CompletionConfirmed,
                &FlowContext {
                    missing_required_fields: Vec::new(),
                    failed_requirements: vec!["optional_documents".to_owned()],
                },
            )
            .expect_err("must reject unmet requirements");

        assert!(matches!(error, FlowTransitionError::RequirementsNotMet { .. }));
    }

    #[test]
    fn terminal_states_reject_conversation_events() {
        let engine = FlowEngine::default();
        for state in [SessionState::Completed, SessionState::TimedOut] {
            for event in [
                SessionEvent::MessageProcessed,
                SessionEvent::CompletionConfirmed,
                SessionEvent::IdleTimeoutElapsed,
                SessionEvent::Superseded,
            ] {
                let error = engine
                    .apply(&state, &event, &FlowContext::default())
                    .expect_err("terminal state is immutable");
                assert!(matches!(error, FlowTransitionError::InvalidTransition { .. }));
            }
        }
    }

    #[test]
    fn admin_overrides_can_leave_terminal_states() {
        let engine = FlowEngine::default();
        let completed = engine
            .apply(&SessionState::TimedOut, &SessionEvent::AdminForceComplete, &FlowContext::default())
            .expect("timed out -> completed by admin");
        assert_eq!(completed.to, SessionState::Completed);

        let reopened = engine
            .apply(&SessionState::Completed, &SessionEvent::AdminReopen, &FlowContext::default())
            .expect("completed -> active by admin");
        assert_eq!(reopened.to, SessionState::Active);

        let error = engine
            .apply(&SessionState::Completed, &SessionEvent::AdminForceComplete, &FlowContext::default())
            .expect_err("already completed");
        assert!(matches!(error, FlowTransitionError::InvalidTransition { .. }));
    }

    #[test]
    fn idle_timeout_sends_notice_once() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(&SessionState::Active, &SessionEvent::IdleTimeoutElapsed, &FlowContext::default())
            .expect("active -> timed out");

        assert_eq!(outcome.to, SessionState::TimedOut);
        assert_eq!(
            outcome.actions.iter().filter(|action| **action == FlowAction::SendTimeoutNotice).count(),
            1
        );
    }

    #[test]
    fn superseded_session_closes_without_timeout_notice() {
        let engine = FlowEngine::default();
        let outcome = engine
            .apply(&SessionState::Active, &SessionEvent::Superseded, &FlowContext::default())
            .expect("active -> closed");

        assert_eq!(outcome.to, SessionState::TimedOut);
        assert_eq!(outcome.event, SessionEvent::Superseded);
        assert_eq!(outcome.actions, vec![FlowAction::PersistTerminalState]);
    }

    #[test]
    fn flow_transition_emits_audit_event() {
        let engine = FlowEngine::default();
        let sink = InMemoryAuditSink::default();

        let _ = engine
            .apply_with_audit(
                &SessionState::Active,
                &SessionEvent::IdleTimeoutElapsed,
                &FlowContext::default(),
                &sink,
                &AuditContext::new(
                    Some(PropertyId("PROP-9".to_owned())),
                    Some(ContactId("573009998877".to_owned())),
                    "sweep-1",
                    "idle-sweeper",
                ),
            )
            .expect("transition should succeed");

        let events = sink.events();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].correlation_id, "sweep-1");
        assert_eq!(events[0].event_type, "session.transition_applied");
        assert_eq!(events[0].metadata.get("to").map(String::as_str), Some("timed_out"));
        assert_eq!(ListingIntakeFlow.name(), engine.name());
    }
}
