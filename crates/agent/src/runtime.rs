//! Per-message conversation state machine.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;
use thiserror::Error;
use tokio::task::JoinHandle;

use listing_core::audit::{AuditCategory, AuditContext, AuditEvent, AuditOutcome, AuditSink};
use listing_core::collaborators::{
    CompletionNotifier, Delivery, OutboundMessenger, SubjectExporter,
};
use listing_core::completion::{
    CoherenceIssueKind, CompletionEngine, RequirementCheck, RequirementReport,
};
use listing_core::domain::property::{
    ContactId, FieldName, FieldValue, OwnerDetails, PropertyFields, PropertyId, PropertyRecord,
    PropertyStatus, PropertyType,
};
use listing_core::domain::session::Session;
use listing_core::errors::{ApplicationError, DomainError};
use listing_core::flows::{
    FlowContext, FlowEngine, FlowTransitionError, ListingIntakeFlow, SessionEvent,
};
use listing_core::questions::{next_field, question_for};
use listing_core::validation::{SubjectContext, ValidationFailure};
use listing_db::{PropertyRepository, RepositoryError, SessionRepository};

use crate::completion::CompletionTrigger;
use crate::intent::{Intent, IntentClassifier};
use crate::interpreter::{Interpretation, ResponseInterpreter};
use crate::knowledge::{AnswerCollaborator, AnswerContext};
use crate::locks::ContactLocks;
use crate::replies;

pub const SUPERSEDED_REASON: &str = "superseded by new registration";
pub const COMPLETED_REASON: &str = "completed";

/// Everything the conversation talks to, injected at construction.
#[derive(Clone)]
pub struct Collaborators {
    pub sessions: Arc<dyn SessionRepository>,
    pub properties: Arc<dyn PropertyRepository>,
    pub messenger: Arc<dyn OutboundMessenger>,
    pub interpreter: Arc<dyn ResponseInterpreter>,
    pub classifier: Arc<dyn IntentClassifier>,
    pub answers: Arc<dyn AnswerCollaborator>,
    pub exporter: Arc<dyn SubjectExporter>,
    pub notifier: Arc<dyn CompletionNotifier>,
    pub audit: Arc<dyn AuditSink>,
}

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error("session not found: {0}")]
    SessionNotFound(String),
    #[error("property not found: {0}")]
    PropertyNotFound(String),
}

impl From<FlowTransitionError> for ConversationError {
    fn from(error: FlowTransitionError) -> Self {
        Self::Domain(DomainError::from(error))
    }
}

impl From<ConversationError> for ApplicationError {
    fn from(error: ConversationError) -> Self {
        match error {
            ConversationError::Persistence(RepositoryError::Conflict(message)) => {
                ApplicationError::Domain(DomainError::InvariantViolation(message))
            }
            ConversationError::Persistence(RepositoryError::NotFound(message))
            | ConversationError::SessionNotFound(message)
            | ConversationError::PropertyNotFound(message) => ApplicationError::NotFound(message),
            ConversationError::Persistence(other) => ApplicationError::Persistence(other.to_string()),
            ConversationError::Domain(domain) => ApplicationError::Domain(domain),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum MessageOutcome {
    NoActiveSession,
    QuestionAnswered,
    Clarification { rejected: Vec<FieldName> },
    Recorded { accepted: Vec<FieldName>, rejected: Vec<FieldName>, next_field: FieldName },
    AwaitingRequirements { accepted: Vec<FieldName>, blocking: Vec<String> },
    Completed,
}

impl MessageOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::NoActiveSession => "no_active_session",
            Self::QuestionAnswered => "question_answered",
            Self::Clarification { .. } => "clarification",
            Self::Recorded { .. } => "recorded",
            Self::AwaitingRequirements { .. } => "awaiting_requirements",
            Self::Completed => "completed",
        }
    }
}

#[derive(Debug)]
pub struct ProcessedMessage {
    pub reply: String,
    pub outcome: MessageOutcome,
    pub session: Option<Session>,
    pub delivery: Option<Delivery>,
    /// Export and notification fan-out, present once the session completed.
    pub completion_task: Option<JoinHandle<()>>,
}

impl ProcessedMessage {
    fn new(reply: String, outcome: MessageOutcome, session: Option<Session>) -> Self {
        Self { reply, outcome, session, delivery: None, completion_task: None }
    }
}

/// Seller and property details captured by the registration form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Registration {
    pub contact: ContactId,
    pub owner: OwnerDetails,
    pub property_type: Option<PropertyType>,
}

#[derive(Clone, Debug)]
pub struct StartedSession {
    pub session: Session,
    pub property: PropertyRecord,
    pub welcome: String,
    pub delivery: Delivery,
}

pub struct ConversationManager {
    collaborators: Collaborators,
    engine: CompletionEngine,
    flow: FlowEngine<ListingIntakeFlow>,
    locks: Arc<ContactLocks>,
    trigger: CompletionTrigger,
}

impl ConversationManager {
    pub fn new(collaborators: Collaborators, engine: CompletionEngine, locks: Arc<ContactLocks>) -> Self {
        let trigger = CompletionTrigger::new(
            Arc::clone(&collaborators.exporter),
            Arc::clone(&collaborators.notifier),
            Arc::clone(&collaborators.audit),
        );
        Self { collaborators, engine, flow: FlowEngine::default(), locks, trigger }
    }

    pub fn collaborators(&self) -> &Collaborators {
        &self.collaborators
    }

    pub fn engine(&self) -> &CompletionEngine {
        &self.engine
    }

    pub fn locks(&self) -> Arc<ContactLocks> {
        Arc::clone(&self.locks)
    }

    pub fn trigger(&self) -> &CompletionTrigger {
        &self.trigger
    }

    /// Processes one inbound message and sends the reply.
    ///
    /// Persistence failures send a fixed apology, leave the session as it was
    /// and are returned to the caller.
    pub async fn handle_inbound(
        &self,
        contact: &ContactId,
        text: &str,
    ) -> Result<ProcessedMessage, ConversationError> {
        self.handle_inbound_at(contact, text, Utc::now()).await
    }

    pub async fn handle_inbound_at(
        &self,
        contact: &ContactId,
        text: &str,
        now: DateTime<Utc>,
    ) -> Result<ProcessedMessage, ConversationError> {
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let _guard = self.locks.lock(contact).await;
        tracing::debug!(
            event_name = "conversation.message_received",
            contact_id = %contact,
            correlation_id = %correlation_id,
            chars = text.chars().count(),
            "inbound message"
        );

        match self.process_message(contact, text, now, &correlation_id).await {
            Ok(mut processed) => {
                let property_id = processed.session.as_ref().map(|session| &session.property_id);
                let delivery =
                    deliver(self.collaborators.messenger.as_ref(), contact, &processed.reply, property_id)
                        .await;
                processed.delivery = Some(delivery);
                Ok(processed)
            }
            Err(error) => {
                tracing::error!(
                    event_name = "conversation.message_failed",
                    contact_id = %contact,
                    correlation_id = %correlation_id,
                    error = %error,
                    "message processing failed; session left unchanged"
                );
                deliver(self.collaborators.messenger.as_ref(), contact, replies::APOLOGY, None).await;
                Err(error)
            }
        }
    }

    async fn process_message(
        &self,
        contact: &ContactId,
        text: &str,
        now: DateTime<Utc>,
        correlation_id: &str,
    ) -> Result<ProcessedMessage, ConversationError> {
        let Some(mut session) = self.collaborators.sessions.find_active_by_contact(contact).await?
        else {
            tracing::info!(
                event_name = "conversation.no_active_session",
                contact_id = %contact,
                "message from contact without an active session"
            );
            return Ok(ProcessedMessage::new(
                replies::NO_ACTIVE_SESSION.to_string(),
                MessageOutcome::NoActiveSession,
                None,
            ));
        };
        let mut record = self
            .collaborators
            .properties
            .find_by_id(&session.property_id)
            .await?
            .ok_or_else(|| ConversationError::PropertyNotFound(session.property_id.to_string()))?;

        session.touch(now);
        let audit = AuditContext::new(
            Some(record.id.clone()),
            Some(contact.clone()),
            correlation_id,
            "conversation",
        );

        let intent = match self.collaborators.classifier.classify(text).await {
            Ok(intent) => intent,
            Err(error) => {
                tracing::warn!(
                    event_name = "conversation.classification_failed",
                    contact_id = %contact,
                    property_id = %record.id,
                    error = %error,
                    "intent classification failed; treating message as an answer"
                );
                Intent::Answer
            }
        };

        if intent == Intent::Question {
            return self.answer_question(session, &record, text, &audit).await;
        }

        let current_field = session.context.current_field;
        let interpretation = self
            .collaborators
            .interpreter
            .interpret(text, current_field, &SubjectContext::from_fields(&record.fields))
            .await;
        let extracted = match interpretation {
            Interpretation::Extracted(extracted) => extracted,
            Interpretation::Failed(reason) => {
                tracing::info!(
                    event_name = "conversation.interpretation_failed",
                    contact_id = %contact,
                    property_id = %record.id,
                    field = current_field.map(|field| field.as_str()).unwrap_or("none"),
                    reason = %reason,
                    "nothing usable extracted from reply"
                );
                self.collaborators.sessions.save(session.clone()).await?;
                let reply = replies::clarification(&[], current_field);
                return Ok(ProcessedMessage::new(
                    reply,
                    MessageOutcome::Clarification { rejected: Vec::new() },
                    Some(session),
                ));
            }
        };

        let stored = record.clone();
        let (accepted, rejected) = self.apply_fields(&mut record.fields, extracted, &audit);
        let rejected_fields: Vec<FieldName> = rejected.iter().map(|failure| failure.field).collect();

        if accepted.is_empty() {
            self.collaborators.sessions.save(session.clone()).await?;
            let reply = replies::clarification(&rejected, current_field);
            return Ok(ProcessedMessage::new(
                reply,
                MessageOutcome::Clarification { rejected: rejected_fields },
                Some(session),
            ));
        }

        record.updated_at = now;
        for (field, _) in &accepted {
            session.context.record_collected(*field);
        }
        if record.fields.floor.is_none() {
            session.context.collected_fields.remove(&FieldName::Floor);
        }
        session.context.step += 1;

        let accepted_fields: Vec<FieldName> = accepted.iter().map(|(field, _)| *field).collect();
        self.collaborators.audit.emit(
            AuditEvent::new(&audit, "conversation.fields_recorded", AuditCategory::Validation, AuditOutcome::Success)
                .with_metadata("accepted", join_fields(&accepted_fields))
                .with_metadata("rejected", join_fields(&rejected_fields)),
        );

        let confirmation = replies::confirmation(&accepted);
        let rejection_note = replies::rejections(&rejected);
        let assessment = self.engine.assess(&record.fields);

        if assessment.is_complete() {
            let outcome = self.flow.apply_with_audit(
                &session.state,
                &SessionEvent::CompletionConfirmed,
                &assessment.flow_context(),
                self.collaborators.audit.as_ref(),
                &audit,
            )?;
            session.state = outcome.to;
            session.closed_reason = Some(COMPLETED_REASON.to_string());
            session.context.current_field = None;

            record.status = PropertyStatus::Complete;
            self.persist_turn(&stored, &record, &session, now).await?;

            tracing::info!(
                event_name = "conversation.completed",
                contact_id = %contact,
                property_id = %record.id,
                percentage = assessment.snapshot.percentage,
                "property registration completed"
            );
            let reply = replies::compose([
                confirmation,
                rejection_note,
                Some(replies::completed(&record.owner.name)),
            ]);
            let mut processed =
                ProcessedMessage::new(reply, MessageOutcome::Completed, Some(session));
            processed.completion_task = Some(self.trigger.fire(record));
            return Ok(processed);
        }

        self.flow.apply_with_audit(
            &session.state,
            &SessionEvent::MessageProcessed,
            &FlowContext::default(),
            self.collaborators.audit.as_ref(),
            &audit,
        )?;

        let (reply, outcome) = match next_field(self.engine.tracker(), &record.fields) {
            Some(next) => {
                session.context.current_field = Some(next);
                let reply = replies::compose([
                    confirmation,
                    rejection_note,
                    Some(question_for(next).to_string()),
                ]);
                (
                    reply,
                    MessageOutcome::Recorded {
                        accepted: accepted_fields,
                        rejected: rejected_fields,
                        next_field: next,
                    },
                )
            }
            None => {
                let report = assessment.requirements.as_ref();
                let pending = report.and_then(|report| field_to_fix(report, &record.fields));
                let details = report.map(RequirementReport::blocking_details).unwrap_or_default();
                session.context.current_field = pending;
                tracing::info!(
                    event_name = "conversation.awaiting_requirements",
                    contact_id = %contact,
                    property_id = %record.id,
                    blocking = ?report.map(RequirementReport::blocking).unwrap_or_default(),
                    "all fields present but minimum requirements not met"
                );
                let reply = replies::compose([
                    confirmation,
                    rejection_note,
                    Some(replies::almost_done(&details, pending)),
                ]);
                (
                    reply,
                    MessageOutcome::AwaitingRequirements {
                        accepted: accepted_fields,
                        blocking: report.map(RequirementReport::blocking).unwrap_or_default(),
                    },
                )
            }
        };

        self.persist_turn(&stored, &record, &session, now).await?;
        Ok(ProcessedMessage::new(reply, outcome, Some(session)))
    }

    /// Writes the record and then the session. When any write fails the record
    /// is put back as `stored`, so it never runs ahead of its session.
    async fn persist_turn(
        &self,
        stored: &PropertyRecord,
        record: &PropertyRecord,
        session: &Session,
        now: DateTime<Utc>,
    ) -> Result<(), ConversationError> {
        let properties = self.collaborators.properties.as_ref();
        let written = async {
            properties.update_fields(&record.id, &record.fields, now).await?;
            if record.status != stored.status {
                properties.update_status(&record.id, record.status.clone(), now).await?;
            }
            self.collaborators.sessions.save(session.clone()).await
        }
        .await;
        let Err(error) = written else {
            return Ok(());
        };

        let restored = async {
            properties.update_fields(&stored.id, &stored.fields, stored.updated_at).await?;
            properties.update_status(&stored.id, stored.status.clone(), stored.updated_at).await
        }
        .await;
        if let Err(restore_error) = restored {
            tracing::error!(
                event_name = "conversation.rollback_failed",
                contact_id = %session.contact_id,
                property_id = %stored.id,
                error = %restore_error,
                "could not restore property after a failed write"
            );
        }
        Err(error.into())
    }

    async fn answer_question(
        &self,
        session: Session,
        record: &PropertyRecord,
        text: &str,
        audit: &AuditContext,
    ) -> Result<ProcessedMessage, ConversationError> {
        let pending = session.context.current_field;
        let context = AnswerContext { current_field: pending, owner_name: Some(record.owner.name.clone()) };
        let answer = self.collaborators.answers.answer(text, &context).await;

        self.collaborators.sessions.save(session.clone()).await?;
        self.collaborators.audit.emit(AuditEvent::new(
            audit,
            "conversation.question_answered",
            AuditCategory::Conversation,
            AuditOutcome::Success,
        ));

        let reply = replies::compose([Some(answer), pending.map(|field| question_for(field).to_string())]);
        Ok(ProcessedMessage::new(reply, MessageOutcome::QuestionAnswered, Some(session)))
    }

    /// Validates every extracted field against the record as it evolves.
    /// The property type goes first since floor validity depends on it.
    fn apply_fields(
        &self,
        fields: &mut PropertyFields,
        extracted: BTreeMap<FieldName, Value>,
        audit: &AuditContext,
    ) -> (Vec<(FieldName, FieldValue)>, Vec<ValidationFailure>) {
        let validator = self.engine.tracker().validator();
        let mut ordered: Vec<(FieldName, Value)> = extracted.into_iter().collect();
        ordered.sort_by_key(|(field, _)| *field != FieldName::PropertyType);

        let mut accepted = Vec::new();
        let mut rejected = Vec::new();
        for (field, raw) in ordered {
            let context = SubjectContext::from_fields(fields);
            let result = validator
                .validate(field, &raw, &context)
                .and_then(|value| match fields.set(field, value.clone()) {
                    Ok(()) => Ok(value),
                    Err(error) => Err(ValidationFailure::new(field, error.to_string())),
                });
            match result {
                Ok(value) => {
                    tracing::debug!(
                        event_name = "conversation.field_accepted",
                        contact_id = audit.contact_id.as_ref().map(ContactId::as_str).unwrap_or("unknown"),
                        field = field.as_str(),
                        "field accepted"
                    );
                    accepted.push((field, value));
                }
                Err(failure) => {
                    tracing::info!(
                        event_name = "conversation.field_rejected",
                        contact_id = audit.contact_id.as_ref().map(ContactId::as_str).unwrap_or("unknown"),
                        property_id = audit.property_id.as_ref().map(|id| id.0.as_str()).unwrap_or("unknown"),
                        field = field.as_str(),
                        reason = %failure.reason,
                        "field rejected by validator"
                    );
                    rejected.push(failure);
                }
            }
        }

        if fields.floor.is_some() && !FieldName::Floor.is_applicable(fields.property_type) {
            fields.clear(FieldName::Floor);
        }
        (accepted, rejected)
    }

    /// Registers the property from the form and opens its conversation.
    /// An active session already open for the contact is closed first.
    pub async fn start_session(
        &self,
        registration: Registration,
    ) -> Result<StartedSession, ConversationError> {
        self.start_session_at(registration, Utc::now()).await
    }

    pub async fn start_session_at(
        &self,
        registration: Registration,
        now: DateTime<Utc>,
    ) -> Result<StartedSession, ConversationError> {
        let contact = registration.contact.clone();
        let correlation_id = uuid::Uuid::new_v4().to_string();
        let _guard = self.locks.lock(&contact).await;

        if let Some(mut previous) = self.collaborators.sessions.find_active_by_contact(&contact).await? {
            let audit = AuditContext::new(
                Some(previous.property_id.clone()),
                Some(contact.clone()),
                correlation_id.as_str(),
                "registration",
            );
            let outcome = self.flow.apply_with_audit(
                &previous.state,
                &SessionEvent::Superseded,
                &FlowContext::default(),
                self.collaborators.audit.as_ref(),
                &audit,
            )?;
            previous.state = outcome.to;
            previous.closed_reason = Some(SUPERSEDED_REASON.to_string());
            previous.context.current_field = None;
            previous.updated_at = now;
            self.collaborators.sessions.save(previous.clone()).await?;
            tracing::info!(
                event_name = "conversation.session_superseded",
                contact_id = %contact,
                session_id = %previous.id,
                "closed previous session for new registration"
            );
        }

        let mut record = PropertyRecord::new(PropertyId::generate(), contact.clone(), registration.owner, now);
        record.fields.property_type = registration.property_type;
        self.collaborators.properties.create(record.clone()).await?;

        let mut session = Session::open(contact.clone(), record.id.clone(), now);
        if record.fields.property_type.is_some() {
            session.context.record_collected(FieldName::PropertyType);
        }
        session.context.current_field = next_field(self.engine.tracker(), &record.fields);
        self.collaborators.sessions.create(session.clone()).await?;

        let audit = AuditContext::new(
            Some(record.id.clone()),
            Some(contact.clone()),
            correlation_id.as_str(),
            "registration",
        );
        self.collaborators.audit.emit(
            AuditEvent::new(&audit, "session.started", AuditCategory::Ingress, AuditOutcome::Success)
                .with_metadata("session_id", session.id.0.clone()),
        );
        tracing::info!(
            event_name = "conversation.session_started",
            contact_id = %contact,
            property_id = %record.id,
            session_id = %session.id,
            "registration opened a conversation"
        );

        let welcome = replies::welcome(&record.owner.name, session.context.current_field);
        let delivery =
            deliver(self.collaborators.messenger.as_ref(), &contact, &welcome, Some(&record.id)).await;
        Ok(StartedSession { session, property: record, welcome, delivery })
    }
}

/// Sends a message; failures are logged and never change session state.
pub(crate) async fn deliver(
    messenger: &dyn OutboundMessenger,
    contact: &ContactId,
    text: &str,
    property_id: Option<&PropertyId>,
) -> Delivery {
    let delivery = messenger.send(contact, text).await;
    if let Delivery::Failed { error } = &delivery {
        tracing::warn!(
            event_name = "messaging.delivery_failed",
            contact_id = %contact,
            property_id = property_id.map(|id| id.0.as_str()).unwrap_or("unknown"),
            error = %error,
            "outbound message was not delivered"
        );
    }
    delivery
}

/// Field to re-ask so the seller can clear the first blocking requirement.
pub fn field_to_fix(report: &RequirementReport, fields: &PropertyFields) -> Option<FieldName> {
    let from_checks = report.checks.iter().filter(|check| !check.passed).find_map(|check| match check.check {
        RequirementCheck::ExistenceCertificate => Some(FieldName::ExistenceCertificate),
        RequirementCheck::OptionalDocuments => FieldName::OPTIONAL_DOCUMENTS
            .into_iter()
            .find(|field| fields.get(*field) != Some(FieldValue::Flag(true))),
        RequirementCheck::MinimumPhotos => Some(FieldName::PhotoCount),
        RequirementCheck::DescriptionLength => Some(FieldName::Description),
    });
    if from_checks.is_some() || report.passed() {
        return from_checks;
    }
    report.issues.iter().find_map(|issue| match issue.kind {
        CoherenceIssueKind::NewConditionTooOld => Some(FieldName::Condition),
        CoherenceIssueKind::AreaPerRoom => Some(FieldName::BuiltArea),
        CoherenceIssueKind::PricePerArea => Some(FieldName::SalePrice),
        CoherenceIssueKind::FloorNotApplicable => None,
    })
}

fn join_fields(fields: &[FieldName]) -> String {
    fields.iter().map(FieldName::as_str).collect::<Vec<_>>().join(",")
}
