//! In-memory wiring shared by the route tests.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use listing_agent::extraction::RuleBasedInterpreter;
use listing_agent::intent::KeywordClassifier;
use listing_agent::knowledge::KnowledgeBase;
use listing_agent::locks::ContactLocks;
use listing_agent::{Collaborators, ConversationManager};
use listing_core::audit::InMemoryAuditSink;
use listing_core::collaborators::{RecordingExporter, RecordingMessenger, RecordingNotifier};
use listing_core::config::AppConfig;
use listing_core::domain::property::{ContactId, OwnerDetails, PropertyId, PropertyRecord};
use listing_core::domain::session::Session;
use listing_db::{InMemoryPropertyRepository, InMemorySessionRepository, PropertyRepository, SessionRepository};

pub struct Fixture {
    pub manager: Arc<ConversationManager>,
    pub sessions: Arc<InMemorySessionRepository>,
    pub properties: Arc<InMemoryPropertyRepository>,
    pub messenger: RecordingMessenger,
    pub exporter: RecordingExporter,
    pub notifier: RecordingNotifier,
}

pub fn fixture() -> Fixture {
    let sessions = Arc::new(InMemorySessionRepository::default());
    let properties = Arc::new(InMemoryPropertyRepository::default());
    let messenger = RecordingMessenger::default();
    let exporter = RecordingExporter::default();
    let notifier = RecordingNotifier::default();
    let collaborators = Collaborators {
        sessions: sessions.clone(),
        properties: properties.clone(),
        messenger: Arc::new(messenger.clone()),
        interpreter: Arc::new(RuleBasedInterpreter::new()),
        classifier: Arc::new(KeywordClassifier),
        answers: Arc::new(KnowledgeBase::default()),
        exporter: Arc::new(exporter.clone()),
        notifier: Arc::new(notifier.clone()),
        audit: Arc::new(InMemoryAuditSink::default()),
    };
    let manager = Arc::new(ConversationManager::new(
        collaborators,
        AppConfig::default().conversation.completion_engine(),
        Arc::new(ContactLocks::new()),
    ));
    Fixture { manager, sessions, properties, messenger, exporter, notifier }
}

/// Opens an ACTIVE session for `number` with no fields recorded yet.
pub async fn open_session(fixture: &Fixture, number: &str, at: DateTime<Utc>) -> Session {
    let record = PropertyRecord::new(
        PropertyId::generate(),
        ContactId(number.to_string()),
        OwnerDetails { name: "Ana".to_string(), ..OwnerDetails::default() },
        at,
    );
    fixture.properties.create(record.clone()).await.expect("seed property");
    let session = Session::open(record.contact_id.clone(), record.id.clone(), at);
    fixture.sessions.create(session.clone()).await.expect("seed session");
    session
}
