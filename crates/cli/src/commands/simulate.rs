use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use listing_agent::extraction::RuleBasedInterpreter;
use listing_agent::intent::KeywordClassifier;
use listing_agent::knowledge::KnowledgeBase;
use listing_agent::locks::ContactLocks;
use listing_agent::{Collaborators, ConversationManager, Registration};
use listing_core::audit::InMemoryAuditSink;
use listing_core::collaborators::{RecordingExporter, RecordingMessenger, RecordingNotifier};
use listing_core::config::{AppConfig, LoadOptions};
use listing_core::domain::property::{ContactId, OwnerDetails, PropertyType};
use listing_db::{InMemoryPropertyRepository, InMemorySessionRepository, PropertyRepository};
use serde::Serialize;

use crate::commands::CommandResult;

#[derive(Debug, Clone, Default)]
pub struct SimulateArgs {
    pub name: String,
    pub phone: String,
    pub property_type: Option<String>,
    pub messages: Vec<String>,
    pub script: Option<PathBuf>,
}

#[derive(Debug, Serialize)]
pub struct Turn {
    pub seller: Option<String>,
    pub bot: String,
    pub outcome: &'static str,
}

#[derive(Debug, Serialize)]
pub struct Transcript {
    pub command: &'static str,
    pub status: &'static str,
    pub session_state: String,
    pub completion_percentage: f64,
    pub missing_fields: Vec<&'static str>,
    pub exported: bool,
    pub audit_events: usize,
    pub turns: Vec<Turn>,
}

pub fn run(args: SimulateArgs) -> CommandResult {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => {
            return CommandResult::failure(
                "simulate",
                "config_validation",
                format!("configuration issue: {error}"),
                2,
            );
        }
    };

    let property_type = match args.property_type.as_deref() {
        Some(raw) => match parse_property_type(raw) {
            Some(property_type) => Some(property_type),
            None => {
                return CommandResult::failure(
                    "simulate",
                    "invalid_argument",
                    format!("unknown property type `{raw}`"),
                    2,
                );
            }
        },
        None => None,
    };

    let mut messages = args.messages.clone();
    if let Some(path) = &args.script {
        match fs::read_to_string(path) {
            Ok(raw) => messages.extend(
                raw.lines().map(str::trim).filter(|line| !line.is_empty()).map(str::to_string),
            ),
            Err(error) => {
                return CommandResult::failure(
                    "simulate",
                    "script_read",
                    format!("failed to read {}: {error}", path.display()),
                    3,
                );
            }
        }
    }

    let answers = match &config.conversation.knowledge_base_path {
        Some(path) => match KnowledgeBase::from_json_file(path) {
            Ok(answers) => answers,
            Err(error) => {
                return CommandResult::failure("simulate", "knowledge_base", error.to_string(), 3);
            }
        },
        None => KnowledgeBase::default(),
    };

    let runtime = match tokio::runtime::Builder::new_current_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(error) => {
            return CommandResult::failure(
                "simulate",
                "runtime_init",
                format!("failed to initialize async runtime: {error}"),
                3,
            );
        }
    };

    let registration = Registration {
        contact: ContactId::normalized(&args.phone),
        owner: OwnerDetails { name: args.name.clone(), ..OwnerDetails::default() },
        property_type,
    };
    match runtime.block_on(simulate(&config, answers, registration, &messages)) {
        Ok(transcript) => CommandResult {
            exit_code: 0,
            output: serde_json::to_string_pretty(&transcript).unwrap_or_else(|error| {
                format!("{{\"command\":\"simulate\",\"status\":\"error\",\"message\":\"{error}\"}}")
            }),
        },
        Err(error) => CommandResult::failure("simulate", "conversation", error, 4),
    }
}

pub async fn simulate(
    config: &AppConfig,
    answers: KnowledgeBase,
    registration: Registration,
    messages: &[String],
) -> Result<Transcript, String> {
    let properties = Arc::new(InMemoryPropertyRepository::default());
    let exporter = RecordingExporter::default();
    let audit = InMemoryAuditSink::default();
    let collaborators = Collaborators {
        sessions: Arc::new(InMemorySessionRepository::default()),
        properties: properties.clone(),
        messenger: Arc::new(RecordingMessenger::default()),
        interpreter: Arc::new(RuleBasedInterpreter::new()),
        classifier: Arc::new(KeywordClassifier),
        answers: Arc::new(answers),
        exporter: Arc::new(exporter.clone()),
        notifier: Arc::new(RecordingNotifier::default()),
        audit: Arc::new(audit.clone()),
    };
    let manager = ConversationManager::new(
        collaborators,
        config.conversation.completion_engine(),
        Arc::new(ContactLocks::new()),
    );

    let contact = registration.contact.clone();
    let started = manager.start_session(registration).await.map_err(|error| error.to_string())?;
    let mut session = started.session;
    let mut turns = vec![Turn { seller: None, bot: started.welcome, outcome: "welcome" }];

    for message in messages {
        let processed = manager.handle_inbound(&contact, message).await.map_err(|error| error.to_string())?;
        if let Some(task) = processed.completion_task {
            let _ = task.await;
        }
        if let Some(current) = processed.session {
            session = current;
        }
        turns.push(Turn {
            seller: Some(message.clone()),
            bot: processed.reply,
            outcome: processed.outcome.label(),
        });
    }

    let record = properties
        .find_by_id(&session.property_id)
        .await
        .map_err(|error| error.to_string())?
        .ok_or_else(|| format!("property {} disappeared", session.property_id))?;
    let snapshot = manager.engine().tracker().completeness(&record.fields);

    Ok(Transcript {
        command: "simulate",
        status: "ok",
        session_state: session.state.as_str().to_string(),
        completion_percentage: snapshot.percentage,
        missing_fields: snapshot.missing_fields.iter().map(|field| field.as_str()).collect(),
        exported: !exporter.exported().is_empty(),
        audit_events: audit.events().len(),
        turns,
    })
}

fn parse_property_type(raw: &str) -> Option<PropertyType> {
    let normalized = raw.trim().to_lowercase().replace(' ', "_");
    PropertyType::ALL.into_iter().find(|candidate| candidate.synonyms().contains(&normalized.as_str()))
}

#[cfg(test)]
mod tests {
    use listing_core::domain::property::PropertyType;

    use super::parse_property_type;

    #[test]
    fn property_type_accepts_synonyms() {
        assert_eq!(parse_property_type("Apto"), Some(PropertyType::Apartment));
        assert_eq!(parse_property_type("casa"), Some(PropertyType::House));
        assert_eq!(parse_property_type("castillo"), None);
    }
}
