use std::sync::Arc;

use axum::Router;
use listing_agent::extraction::RuleBasedInterpreter;
use listing_agent::intent::{IntentClassifier, KeywordClassifier, LlmClassifier};
use listing_agent::interpreter::{LlmInterpreter, ResponseInterpreter};
use listing_agent::knowledge::KnowledgeBase;
use listing_agent::llm::{LlmClient, OpenAiCompatibleClient};
use listing_agent::locks::ContactLocks;
use listing_agent::{AdminService, Collaborators, ConversationManager};
use listing_core::audit::TracingAuditSink;
use listing_core::collaborators::{
    CompletionNotifier, LoggingMessenger, NoopExporter, NoopNotifier, OutboundMessenger,
    SubjectExporter,
};
use listing_core::config::{AppConfig, ConfigError, LoadOptions};
use listing_db::{connect_with_settings, migrations, DbPool, SqlPropertyRepository, SqlSessionRepository};
use listing_whatsapp::{WebhookDispatcher, WhatsAppClient};
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::admin::{self, AdminState};
use crate::export::SheetsExporter;
use crate::health::{self, HealthState};
use crate::notify::EmailNotifier;
use crate::simulator::{self, SimulatorState};
use crate::webhooks::{self, ConversationInbound, WebhookState};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub manager: Arc<ConversationManager>,
    pub dispatcher: Arc<WebhookDispatcher>,
    pub messaging: &'static str,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("integration setup failed: {0}")]
    Integration(String),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let (collaborators, messaging) = build_collaborators(&config, &db_pool)?;
    let manager = Arc::new(ConversationManager::new(
        collaborators,
        config.conversation.completion_engine(),
        Arc::new(ContactLocks::new()),
    ));
    let dispatcher = Arc::new(WebhookDispatcher::new(Arc::new(ConversationInbound::new(manager.clone()))));

    info!(
        event_name = "system.bootstrap.ready",
        correlation_id = "bootstrap",
        messaging,
        llm_provider = ?config.llm.provider,
        export_enabled = config.export.enabled,
        notification_enabled = config.notification.enabled,
        "conversation runtime assembled"
    );

    Ok(Application { config, db_pool, manager, dispatcher, messaging })
}

/// Picks a live or offline implementation for every collaborator.
fn build_collaborators(
    config: &AppConfig,
    db_pool: &DbPool,
) -> Result<(Collaborators, &'static str), BootstrapError> {
    let integration = |error: &dyn std::fmt::Display| BootstrapError::Integration(error.to_string());

    let (messenger, messaging): (Arc<dyn OutboundMessenger>, &'static str) =
        match WhatsAppClient::from_config(&config.whatsapp).map_err(|error| integration(&error))? {
            Some(client) => (Arc::new(client), "whatsapp"),
            None => (Arc::new(LoggingMessenger), "logging"),
        };

    let (interpreter, classifier): (Arc<dyn ResponseInterpreter>, Arc<dyn IntentClassifier>) =
        match OpenAiCompatibleClient::from_config(&config.llm).map_err(|error| integration(&error))? {
            Some(client) => {
                let client: Arc<dyn LlmClient> = Arc::new(client);
                (Arc::new(LlmInterpreter::new(client.clone())), Arc::new(LlmClassifier::new(client)))
            }
            None => (Arc::new(RuleBasedInterpreter::new()), Arc::new(KeywordClassifier)),
        };

    let answers = match &config.conversation.knowledge_base_path {
        Some(path) => KnowledgeBase::from_json_file(path).map_err(|error| integration(&error))?,
        None => KnowledgeBase::default(),
    };

    let exporter: Arc<dyn SubjectExporter> =
        match SheetsExporter::from_config(&config.export).map_err(|error| integration(&error))? {
            Some(exporter) => Arc::new(exporter),
            None => Arc::new(NoopExporter),
        };

    let notifier: Arc<dyn CompletionNotifier> =
        match EmailNotifier::from_config(&config.notification).map_err(|error| integration(&error))? {
            Some(notifier) => Arc::new(notifier),
            None => Arc::new(NoopNotifier),
        };

    let collaborators = Collaborators {
        sessions: Arc::new(SqlSessionRepository::new(db_pool.clone())),
        properties: Arc::new(SqlPropertyRepository::new(db_pool.clone())),
        messenger,
        interpreter,
        classifier,
        answers: Arc::new(answers),
        exporter,
        notifier,
        audit: Arc::new(TracingAuditSink),
    };
    Ok((collaborators, messaging))
}

pub fn router(app: &Application) -> Router {
    let admin_api_key = app.config.admin.api_key.clone();
    Router::new()
        .merge(health::router(HealthState { db_pool: app.db_pool.clone(), messaging: app.messaging }))
        .merge(webhooks::router(WebhookState {
            dispatcher: app.dispatcher.clone(),
            verify_token: app.config.whatsapp.verify_token.clone(),
            app_secret: app.config.whatsapp.app_secret.clone(),
        }))
        .merge(simulator::router(SimulatorState {
            manager: app.manager.clone(),
            admin_api_key: admin_api_key.clone(),
        }))
        .merge(admin::router(AdminState {
            service: Arc::new(AdminService::for_manager(&app.manager)),
            api_key: admin_api_key,
        }))
        .layer(TraceLayer::new_for_http())
}
