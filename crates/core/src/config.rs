use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use secrecy::{ExposeSecret, SecretString};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::completion::{
    CoherencePolicy, CompletionEngine, CompletionTracker, RequirementGate, RequirementPolicy,
    TrackerConfig,
};
use crate::validation::{FieldValidator, ValidationRules};

#[derive(Clone, Debug)]
pub struct AppConfig {
    pub database: DatabaseConfig,
    pub whatsapp: WhatsAppConfig,
    pub llm: LlmConfig,
    pub server: ServerConfig,
    pub conversation: ConversationConfig,
    pub export: ExportConfig,
    pub notification: NotificationConfig,
    pub admin: AdminConfig,
    pub logging: LoggingConfig,
}

#[derive(Clone, Debug)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct WhatsAppConfig {
    pub enabled: bool,
    pub api_base_url: String,
    pub phone_number_id: Option<String>,
    pub access_token: Option<SecretString>,
    pub verify_token: Option<SecretString>,
    /// Enables `X-Hub-Signature-256` verification on inbound webhooks when set.
    pub app_secret: Option<SecretString>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct LlmConfig {
    pub provider: LlmProvider,
    pub api_key: Option<SecretString>,
    pub base_url: Option<String>,
    pub model: String,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub bind_address: String,
    pub port: u16,
    pub graceful_shutdown_secs: u64,
}

#[derive(Clone, Debug)]
pub struct ConversationConfig {
    pub idle_timeout_secs: u64,
    pub sweep_interval_secs: u64,
    pub min_photos: i64,
    pub tracker_min_photos: i64,
    pub min_description_words: usize,
    pub min_optional_documents: usize,
    pub coherence_policy: CoherencePolicy,
    pub knowledge_base_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct ExportConfig {
    pub enabled: bool,
    pub sheets_webhook_url: Option<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct NotificationConfig {
    pub enabled: bool,
    pub api_url: Option<String>,
    pub api_key: Option<SecretString>,
    pub from: Option<String>,
    pub recipients: Vec<String>,
    pub timeout_secs: u64,
}

#[derive(Clone, Debug)]
pub struct AdminConfig {
    pub api_key: Option<SecretString>,
}

#[derive(Clone, Debug)]
pub struct LoggingConfig {
    pub level: String,
    pub format: LogFormat,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LlmProvider {
    /// Offline keyword/regex interpretation, no network calls.
    Rules,
    OpenAi,
    Ollama,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LogFormat {
    Compact,
    Pretty,
    Json,
}

#[derive(Clone, Debug, Default)]
pub struct ConfigOverrides {
    pub database_url: Option<String>,
    pub log_level: Option<String>,
    pub llm_provider: Option<LlmProvider>,
    pub llm_model: Option<String>,
    pub whatsapp_enabled: Option<bool>,
    pub idle_timeout_secs: Option<u64>,
    pub coherence_policy: Option<CoherencePolicy>,
    pub admin_api_key: Option<String>,
}

#[derive(Clone, Debug, Default)]
pub struct LoadOptions {
    pub config_path: Option<PathBuf>,
    pub require_file: bool,
    pub overrides: ConfigOverrides,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("could not read config file `{path}`: {source}")]
    ReadFile { path: PathBuf, source: std::io::Error },
    #[error("could not parse config file `{path}`: {source}")]
    ParseFile { path: PathBuf, source: toml::de::Error },
    #[error("required config file was not found: `{0}`")]
    MissingConfigFile(PathBuf),
    #[error("environment variable interpolation failed for `{var}`")]
    MissingEnvInterpolation { var: String },
    #[error("unterminated environment interpolation expression")]
    UnterminatedInterpolation,
    #[error("invalid environment override for `{key}`: `{value}`")]
    InvalidEnvOverride { key: String, value: String },
    #[error("configuration validation failed: {0}")]
    Validation(String),
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database: DatabaseConfig {
                url: "sqlite://listing.db".to_string(),
                max_connections: 5,
                timeout_secs: 30,
            },
            whatsapp: WhatsAppConfig {
                enabled: false,
                api_base_url: "https://graph.facebook.com/v19.0".to_string(),
                phone_number_id: None,
                access_token: None,
                verify_token: None,
                app_secret: None,
                timeout_secs: 15,
            },
            llm: LlmConfig {
                provider: LlmProvider::Rules,
                api_key: None,
                base_url: None,
                model: "gpt-4o-mini".to_string(),
                timeout_secs: 30,
            },
            server: ServerConfig {
                bind_address: "127.0.0.1".to_string(),
                port: 8080,
                graceful_shutdown_secs: 15,
            },
            conversation: ConversationConfig {
                idle_timeout_secs: 24 * 60 * 60,
                sweep_interval_secs: 5 * 60,
                min_photos: 5,
                tracker_min_photos: 5,
                min_description_words: 50,
                min_optional_documents: 4,
                coherence_policy: CoherencePolicy::Advisory,
                knowledge_base_path: None,
            },
            export: ExportConfig { enabled: false, sheets_webhook_url: None, timeout_secs: 20 },
            notification: NotificationConfig {
                enabled: false,
                api_url: None,
                api_key: None,
                from: None,
                recipients: Vec::new(),
                timeout_secs: 20,
            },
            admin: AdminConfig { api_key: None },
            logging: LoggingConfig { level: "info".to_string(), format: LogFormat::Compact },
        }
    }
}

fn secret_value(value: String) -> SecretString {
    value.into()
}

impl std::str::FromStr for LlmProvider {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "rules" => Ok(Self::Rules),
            "openai" | "open_ai" => Ok(Self::OpenAi),
            "ollama" => Ok(Self::Ollama),
            other => Err(ConfigError::Validation(format!(
                "unsupported llm provider `{other}` (expected rules|openai|ollama)"
            ))),
        }
    }
}

impl std::str::FromStr for LogFormat {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "compact" => Ok(Self::Compact),
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(ConfigError::Validation(format!(
                "unsupported log format `{other}` (expected compact|pretty|json)"
            ))),
        }
    }
}

impl ConversationConfig {
    pub fn validation_rules(&self) -> ValidationRules {
        ValidationRules { min_description_words: self.min_description_words, ..ValidationRules::default() }
    }

    pub fn tracker_config(&self) -> TrackerConfig {
        TrackerConfig { min_photos: self.tracker_min_photos }
    }

    pub fn requirement_policy(&self) -> RequirementPolicy {
        RequirementPolicy {
            min_optional_documents: self.min_optional_documents,
            min_photos: self.min_photos,
            min_description_words: self.min_description_words,
            coherence: self.coherence_policy,
            ..RequirementPolicy::default()
        }
    }

    pub fn completion_engine(&self) -> CompletionEngine {
        CompletionEngine::new(
            CompletionTracker::new(FieldValidator::new(self.validation_rules()), self.tracker_config()),
            RequirementGate::new(self.requirement_policy()),
        )
    }
}

impl AppConfig {
    pub fn load(options: LoadOptions) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        let maybe_path = resolve_config_path(options.config_path.as_deref());

        if let Some(path) = maybe_path {
            let patch = read_patch(&path)?;
            config.apply_patch(patch);
        } else if options.require_file {
            let expected = options.config_path.unwrap_or_else(|| PathBuf::from("listing.toml"));
            return Err(ConfigError::MissingConfigFile(expected));
        }

        config.apply_env_overrides()?;
        config.apply_overrides(options.overrides);
        config.validate()?;

        Ok(config)
    }

    fn apply_patch(&mut self, patch: ConfigPatch) {
        if let Some(database) = patch.database {
            if let Some(url) = database.url {
                self.database.url = url;
            }
            if let Some(max_connections) = database.max_connections {
                self.database.max_connections = max_connections;
            }
            if let Some(timeout_secs) = database.timeout_secs {
                self.database.timeout_secs = timeout_secs;
            }
        }

        if let Some(whatsapp) = patch.whatsapp {
            if let Some(enabled) = whatsapp.enabled {
                self.whatsapp.enabled = enabled;
            }
            if let Some(api_base_url) = whatsapp.api_base_url {
                self.whatsapp.api_base_url = api_base_url;
            }
            if let Some(phone_number_id) = whatsapp.phone_number_id {
                self.whatsapp.phone_number_id = Some(phone_number_id);
            }
            if let Some(access_token) = whatsapp.access_token {
                self.whatsapp.access_token = Some(secret_value(access_token));
            }
            if let Some(verify_token) = whatsapp.verify_token {
                self.whatsapp.verify_token = Some(secret_value(verify_token));
            }
            if let Some(app_secret) = whatsapp.app_secret {
                self.whatsapp.app_secret = Some(secret_value(app_secret));
            }
            if let Some(timeout_secs) = whatsapp.timeout_secs {
                self.whatsapp.timeout_secs = timeout_secs;
            }
        }

        if let Some(llm) = patch.llm {
            if let Some(provider) = llm.provider {
                self.llm.provider = provider;
            }
            if let Some(api_key) = llm.api_key {
                self.llm.api_key = Some(secret_value(api_key));
            }
            if let Some(base_url) = llm.base_url {
                self.llm.base_url = Some(base_url);
            }
            if let Some(model) = llm.model {
                self.llm.model = model;
            }
            if let Some(timeout_secs) = llm.timeout_secs {
                self.llm.timeout_secs = timeout_secs;
            }
        }

        if let Some(server) = patch.server {
            if let Some(bind_address) = server.bind_address {
                self.server.bind_address = bind_address;
            }
            if let Some(port) = server.port {
                self.server.port = port;
            }
            if let Some(graceful_shutdown_secs) = server.graceful_shutdown_secs {
                self.server.graceful_shutdown_secs = graceful_shutdown_secs;
            }
        }

        if let Some(conversation) = patch.conversation {
            if let Some(idle_timeout_secs) = conversation.idle_timeout_secs {
                self.conversation.idle_timeout_secs = idle_timeout_secs;
            }
            if let Some(sweep_interval_secs) = conversation.sweep_interval_secs {
                self.conversation.sweep_interval_secs = sweep_interval_secs;
            }
            if let Some(min_photos) = conversation.min_photos {
                self.conversation.min_photos = min_photos;
            }
            if let Some(tracker_min_photos) = conversation.tracker_min_photos {
                self.conversation.tracker_min_photos = tracker_min_photos;
            }
            if let Some(min_description_words) = conversation.min_description_words {
                self.conversation.min_description_words = min_description_words;
            }
            if let Some(min_optional_documents) = conversation.min_optional_documents {
                self.conversation.min_optional_documents = min_optional_documents;
            }
            if let Some(coherence_policy) = conversation.coherence_policy {
                self.conversation.coherence_policy = coherence_policy;
            }
            if let Some(knowledge_base_path) = conversation.knowledge_base_path {
                self.conversation.knowledge_base_path = Some(knowledge_base_path);
            }
        }

        if let Some(export) = patch.export {
            if let Some(enabled) = export.enabled {
                self.export.enabled = enabled;
            }
            if let Some(sheets_webhook_url) = export.sheets_webhook_url {
                self.export.sheets_webhook_url = Some(sheets_webhook_url);
            }
            if let Some(timeout_secs) = export.timeout_secs {
                self.export.timeout_secs = timeout_secs;
            }
        }

        if let Some(notification) = patch.notification {
            if let Some(enabled) = notification.enabled {
                self.notification.enabled = enabled;
            }
            if let Some(api_url) = notification.api_url {
                self.notification.api_url = Some(api_url);
            }
            if let Some(api_key) = notification.api_key {
                self.notification.api_key = Some(secret_value(api_key));
            }
            if let Some(from) = notification.from {
                self.notification.from = Some(from);
            }
            if let Some(recipients) = notification.recipients {
                self.notification.recipients = recipients;
            }
            if let Some(timeout_secs) = notification.timeout_secs {
                self.notification.timeout_secs = timeout_secs;
            }
        }

        if let Some(admin) = patch.admin {
            if let Some(api_key) = admin.api_key {
                self.admin.api_key = Some(secret_value(api_key));
            }
        }

        if let Some(logging) = patch.logging {
            if let Some(level) = logging.level {
                self.logging.level = level;
            }
            if let Some(format) = logging.format {
                self.logging.format = format;
            }
        }
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        if let Some(value) = read_env("LISTING_DATABASE_URL") {
            self.database.url = value;
        }
        if let Some(value) = read_env("LISTING_DATABASE_MAX_CONNECTIONS") {
            self.database.max_connections = parse_u32("LISTING_DATABASE_MAX_CONNECTIONS", &value)?;
        }
        if let Some(value) = read_env("LISTING_DATABASE_TIMEOUT_SECS") {
            self.database.timeout_secs = parse_u64("LISTING_DATABASE_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LISTING_WHATSAPP_ENABLED") {
            self.whatsapp.enabled = parse_bool("LISTING_WHATSAPP_ENABLED", &value)?;
        }
        if let Some(value) = read_env("LISTING_WHATSAPP_API_BASE_URL") {
            self.whatsapp.api_base_url = value;
        }
        if let Some(value) = read_env("LISTING_WHATSAPP_PHONE_NUMBER_ID") {
            self.whatsapp.phone_number_id = Some(value);
        }
        if let Some(value) = read_env("LISTING_WHATSAPP_ACCESS_TOKEN") {
            self.whatsapp.access_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("LISTING_WHATSAPP_VERIFY_TOKEN") {
            self.whatsapp.verify_token = Some(secret_value(value));
        }
        if let Some(value) = read_env("LISTING_WHATSAPP_APP_SECRET") {
            self.whatsapp.app_secret = Some(secret_value(value));
        }

        if let Some(value) = read_env("LISTING_LLM_PROVIDER") {
            self.llm.provider = value.parse()?;
        }
        if let Some(value) = read_env("LISTING_LLM_API_KEY") {
            self.llm.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("LISTING_LLM_BASE_URL") {
            self.llm.base_url = Some(value);
        }
        if let Some(value) = read_env("LISTING_LLM_MODEL") {
            self.llm.model = value;
        }
        if let Some(value) = read_env("LISTING_LLM_TIMEOUT_SECS") {
            self.llm.timeout_secs = parse_u64("LISTING_LLM_TIMEOUT_SECS", &value)?;
        }

        if let Some(value) = read_env("LISTING_SERVER_BIND_ADDRESS") {
            self.server.bind_address = value;
        }
        if let Some(value) = read_env("LISTING_SERVER_PORT") {
            self.server.port = parse_u16("LISTING_SERVER_PORT", &value)?;
        }
        if let Some(value) = read_env("LISTING_SERVER_GRACEFUL_SHUTDOWN_SECS") {
            self.server.graceful_shutdown_secs =
                parse_u64("LISTING_SERVER_GRACEFUL_SHUTDOWN_SECS", &value)?;
        }

        if let Some(value) = read_env("LISTING_CONVERSATION_IDLE_TIMEOUT_SECS") {
            self.conversation.idle_timeout_secs =
                parse_u64("LISTING_CONVERSATION_IDLE_TIMEOUT_SECS", &value)?;
        }
        if let Some(value) = read_env("LISTING_CONVERSATION_SWEEP_INTERVAL_SECS") {
            self.conversation.sweep_interval_secs =
                parse_u64("LISTING_CONVERSATION_SWEEP_INTERVAL_SECS", &value)?;
        }
        if let Some(value) = read_env("LISTING_CONVERSATION_MIN_OPTIONAL_DOCUMENTS") {
            self.conversation.min_optional_documents =
                parse_u32("LISTING_CONVERSATION_MIN_OPTIONAL_DOCUMENTS", &value)? as usize;
        }
        if let Some(value) = read_env("LISTING_CONVERSATION_COHERENCE_POLICY") {
            self.conversation.coherence_policy =
                value.parse().map_err(|_| ConfigError::InvalidEnvOverride {
                    key: "LISTING_CONVERSATION_COHERENCE_POLICY".to_string(),
                    value: value.clone(),
                })?;
        }
        if let Some(value) = read_env("LISTING_CONVERSATION_KNOWLEDGE_BASE_PATH") {
            self.conversation.knowledge_base_path = Some(PathBuf::from(value));
        }

        if let Some(value) = read_env("LISTING_EXPORT_ENABLED") {
            self.export.enabled = parse_bool("LISTING_EXPORT_ENABLED", &value)?;
        }
        if let Some(value) = read_env("LISTING_EXPORT_SHEETS_WEBHOOK_URL") {
            self.export.sheets_webhook_url = Some(value);
        }

        if let Some(value) = read_env("LISTING_NOTIFICATION_ENABLED") {
            self.notification.enabled = parse_bool("LISTING_NOTIFICATION_ENABLED", &value)?;
        }
        if let Some(value) = read_env("LISTING_NOTIFICATION_API_URL") {
            self.notification.api_url = Some(value);
        }
        if let Some(value) = read_env("LISTING_NOTIFICATION_API_KEY") {
            self.notification.api_key = Some(secret_value(value));
        }
        if let Some(value) = read_env("LISTING_NOTIFICATION_FROM") {
            self.notification.from = Some(value);
        }
        if let Some(value) = read_env("LISTING_NOTIFICATION_RECIPIENTS") {
            self.notification.recipients = value
                .split(',')
                .map(str::trim)
                .filter(|recipient| !recipient.is_empty())
                .map(str::to_string)
                .collect();
        }

        if let Some(value) = read_env("LISTING_ADMIN_API_KEY") {
            self.admin.api_key = Some(secret_value(value));
        }

        let log_level = read_env("LISTING_LOGGING_LEVEL").or_else(|| read_env("LISTING_LOG_LEVEL"));
        if let Some(value) = log_level {
            self.logging.level = value;
        }
        let log_format =
            read_env("LISTING_LOGGING_FORMAT").or_else(|| read_env("LISTING_LOG_FORMAT"));
        if let Some(value) = log_format {
            self.logging.format = value.parse()?;
        }

        Ok(())
    }

    fn apply_overrides(&mut self, overrides: ConfigOverrides) {
        if let Some(database_url) = overrides.database_url {
            self.database.url = database_url;
        }
        if let Some(log_level) = overrides.log_level {
            self.logging.level = log_level;
        }
        if let Some(llm_provider) = overrides.llm_provider {
            self.llm.provider = llm_provider;
        }
        if let Some(llm_model) = overrides.llm_model {
            self.llm.model = llm_model;
        }
        if let Some(enabled) = overrides.whatsapp_enabled {
            self.whatsapp.enabled = enabled;
        }
        if let Some(idle_timeout_secs) = overrides.idle_timeout_secs {
            self.conversation.idle_timeout_secs = idle_timeout_secs;
        }
        if let Some(coherence_policy) = overrides.coherence_policy {
            self.conversation.coherence_policy = coherence_policy;
        }
        if let Some(admin_api_key) = overrides.admin_api_key {
            self.admin.api_key = Some(secret_value(admin_api_key));
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_database(&self.database)?;
        validate_whatsapp(&self.whatsapp)?;
        validate_llm(&self.llm)?;
        validate_server(&self.server)?;
        validate_conversation(&self.conversation)?;
        validate_export(&self.export)?;
        validate_notification(&self.notification)?;
        validate_logging(&self.logging)?;
        Ok(())
    }
}

fn resolve_config_path(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        return path.exists().then_some(path.to_path_buf());
    }

    [PathBuf::from("listing.toml"), PathBuf::from("config/listing.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn read_patch(path: &Path) -> Result<ConfigPatch, ConfigError> {
    let raw = fs::read_to_string(path)
        .map_err(|source| ConfigError::ReadFile { path: path.to_path_buf(), source })?;

    let interpolated = interpolate_env_vars(&raw)?;
    toml::from_str::<ConfigPatch>(&interpolated)
        .map_err(|source| ConfigError::ParseFile { path: path.to_path_buf(), source })
}

fn interpolate_env_vars(input: &str) -> Result<String, ConfigError> {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch == '$' && matches!(chars.peek(), Some('{')) {
            chars.next();
            let mut key = String::new();

            loop {
                match chars.next() {
                    Some('}') => break,
                    Some(next) => key.push(next),
                    None => return Err(ConfigError::UnterminatedInterpolation),
                }
            }

            let value = env::var(&key)
                .map_err(|_| ConfigError::MissingEnvInterpolation { var: key.clone() })?;
            output.push_str(&value);
            continue;
        }

        output.push(ch);
    }

    Ok(output)
}

fn validate_database(database: &DatabaseConfig) -> Result<(), ConfigError> {
    let url = database.url.trim();
    let sqlite_url =
        url.starts_with("sqlite://") || url.starts_with("sqlite::") || url == ":memory:";
    if !sqlite_url {
        return Err(ConfigError::Validation(
            "database.url must be a sqlite URL (`sqlite://...`, `sqlite::...`, or `:memory:`)"
                .to_string(),
        ));
    }

    if database.max_connections == 0 {
        return Err(ConfigError::Validation(
            "database.max_connections must be greater than zero".to_string(),
        ));
    }

    if database.timeout_secs == 0 || database.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "database.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    Ok(())
}

fn secret_missing(secret: Option<&SecretString>) -> bool {
    secret.map(|value| value.expose_secret().trim().is_empty()).unwrap_or(true)
}

fn validate_whatsapp(whatsapp: &WhatsAppConfig) -> Result<(), ConfigError> {
    if !whatsapp.enabled {
        return Ok(());
    }

    if whatsapp.phone_number_id.as_deref().map(str::trim).unwrap_or("").is_empty() {
        return Err(ConfigError::Validation(
            "whatsapp.phone_number_id is required when whatsapp.enabled is true. Find it in Meta for Developers > WhatsApp > API Setup".to_string(),
        ));
    }
    if secret_missing(whatsapp.access_token.as_ref()) {
        return Err(ConfigError::Validation(
            "whatsapp.access_token is required when whatsapp.enabled is true".to_string(),
        ));
    }
    if secret_missing(whatsapp.verify_token.as_ref()) {
        return Err(ConfigError::Validation(
            "whatsapp.verify_token is required to answer the webhook verification challenge"
                .to_string(),
        ));
    }
    if !is_http_url(&whatsapp.api_base_url) {
        return Err(ConfigError::Validation(
            "whatsapp.api_base_url must start with http:// or https://".to_string(),
        ));
    }
    if whatsapp.timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "whatsapp.timeout_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_llm(llm: &LlmConfig) -> Result<(), ConfigError> {
    if llm.timeout_secs == 0 || llm.timeout_secs > 300 {
        return Err(ConfigError::Validation(
            "llm.timeout_secs must be in range 1..=300".to_string(),
        ));
    }

    match llm.provider {
        LlmProvider::Rules => {}
        LlmProvider::OpenAi => {
            if secret_missing(llm.api_key.as_ref()) {
                return Err(ConfigError::Validation(
                    "llm.api_key is required for the openai provider".to_string(),
                ));
            }
        }
        LlmProvider::Ollama => {
            let missing =
                llm.base_url.as_ref().map(|value| value.trim().is_empty()).unwrap_or(true);
            if missing {
                return Err(ConfigError::Validation(
                    "llm.base_url is required for ollama provider".to_string(),
                ));
            }
        }
    }

    Ok(())
}

fn validate_server(server: &ServerConfig) -> Result<(), ConfigError> {
    if server.port == 0 {
        return Err(ConfigError::Validation("server.port must be greater than zero".to_string()));
    }

    if server.graceful_shutdown_secs == 0 {
        return Err(ConfigError::Validation(
            "server.graceful_shutdown_secs must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_conversation(conversation: &ConversationConfig) -> Result<(), ConfigError> {
    if conversation.idle_timeout_secs == 0 {
        return Err(ConfigError::Validation(
            "conversation.idle_timeout_secs must be greater than zero".to_string(),
        ));
    }
    if conversation.sweep_interval_secs == 0 {
        return Err(ConfigError::Validation(
            "conversation.sweep_interval_secs must be greater than zero".to_string(),
        ));
    }
    if conversation.min_optional_documents > 4 {
        return Err(ConfigError::Validation(
            "conversation.min_optional_documents must be in range 0..=4".to_string(),
        ));
    }
    if !(0..=100).contains(&conversation.min_photos)
        || !(0..=100).contains(&conversation.tracker_min_photos)
    {
        return Err(ConfigError::Validation(
            "conversation.min_photos and conversation.tracker_min_photos must be in range 0..=100"
                .to_string(),
        ));
    }
    if conversation.min_description_words == 0 {
        return Err(ConfigError::Validation(
            "conversation.min_description_words must be greater than zero".to_string(),
        ));
    }

    Ok(())
}

fn validate_export(export: &ExportConfig) -> Result<(), ConfigError> {
    if export.enabled {
        match export.sheets_webhook_url.as_deref() {
            Some(url) if is_http_url(url) => {}
            _ => {
                return Err(ConfigError::Validation(
                    "export.sheets_webhook_url must be an http(s) URL when export.enabled is true"
                        .to_string(),
                ))
            }
        }
    }
    Ok(())
}

fn validate_notification(notification: &NotificationConfig) -> Result<(), ConfigError> {
    if !notification.enabled {
        return Ok(());
    }

    match notification.api_url.as_deref() {
        Some(url) if is_http_url(url) => {}
        _ => {
            return Err(ConfigError::Validation(
                "notification.api_url must be an http(s) URL when notification.enabled is true"
                    .to_string(),
            ))
        }
    }
    if secret_missing(notification.api_key.as_ref()) {
        return Err(ConfigError::Validation(
            "notification.api_key is required when notification.enabled is true".to_string(),
        ));
    }
    if notification.from.as_deref().map(str::trim).unwrap_or("").is_empty() {
        return Err(ConfigError::Validation(
            "notification.from is required when notification.enabled is true".to_string(),
        ));
    }
    if notification.recipients.is_empty() {
        return Err(ConfigError::Validation(
            "notification.recipients must list at least one address".to_string(),
        ));
    }

    Ok(())
}

fn validate_logging(logging: &LoggingConfig) -> Result<(), ConfigError> {
    let level = logging.level.trim().to_ascii_lowercase();
    match level.as_str() {
        "trace" | "debug" | "info" | "warn" | "error" => Ok(()),
        _ => Err(ConfigError::Validation(
            "logging.level must be one of trace|debug|info|warn|error".to_string(),
        )),
    }
}

fn is_http_url(value: &str) -> bool {
    value.starts_with("http://") || value.starts_with("https://")
}

fn read_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn parse_u16(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.parse::<u16>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u32(key: &str, value: &str) -> Result<u32, ConfigError> {
    value.parse::<u32>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_u64(key: &str, value: &str) -> Result<u64, ConfigError> {
    value.parse::<u64>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    value.parse::<bool>().map_err(|_| ConfigError::InvalidEnvOverride {
        key: key.to_string(),
        value: value.to_string(),
    })
}

#[derive(Debug, Default, Deserialize)]
struct ConfigPatch {
    database: Option<DatabasePatch>,
    whatsapp: Option<WhatsAppPatch>,
    llm: Option<LlmPatch>,
    server: Option<ServerPatch>,
    conversation: Option<ConversationPatch>,
    export: Option<ExportPatch>,
    notification: Option<NotificationPatch>,
    admin: Option<AdminPatch>,
    logging: Option<LoggingPatch>,
}

#[derive(Debug, Default, Deserialize)]
struct DatabasePatch {
    url: Option<String>,
    max_connections: Option<u32>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct WhatsAppPatch {
    enabled: Option<bool>,
    api_base_url: Option<String>,
    phone_number_id: Option<String>,
    access_token: Option<String>,
    verify_token: Option<String>,
    app_secret: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct LlmPatch {
    provider: Option<LlmProvider>,
    api_key: Option<String>,
    base_url: Option<String>,
    model: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ServerPatch {
    bind_address: Option<String>,
    port: Option<u16>,
    graceful_shutdown_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct ConversationPatch {
    idle_timeout_secs: Option<u64>,
    sweep_interval_secs: Option<u64>,
    min_photos: Option<i64>,
    tracker_min_photos: Option<i64>,
    min_description_words: Option<usize>,
    min_optional_documents: Option<usize>,
    coherence_policy: Option<CoherencePolicy>,
    knowledge_base_path: Option<PathBuf>,
}

#[derive(Debug, Default, Deserialize)]
struct ExportPatch {
    enabled: Option<bool>,
    sheets_webhook_url: Option<String>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct NotificationPatch {
    enabled: Option<bool>,
    api_url: Option<String>,
    api_key: Option<String>,
    from: Option<String>,
    recipients: Option<Vec<String>>,
    timeout_secs: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
struct AdminPatch {
    api_key: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
struct LoggingPatch {
    level: Option<String>,
    format: Option<LogFormat>,
}

#[cfg(test)]
mod tests {
    use std::env;
    use std::fs;
    use std::io;
    use std::sync::{Mutex, OnceLock};

    use secrecy::ExposeSecret;
    use tempfile::TempDir;

    use super::{AppConfig, ConfigError, ConfigOverrides, LlmProvider, LoadOptions, LogFormat};
    use crate::completion::CoherencePolicy;

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    fn env_lock() -> &'static Mutex<()> {
        ENV_LOCK.get_or_init(|| Mutex::new(()))
    }

    fn clear_vars(vars: &[&str]) {
        for var in vars {
            env::remove_var(var);
        }
    }

    fn ensure(condition: bool, message: &'static str) -> Result<(), String> {
        if condition {
            Ok(())
        } else {
            Err(message.to_string())
        }
    }

    #[test]
    fn defaults_are_valid_and_offline() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let config = AppConfig::load(LoadOptions::default())
            .map_err(|err| format!("config load failed: {err}"))?;

        ensure(!config.whatsapp.enabled, "whatsapp should be disabled by default")?;
        ensure(config.llm.provider == LlmProvider::Rules, "rule-based interpreter by default")?;
        ensure(config.conversation.idle_timeout_secs == 86_400, "idle timeout defaults to 24h")?;
        ensure(config.conversation.min_optional_documents == 4, "four documents by default")?;
        ensure(
            config.conversation.coherence_policy == CoherencePolicy::Advisory,
            "coherence warnings are advisory by default",
        )
    }

    #[test]
    fn file_load_supports_env_interpolation() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("TEST_WHATSAPP_ACCESS_TOKEN", "EAAG-from-env");
        env::set_var("TEST_WHATSAPP_VERIFY_TOKEN", "verify-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("listing.toml");
            fs::write(
                &path,
                r#"
[whatsapp]
enabled = true
phone_number_id = "1234567890"
access_token = "${TEST_WHATSAPP_ACCESS_TOKEN}"
verify_token = "${TEST_WHATSAPP_VERIFY_TOKEN}"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config =
                AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() })
                    .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.whatsapp.access_token.as_ref().map(|token| token.expose_secret())
                    == Some("EAAG-from-env"),
                "access token should be loaded from environment",
            )?;
            ensure(
                config.whatsapp.verify_token.as_ref().map(|token| token.expose_secret())
                    == Some("verify-from-env"),
                "verify token should be loaded from environment",
            )?;
            Ok(())
        })();

        clear_vars(&["TEST_WHATSAPP_ACCESS_TOKEN", "TEST_WHATSAPP_VERIFY_TOKEN"]);
        result
    }

    #[test]
    fn missing_interpolation_variable_is_reported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
        let path = dir.path().join("listing.toml");
        fs::write(&path, "[admin]\napi_key = \"${LISTING_TEST_UNSET_VAR}\"\n")
            .map_err(|err| err.to_string())?;

        match AppConfig::load(LoadOptions { config_path: Some(path), ..LoadOptions::default() }) {
            Err(ConfigError::MissingEnvInterpolation { var }) => {
                ensure(var == "LISTING_TEST_UNSET_VAR", "error should name the missing variable")
            }
            _ => Err("expected a missing interpolation error".to_string()),
        }
    }

    #[test]
    fn logging_env_aliases_are_supported() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LISTING_LOG_LEVEL", "warn");
        env::set_var("LISTING_LOG_FORMAT", "pretty");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;

            ensure(config.logging.level == "warn", "warning log level should be set from env var")?;
            ensure(
                matches!(config.logging.format, LogFormat::Pretty),
                "pretty logging format should be set from env var",
            )?;
            Ok(())
        })();

        clear_vars(&["LISTING_LOG_LEVEL", "LISTING_LOG_FORMAT"]);
        result
    }

    #[test]
    fn precedence_defaults_file_env_overrides() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LISTING_DATABASE_URL", "sqlite://from-env.db");
        env::set_var("LISTING_CONVERSATION_COHERENCE_POLICY", "blocking");
        env::set_var("LISTING_ADMIN_API_KEY", "admin-from-env");

        let result = (|| -> Result<(), String> {
            let dir = TempDir::new().map_err(|err: io::Error| err.to_string())?;
            let path = dir.path().join("listing.toml");
            fs::write(
                &path,
                r#"
[database]
url = "sqlite://from-file.db"

[conversation]
idle_timeout_secs = 3600
min_optional_documents = 3
coherence_policy = "advisory"

[admin]
api_key = "admin-from-file"

[logging]
level = "warn"
"#,
            )
            .map_err(|err| err.to_string())?;

            let config = AppConfig::load(LoadOptions {
                config_path: Some(path),
                overrides: ConfigOverrides {
                    database_url: Some("sqlite://from-override.db".to_string()),
                    log_level: Some("debug".to_string()),
                    ..ConfigOverrides::default()
                },
                ..LoadOptions::default()
            })
            .map_err(|err| format!("config load failed: {err}"))?;

            ensure(
                config.database.url == "sqlite://from-override.db",
                "override database url should win",
            )?;
            ensure(config.logging.level == "debug", "overridden log level should be debug")?;
            ensure(config.conversation.idle_timeout_secs == 3600, "file idle timeout applies")?;
            ensure(config.conversation.min_optional_documents == 3, "file document minimum applies")?;
            ensure(
                config.conversation.coherence_policy == CoherencePolicy::Blocking,
                "env coherence policy should win over file",
            )?;
            ensure(
                config.admin.api_key.as_ref().map(|key| key.expose_secret())
                    == Some("admin-from-env"),
                "env admin key should win over file and defaults",
            )?;
            Ok(())
        })();

        clear_vars(&[
            "LISTING_DATABASE_URL",
            "LISTING_CONVERSATION_COHERENCE_POLICY",
            "LISTING_ADMIN_API_KEY",
        ]);
        result
    }

    #[test]
    fn validation_fails_fast_with_actionable_error() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LISTING_WHATSAPP_ENABLED", "true");
        env::set_var("LISTING_WHATSAPP_PHONE_NUMBER_ID", "1234567890");

        let result = (|| -> Result<(), String> {
            let error = match AppConfig::load(LoadOptions::default()) {
                Ok(_) => {
                    return Err("expected validation failure but config load succeeded".to_string())
                }
                Err(error) => error,
            };
            let has_message = matches!(
                error,
                ConfigError::Validation(ref message) if message.contains("whatsapp.access_token")
            );
            ensure(has_message, "validation failure should mention whatsapp.access_token")
        })();

        clear_vars(&["LISTING_WHATSAPP_ENABLED", "LISTING_WHATSAPP_PHONE_NUMBER_ID"]);
        result
    }

    #[test]
    fn invalid_numeric_env_override_is_rejected() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LISTING_CONVERSATION_IDLE_TIMEOUT_SECS", "a day");

        let result = match AppConfig::load(LoadOptions::default()) {
            Err(ConfigError::InvalidEnvOverride { key, .. }) => ensure(
                key == "LISTING_CONVERSATION_IDLE_TIMEOUT_SECS",
                "error should name the offending variable",
            ),
            _ => Err("expected an invalid env override error".to_string()),
        };

        clear_vars(&["LISTING_CONVERSATION_IDLE_TIMEOUT_SECS"]);
        result
    }

    #[test]
    fn secret_values_are_not_leaked_by_debug() -> Result<(), String> {
        let _guard = env_lock().lock().map_err(|_| "env lock is poisoned".to_string())?;

        env::set_var("LISTING_WHATSAPP_ACCESS_TOKEN", "EAAG-secret-value");
        env::set_var("LISTING_ADMIN_API_KEY", "admin-secret-value");

        let result = (|| -> Result<(), String> {
            let config = AppConfig::load(LoadOptions::default())
                .map_err(|err| format!("config load failed: {err}"))?;
            let debug = format!("{config:?}");

            ensure(
                !debug.contains("EAAG-secret-value"),
                "debug output should not contain access token",
            )?;
            ensure(
                !debug.contains("admin-secret-value"),
                "debug output should not contain admin key",
            )?;
            ensure(
                matches!(config.logging.format, LogFormat::Compact),
                "default logging format should be compact",
            )?;
            Ok(())
        })();

        clear_vars(&["LISTING_WHATSAPP_ACCESS_TOKEN", "LISTING_ADMIN_API_KEY"]);
        result
    }

    #[test]
    fn conversation_section_maps_to_domain_policies() {
        let mut config = AppConfig::default();
        config.conversation.min_photos = 8;
        config.conversation.tracker_min_photos = 2;
        config.conversation.coherence_policy = CoherencePolicy::Blocking;

        assert_eq!(config.conversation.tracker_config().min_photos, 2);
        let policy = config.conversation.requirement_policy();
        assert_eq!(policy.min_photos, 8);
        assert_eq!(policy.coherence, CoherencePolicy::Blocking);
        assert_eq!(config.conversation.validation_rules().min_description_words, 50);
    }
}
