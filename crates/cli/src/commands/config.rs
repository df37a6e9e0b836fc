use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use listing_core::config::{AppConfig, LoadOptions};
use secrecy::SecretString;
use toml::Value;

struct Entry {
    key: &'static str,
    env_key: &'static str,
    value: String,
}

pub fn run() -> String {
    let config = match AppConfig::load(LoadOptions::default()) {
        Ok(config) => config,
        Err(error) => return format!("config validation failed: {error}"),
    };

    let config_file_path = detect_config_path();
    let config_file_doc = load_config_file_doc(config_file_path.as_deref());

    let mut lines = vec!["effective config (source precedence: env > file > default):".to_string()];
    for entry in entries(&config) {
        let source =
            field_source(entry.key, entry.env_key, config_file_doc.as_ref(), config_file_path.as_deref());
        lines.push(render_line(entry.key, &entry.value, source));
    }
    lines.join("\n")
}

fn entries(config: &AppConfig) -> Vec<Entry> {
    let entry = |key: &'static str, env_key: &'static str, value: String| Entry { key, env_key, value };
    let optional = |value: Option<&str>| value.unwrap_or("<unset>").to_string();

    vec![
        entry("database.url", "LISTING_DATABASE_URL", config.database.url.clone()),
        entry(
            "database.max_connections",
            "LISTING_DATABASE_MAX_CONNECTIONS",
            config.database.max_connections.to_string(),
        ),
        entry("database.timeout_secs", "LISTING_DATABASE_TIMEOUT_SECS", config.database.timeout_secs.to_string()),
        entry("whatsapp.enabled", "LISTING_WHATSAPP_ENABLED", config.whatsapp.enabled.to_string()),
        entry("whatsapp.api_base_url", "LISTING_WHATSAPP_API_BASE_URL", config.whatsapp.api_base_url.clone()),
        entry(
            "whatsapp.phone_number_id",
            "LISTING_WHATSAPP_PHONE_NUMBER_ID",
            optional(config.whatsapp.phone_number_id.as_deref()),
        ),
        entry("whatsapp.access_token", "LISTING_WHATSAPP_ACCESS_TOKEN", redact(config.whatsapp.access_token.as_ref())),
        entry("whatsapp.verify_token", "LISTING_WHATSAPP_VERIFY_TOKEN", redact(config.whatsapp.verify_token.as_ref())),
        entry("whatsapp.app_secret", "LISTING_WHATSAPP_APP_SECRET", redact(config.whatsapp.app_secret.as_ref())),
        entry("llm.provider", "LISTING_LLM_PROVIDER", format!("{:?}", config.llm.provider)),
        entry("llm.model", "LISTING_LLM_MODEL", config.llm.model.clone()),
        entry("llm.base_url", "LISTING_LLM_BASE_URL", optional(config.llm.base_url.as_deref())),
        entry("llm.api_key", "LISTING_LLM_API_KEY", redact(config.llm.api_key.as_ref())),
        entry("server.bind_address", "LISTING_SERVER_BIND_ADDRESS", config.server.bind_address.clone()),
        entry("server.port", "LISTING_SERVER_PORT", config.server.port.to_string()),
        entry(
            "conversation.idle_timeout_secs",
            "LISTING_CONVERSATION_IDLE_TIMEOUT_SECS",
            config.conversation.idle_timeout_secs.to_string(),
        ),
        entry(
            "conversation.sweep_interval_secs",
            "LISTING_CONVERSATION_SWEEP_INTERVAL_SECS",
            config.conversation.sweep_interval_secs.to_string(),
        ),
        entry(
            "conversation.min_optional_documents",
            "LISTING_CONVERSATION_MIN_OPTIONAL_DOCUMENTS",
            config.conversation.min_optional_documents.to_string(),
        ),
        entry(
            "conversation.coherence_policy",
            "LISTING_CONVERSATION_COHERENCE_POLICY",
            format!("{:?}", config.conversation.coherence_policy),
        ),
        entry("export.enabled", "LISTING_EXPORT_ENABLED", config.export.enabled.to_string()),
        entry(
            "export.sheets_webhook_url",
            "LISTING_EXPORT_SHEETS_WEBHOOK_URL",
            optional(config.export.sheets_webhook_url.as_deref()),
        ),
        entry("notification.enabled", "LISTING_NOTIFICATION_ENABLED", config.notification.enabled.to_string()),
        entry(
            "notification.recipients",
            "LISTING_NOTIFICATION_RECIPIENTS",
            if config.notification.recipients.is_empty() {
                "<none>".to_string()
            } else {
                config.notification.recipients.join(",")
            },
        ),
        entry("notification.api_key", "LISTING_NOTIFICATION_API_KEY", redact(config.notification.api_key.as_ref())),
        entry("admin.api_key", "LISTING_ADMIN_API_KEY", redact(config.admin.api_key.as_ref())),
        entry("logging.level", "LISTING_LOGGING_LEVEL", config.logging.level.clone()),
        entry("logging.format", "LISTING_LOGGING_FORMAT", format!("{:?}", config.logging.format)),
    ]
}

fn detect_config_path() -> Option<PathBuf> {
    [PathBuf::from("listing.toml"), PathBuf::from("config/listing.toml")]
        .into_iter()
        .find(|path| path.exists())
}

fn load_config_file_doc(path: Option<&Path>) -> Option<Value> {
    let path = path?;
    let raw = fs::read_to_string(path).ok()?;
    raw.parse::<Value>().ok()
}

fn field_source(
    key_path: &str,
    env_key: &str,
    config_file_doc: Option<&Value>,
    config_file_path: Option<&Path>,
) -> String {
    if env::var_os(env_key).is_some() {
        return format!("env ({env_key})");
    }

    if let Some(doc) = config_file_doc {
        if contains_path(doc, key_path) {
            let file_path = config_file_path
                .map(|path| path.display().to_string())
                .unwrap_or_else(|| "config file".to_string());
            return format!("file ({file_path})");
        }
    }

    "default".to_string()
}

fn contains_path(root: &Value, key_path: &str) -> bool {
    let mut current = root;
    for key in key_path.split('.') {
        let Some(next) = current.get(key) else {
            return false;
        };
        current = next;
    }
    true
}

fn render_line(key: &str, value: &str, source: String) -> String {
    format!("- {key} = {value} (source: {source})")
}

fn redact(secret: Option<&SecretString>) -> String {
    match secret {
        Some(_) => "<redacted>".to_string(),
        None => "<unset>".to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::{contains_path, redact};
    use secrecy::SecretString;

    #[test]
    fn secrets_are_never_rendered() {
        assert_eq!(redact(Some(&SecretString::from("EAAG-token".to_string()))), "<redacted>");
        assert_eq!(redact(None), "<unset>");
    }

    #[test]
    fn nested_keys_are_found_in_toml_documents() {
        let doc: toml::Value = "[whatsapp]\nenabled = true\n".parse().expect("toml");
        assert!(contains_path(&doc, "whatsapp.enabled"));
        assert!(!contains_path(&doc, "whatsapp.app_secret"));
    }
}
