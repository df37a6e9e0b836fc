//! Staff email sent when a listing completes. The HTML body is rendered with
//! tera and posted to a transactional email API (`{from, to, subject, html}`).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use serde_json::json;
use tera::{Context, Tera};

use listing_core::collaborators::{CollaboratorError, CompletionNotifier};
use listing_core::config::NotificationConfig;
use listing_core::domain::property::{FieldName, PropertyRecord};

const COMPLETION_TEMPLATE: &str = "completion.html";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
struct FieldRow {
    name: &'static str,
    value: String,
}

pub fn templates() -> Result<Tera, tera::Error> {
    let mut tera = Tera::default();
    tera.add_raw_template(
        COMPLETION_TEMPLATE,
        include_str!("../../../templates/email/completion.html"),
    )?;
    Ok(tera)
}

/// Returns `(subject, html)`.
pub fn render_completion(tera: &Tera, record: &PropertyRecord) -> Result<(String, String), tera::Error> {
    let fields: Vec<FieldRow> = FieldName::ALL
        .iter()
        .filter_map(|field| {
            record.fields.get(*field).map(|value| FieldRow { name: field.as_str(), value: value.display() })
        })
        .collect();

    let mut context = Context::new();
    context.insert("property_id", &record.id.to_string());
    context.insert("owner_name", &record.owner.name);
    context.insert("phone", record.contact_id.as_str());
    context.insert("email", &record.owner.email);
    context.insert("address", &record.owner.address);
    context.insert("city", &record.owner.city);
    context.insert("registered_at", &record.created_at.format("%Y-%m-%d %H:%M UTC").to_string());
    context.insert("fields", &fields);

    let html = tera.render(COMPLETION_TEMPLATE, &context)?;
    let subject = format!("Nuevo inmueble registrado: {} ({})", record.owner.name, record.id);
    Ok((subject, html))
}

pub struct EmailNotifier {
    http: Client,
    tera: Tera,
    api_url: String,
    api_key: SecretString,
    from: String,
    recipients: Vec<String>,
}

impl EmailNotifier {
    pub fn new(
        api_url: impl Into<String>,
        api_key: SecretString,
        from: impl Into<String>,
        recipients: Vec<String>,
        timeout: Duration,
    ) -> Result<Self, CollaboratorError> {
        if recipients.is_empty() {
            return Err(CollaboratorError::NotConfigured("notification.recipients is empty".to_string()));
        }
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| CollaboratorError::NotConfigured(error.to_string()))?;
        let tera = templates().map_err(|error| CollaboratorError::NotConfigured(error.to_string()))?;
        Ok(Self { http, tera, api_url: api_url.into(), api_key, from: from.into(), recipients })
    }

    /// `None` when notifications are disabled.
    pub fn from_config(config: &NotificationConfig) -> Result<Option<Self>, CollaboratorError> {
        if !config.enabled {
            return Ok(None);
        }
        let required = |name: &str| CollaboratorError::NotConfigured(format!("notification.{name}"));
        let api_url = config.api_url.clone().ok_or_else(|| required("api_url"))?;
        let api_key = config.api_key.clone().ok_or_else(|| required("api_key"))?;
        let from = config.from.clone().ok_or_else(|| required("from"))?;
        Self::new(api_url, api_key, from, config.recipients.clone(), Duration::from_secs(config.timeout_secs))
            .map(Some)
    }
}

#[async_trait]
impl CompletionNotifier for EmailNotifier {
    async fn notify_completion(&self, record: &PropertyRecord) -> Result<(), CollaboratorError> {
        let (subject, html) = render_completion(&self.tera, record)
            .map_err(|error| CollaboratorError::Rejected(format!("template render failed: {error}")))?;
        let response = self
            .http
            .post(&self.api_url)
            .bearer_auth(self.api_key.expose_secret())
            .json(&json!({
                "from": self.from,
                "to": self.recipients,
                "subject": subject,
                "html": html,
            }))
            .send()
            .await
            .map_err(|error| CollaboratorError::Transport(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(CollaboratorError::Rejected(format!("email api returned {status}")));
        }
        tracing::info!(
            event_name = "notification.email_sent",
            property_id = %record.id,
            recipients = self.recipients.len(),
            "completion email accepted"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use chrono::{TimeZone, Utc};
    use rust_decimal::Decimal;
    use secrecy::SecretString;

    use listing_core::config::NotificationConfig;
    use listing_core::domain::property::{
        ContactId, OwnerDetails, PropertyId, PropertyRecord, PropertyType,
    };

    use super::{render_completion, templates, EmailNotifier};

    fn record() -> PropertyRecord {
        let mut record = PropertyRecord::new(
            PropertyId("PROP-7".to_string()),
            ContactId("573001112233".to_string()),
            OwnerDetails { name: "Ana <Ruiz>".to_string(), email: None, address: None, city: None },
            Utc.with_ymd_and_hms(2026, 3, 1, 15, 30, 0).single().expect("timestamp"),
        );
        record.fields.property_type = Some(PropertyType::Apartment);
        record.fields.built_area_m2 = Some(Decimal::new(855, 1));
        record
    }

    #[test]
    fn renders_subject_and_populated_fields_only() {
        let tera = templates().expect("templates");
        let (subject, html) = render_completion(&tera, &record()).expect("render");

        assert_eq!(subject, "Nuevo inmueble registrado: Ana <Ruiz> (PROP-7)");
        assert!(html.contains("PROP-7"));
        assert!(html.contains("area_construida"));
        assert!(html.contains("85.5"));
        assert!(!html.contains("habitaciones"));
        assert!(html.contains("2026-03-01 15:30 UTC"));
    }

    #[test]
    fn owner_name_is_escaped_in_html() {
        let tera = templates().expect("templates");
        let (_, html) = render_completion(&tera, &record()).expect("render");
        assert!(html.contains("Ana &lt;Ruiz&gt;"));
    }

    #[test]
    fn config_requires_recipients_and_credentials() {
        let mut config = NotificationConfig {
            enabled: false,
            api_url: None,
            api_key: None,
            from: None,
            recipients: Vec::new(),
            timeout_secs: 10,
        };
        assert!(EmailNotifier::from_config(&config).expect("disabled").is_none());

        config.enabled = true;
        assert!(EmailNotifier::from_config(&config).is_err());

        let notifier = EmailNotifier::new(
            "https://api.example.com/emails",
            SecretString::from("key".to_string()),
            "bot@example.com",
            Vec::new(),
            Duration::from_secs(5),
        );
        assert!(notifier.is_err());
    }
}
