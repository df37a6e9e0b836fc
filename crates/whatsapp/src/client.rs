use std::time::Duration;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde_json::{json, Value};
use thiserror::Error;

use listing_core::collaborators::{Delivery, OutboundMessenger};
use listing_core::config::WhatsAppConfig;
use listing_core::domain::property::ContactId;

#[derive(Debug, Error)]
pub enum WhatsAppError {
    #[error("whatsapp client misconfigured: {0}")]
    Configuration(String),
    #[error("whatsapp request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("whatsapp api returned {status}: {message}")]
    Api { status: u16, message: String },
}

/// Cloud API client sending plain text messages from one business number.
pub struct WhatsAppClient {
    http: reqwest::Client,
    endpoint: String,
    access_token: SecretString,
}

impl WhatsAppClient {
    pub fn new(
        api_base_url: &str,
        phone_number_id: &str,
        access_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, WhatsAppError> {
        if phone_number_id.trim().is_empty() {
            return Err(WhatsAppError::Configuration("phone_number_id is empty".to_string()));
        }
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            endpoint: format!("{}/{}/messages", api_base_url.trim_end_matches('/'), phone_number_id.trim()),
            access_token,
        })
    }

    /// `None` when WhatsApp delivery is disabled.
    pub fn from_config(config: &WhatsAppConfig) -> Result<Option<Self>, WhatsAppError> {
        if !config.enabled {
            return Ok(None);
        }
        let phone_number_id = config
            .phone_number_id
            .as_deref()
            .ok_or_else(|| WhatsAppError::Configuration("phone_number_id is required".to_string()))?;
        let access_token = config
            .access_token
            .clone()
            .ok_or_else(|| WhatsAppError::Configuration("access_token is required".to_string()))?;
        Self::new(
            &config.api_base_url,
            phone_number_id,
            access_token,
            Duration::from_secs(config.timeout_secs),
        )
        .map(Some)
    }

    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    /// Returns the WhatsApp message id of the accepted message.
    pub async fn send_text(&self, to: &ContactId, body: &str) -> Result<Option<String>, WhatsAppError> {
        let response = self
            .http
            .post(&self.endpoint)
            .bearer_auth(self.access_token.expose_secret())
            .json(&text_message_body(to, body))
            .send()
            .await?;
        let status = response.status();
        let payload: Value = response.json().await.unwrap_or(Value::Null);
        if !status.is_success() {
            return Err(WhatsAppError::Api { status: status.as_u16(), message: api_error_message(&payload) });
        }
        Ok(message_id(&payload))
    }
}

#[async_trait]
impl OutboundMessenger for WhatsAppClient {
    async fn send(&self, contact: &ContactId, text: &str) -> Delivery {
        match self.send_text(contact, text).await {
            Ok(message_id) => {
                tracing::debug!(
                    event_name = "whatsapp.message_sent",
                    contact_id = %contact,
                    message_id = message_id.as_deref().unwrap_or("unknown"),
                    "outbound message accepted"
                );
                Delivery::Sent { message_id }
            }
            Err(error) => Delivery::Failed { error: error.to_string() },
        }
    }
}

pub fn text_message_body(to: &ContactId, body: &str) -> Value {
    json!({
        "messaging_product": "whatsapp",
        "recipient_type": "individual",
        "to": to.as_str(),
        "type": "text",
        "text": { "preview_url": false, "body": body },
    })
}

fn message_id(payload: &Value) -> Option<String> {
    payload
        .get("messages")?
        .as_array()?
        .first()?
        .get("id")?
        .as_str()
        .map(str::to_string)
}

fn api_error_message(payload: &Value) -> String {
    payload
        .pointer("/error/message")
        .and_then(Value::as_str)
        .map(str::to_string)
        .unwrap_or_else(|| "no error detail".to_string())
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use secrecy::SecretString;
    use serde_json::json;

    use listing_core::config::AppConfig;
    use listing_core::domain::property::ContactId;

    use super::{api_error_message, message_id, text_message_body, WhatsAppClient};

    #[test]
    fn endpoint_joins_base_url_and_phone_number_id() {
        let client = WhatsAppClient::new(
            "https://graph.facebook.com/v19.0/",
            "1234567890",
            SecretString::from("token".to_string()),
            Duration::from_secs(5),
        )
        .expect("client");
        assert_eq!(client.endpoint(), "https://graph.facebook.com/v19.0/1234567890/messages");
    }

    #[test]
    fn disabled_config_builds_no_client() {
        let config = AppConfig::default();
        assert!(WhatsAppClient::from_config(&config.whatsapp).expect("no error").is_none());

        let mut enabled = config.whatsapp.clone();
        enabled.enabled = true;
        assert!(WhatsAppClient::from_config(&enabled).is_err());
    }

    #[test]
    fn text_body_matches_cloud_api_shape() {
        let body = text_message_body(&ContactId("573001112233".to_string()), "Hola");
        assert_eq!(body["to"], "573001112233");
        assert_eq!(body["type"], "text");
        assert_eq!(body["text"]["body"], "Hola");
        assert_eq!(body["messaging_product"], "whatsapp");
    }

    #[test]
    fn parses_message_id_and_error_detail() {
        let accepted = json!({"messaging_product": "whatsapp", "messages": [{"id": "wamid.ABC"}]});
        assert_eq!(message_id(&accepted).as_deref(), Some("wamid.ABC"));

        let rejected = json!({"error": {"message": "Invalid OAuth access token.", "code": 190}});
        assert_eq!(api_error_message(&rejected), "Invalid OAuth access token.");
        assert_eq!(api_error_message(&json!(null)), "no error detail");
    }
}
