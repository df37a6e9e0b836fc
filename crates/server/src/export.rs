//! Google Sheets export through an Apps Script web app (or any webhook that
//! appends the posted row).

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde_json::{json, Value};

use listing_core::collaborators::{CollaboratorError, SubjectExporter};
use listing_core::config::ExportConfig;
use listing_core::domain::property::{FieldName, PropertyRecord};

pub const SHEET_NAME: &str = "Inmuebles";

/// Column headers preceding one column per field, in declaration order.
pub const LEADING_COLUMNS: [&str; 8] =
    ["property_id", "registered_at", "owner_name", "phone", "email", "address", "city", "status"];

pub struct SheetsExporter {
    http: Client,
    webhook_url: String,
}

impl SheetsExporter {
    pub fn new(webhook_url: impl Into<String>, timeout: Duration) -> Result<Self, CollaboratorError> {
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|error| CollaboratorError::NotConfigured(error.to_string()))?;
        Ok(Self { http, webhook_url: webhook_url.into() })
    }

    /// `None` when export is disabled.
    pub fn from_config(config: &ExportConfig) -> Result<Option<Self>, CollaboratorError> {
        if !config.enabled {
            return Ok(None);
        }
        let url = config
            .sheets_webhook_url
            .clone()
            .ok_or_else(|| CollaboratorError::NotConfigured("export.sheets_webhook_url".to_string()))?;
        Self::new(url, Duration::from_secs(config.timeout_secs)).map(Some)
    }
}

#[async_trait]
impl SubjectExporter for SheetsExporter {
    async fn export(&self, record: &PropertyRecord) -> Result<(), CollaboratorError> {
        let response = self
            .http
            .post(&self.webhook_url)
            .json(&sheet_payload(record))
            .send()
            .await
            .map_err(|error| CollaboratorError::Transport(error.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CollaboratorError::Rejected(format!(
                "sheets webhook returned {status}: {}",
                body.chars().take(200).collect::<String>()
            )));
        }
        Ok(())
    }
}

pub fn sheet_headers() -> Vec<String> {
    LEADING_COLUMNS
        .iter()
        .map(|column| column.to_string())
        .chain(FieldName::ALL.iter().map(|field| field.as_str().to_string()))
        .collect()
}

/// One cell per header; missing fields export as empty cells.
pub fn sheet_row(record: &PropertyRecord) -> Vec<String> {
    let mut row = vec![
        record.id.to_string(),
        record.created_at.to_rfc3339(),
        record.owner.name.clone(),
        record.contact_id.to_string(),
        record.owner.email.clone().unwrap_or_default(),
        record.owner.address.clone().unwrap_or_default(),
        record.owner.city.clone().unwrap_or_default(),
        record.status.as_str().to_string(),
    ];
    row.extend(
        FieldName::ALL
            .iter()
            .map(|field| record.fields.get(*field).map(|value| value.display()).unwrap_or_default()),
    );
    row
}

pub fn sheet_payload(record: &PropertyRecord) -> Value {
    json!({
        "sheet": SHEET_NAME,
        "headers": sheet_headers(),
        "row": sheet_row(record),
    })
}
