//! Registration form intake and a chat simulator that drives the
//! conversation without WhatsApp.

use std::sync::Arc;

use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::info;

use listing_agent::{ConversationManager, Registration};
use listing_core::domain::property::{ContactId, OwnerDetails, PropertyType};

use crate::api::{authorize, bad_request, conversation_failure, correlation_id, ApiFailure};

#[derive(Clone)]
pub struct SimulatorState {
    pub manager: Arc<ConversationManager>,
    pub admin_api_key: Option<SecretString>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct RegistrationRequest {
    pub name: String,
    pub phone: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default)]
    pub city: Option<String>,
    #[serde(default)]
    pub property_type: Option<PropertyType>,
}

#[derive(Clone, Debug, Serialize)]
pub struct RegistrationResponse {
    pub session_id: String,
    pub property_id: String,
    pub contact_id: String,
    pub welcome: String,
    pub delivered: bool,
}

#[derive(Clone, Debug, Deserialize)]
pub struct SimulatedMessage {
    pub phone: String,
    pub text: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct SimulatedReply {
    pub reply: String,
    pub outcome: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_state: Option<&'static str>,
}

pub fn router(state: SimulatorState) -> Router {
    Router::new()
        .route("/api/v1/registrations", post(register))
        .route("/api/v1/simulator/messages", post(simulate_message))
        .with_state(state)
}

pub async fn register(
    State(state): State<SimulatorState>,
    headers: HeaderMap,
    Json(request): Json<RegistrationRequest>,
) -> Result<(StatusCode, Json<RegistrationResponse>), ApiFailure> {
    let correlation_id = correlation_id(&headers);
    let registration = registration_from(request)?;

    let started = state
        .manager
        .start_session(registration)
        .await
        .map_err(|error| conversation_failure(error, &correlation_id))?;
    info!(
        event_name = "registration.accepted",
        correlation_id = %correlation_id,
        session_id = %started.session.id,
        property_id = %started.property.id,
        "registration form accepted"
    );

    Ok((
        StatusCode::CREATED,
        Json(RegistrationResponse {
            session_id: started.session.id.to_string(),
            property_id: started.property.id.to_string(),
            contact_id: started.session.contact_id.to_string(),
            welcome: started.welcome,
            delivered: started.delivery.is_sent(),
        }),
    ))
}

pub async fn simulate_message(
    State(state): State<SimulatorState>,
    headers: HeaderMap,
    Json(message): Json<SimulatedMessage>,
) -> Result<Json<SimulatedReply>, ApiFailure> {
    authorize(&headers, state.admin_api_key.as_ref())?;
    let correlation_id = correlation_id(&headers);
    let contact = contact_from(&message.phone)?;
    if message.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }

    let processed = state
        .manager
        .handle_inbound(&contact, &message.text)
        .await
        .map_err(|error| conversation_failure(error, &correlation_id))?;
    Ok(Json(SimulatedReply {
        outcome: processed.outcome.label(),
        session_state: processed.session.as_ref().map(|session| session.state.as_str()),
        reply: processed.reply,
    }))
}

fn registration_from(request: RegistrationRequest) -> Result<Registration, ApiFailure> {
    let name = request.name.trim();
    if name.is_empty() {
        return Err(bad_request("name is required"));
    }
    let optional = |value: Option<String>| {
        value.map(|value| value.trim().to_string()).filter(|value| !value.is_empty())
    };
    Ok(Registration {
        contact: contact_from(&request.phone)?,
        owner: OwnerDetails {
            name: name.to_string(),
            email: optional(request.email),
            address: optional(request.address),
            city: optional(request.city),
        },
        property_type: request.property_type,
    })
}

fn contact_from(phone: &str) -> Result<ContactId, ApiFailure> {
    let contact = ContactId::normalized(phone);
    if contact.as_str().len() < 7 {
        return Err(bad_request("phone must contain at least 7 digits"));
    }
    Ok(contact)
}
