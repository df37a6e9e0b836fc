use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tracing::error;

use listing_agent::ConversationError;
use listing_core::errors::{ApplicationError, InterfaceError};

pub const CORRELATION_HEADER: &str = "x-correlation-id";

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub correlation_id: Option<String>,
}

pub type ApiFailure = (StatusCode, Json<ApiError>);

pub fn failure(status: StatusCode, message: impl Into<String>) -> ApiFailure {
    (status, Json(ApiError { error: message.into(), correlation_id: None }))
}

pub fn bad_request(message: impl Into<String>) -> ApiFailure {
    failure(StatusCode::BAD_REQUEST, message)
}

/// Reuses the caller's correlation id when one was sent.
pub fn correlation_id(headers: &HeaderMap) -> String {
    headers
        .get(CORRELATION_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string())
}

/// Maps a runtime error through the application and interface layers.
pub fn conversation_failure(error: ConversationError, correlation_id: &str) -> ApiFailure {
    error!(
        event_name = "api.request_failed",
        correlation_id,
        error = %error,
        "request failed"
    );
    let interface = ApplicationError::from(error).into_interface(correlation_id);
    let status = match &interface {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::NotFound { .. } => StatusCode::NOT_FOUND,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    };
    let message = match &interface {
        InterfaceError::BadRequest { message, .. } | InterfaceError::NotFound { message, .. } => {
            message.clone()
        }
        _ => interface.user_message().to_string(),
    };
    (
        status,
        Json(ApiError { error: message, correlation_id: Some(interface.correlation_id().to_string()) }),
    )
}

/// Bearer-token check for operator endpoints. With no key configured the
/// endpoints stay closed.
pub fn authorize(headers: &HeaderMap, api_key: Option<&SecretString>) -> Result<(), ApiFailure> {
    let Some(expected) = api_key else {
        return Err(failure(StatusCode::SERVICE_UNAVAILABLE, "admin api key is not configured"));
    };
    let provided = headers
        .get(axum::http::header::AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim);
    match provided {
        Some(token) if constant_time_eq(token.as_bytes(), expected.expose_secret().as_bytes()) => Ok(()),
        Some(_) => Err(failure(StatusCode::UNAUTHORIZED, "invalid api key")),
        None => Err(failure(StatusCode::UNAUTHORIZED, "missing bearer token")),
    }
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }
    left.iter().zip(right).fold(0u8, |diff, (a, b)| diff | (a ^ b)) == 0
}
