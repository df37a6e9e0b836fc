//! Operator endpoints behind the admin bearer key.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::routing::{get, post};
use axum::{Json, Router};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};

use listing_agent::admin::{DashboardStats, SessionOverview};
use listing_agent::AdminService;
use listing_core::collaborators::Delivery;
use listing_core::domain::session::{Session, SessionId, SessionState};

use crate::api::{authorize, bad_request, conversation_failure, correlation_id, ApiFailure};

const DEFAULT_LIST_LIMIT: u32 = 50;
const MAX_LIST_LIMIT: u32 = 500;

#[derive(Clone)]
pub struct AdminState {
    pub service: Arc<AdminService>,
    pub api_key: Option<SecretString>,
}

#[derive(Clone, Debug, Default, Deserialize)]
pub struct ListQuery {
    pub state: Option<String>,
    pub limit: Option<u32>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct CompleteRequest {
    pub reason: String,
}

#[derive(Clone, Debug, Deserialize)]
pub struct ManualMessageRequest {
    pub text: String,
}

#[derive(Clone, Debug, Serialize)]
pub struct ManualMessageResponse {
    pub delivered: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub fn router(state: AdminState) -> Router {
    Router::new()
        .route("/api/v1/admin/sessions", get(list_sessions))
        .route("/api/v1/admin/stats", get(stats))
        .route("/api/v1/admin/sessions/{id}/complete", post(force_complete))
        .route("/api/v1/admin/sessions/{id}/reopen", post(reopen))
        .route("/api/v1/admin/sessions/{id}/messages", post(send_message))
        .with_state(state)
}

pub async fn list_sessions(
    State(state): State<AdminState>,
    headers: HeaderMap,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<SessionOverview>>, ApiFailure> {
    authorize(&headers, state.api_key.as_ref())?;
    let filter = match query.state.as_deref().map(str::trim).filter(|value| !value.is_empty()) {
        Some(raw) => Some(
            SessionState::parse(raw).ok_or_else(|| bad_request(format!("unknown session state `{raw}`")))?,
        ),
        None => None,
    };
    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, MAX_LIST_LIMIT);

    state
        .service
        .list_sessions(filter, limit)
        .await
        .map(Json)
        .map_err(|error| conversation_failure(error, &correlation_id(&headers)))
}

pub async fn stats(
    State(state): State<AdminState>,
    headers: HeaderMap,
) -> Result<Json<DashboardStats>, ApiFailure> {
    authorize(&headers, state.api_key.as_ref())?;
    state.service.stats().await.map(Json).map_err(|error| conversation_failure(error, &correlation_id(&headers)))
}

pub async fn force_complete(
    State(state): State<AdminState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<CompleteRequest>,
) -> Result<Json<Session>, ApiFailure> {
    authorize(&headers, state.api_key.as_ref())?;
    let reason = request.reason.trim();
    if reason.is_empty() {
        return Err(bad_request("reason is required"));
    }
    let forced = state
        .service
        .force_complete(&SessionId(id), reason)
        .await
        .map_err(|error| conversation_failure(error, &correlation_id(&headers)))?;
    Ok(Json(forced.session))
}

pub async fn reopen(
    State(state): State<AdminState>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiFailure> {
    authorize(&headers, state.api_key.as_ref())?;
    state
        .service
        .reopen(&SessionId(id))
        .await
        .map(Json)
        .map_err(|error| conversation_failure(error, &correlation_id(&headers)))
}

pub async fn send_message(
    State(state): State<AdminState>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(request): Json<ManualMessageRequest>,
) -> Result<Json<ManualMessageResponse>, ApiFailure> {
    authorize(&headers, state.api_key.as_ref())?;
    if request.text.trim().is_empty() {
        return Err(bad_request("text must not be empty"));
    }
    let delivery = state
        .service
        .send_manual_message(&SessionId(id), request.text.trim())
        .await
        .map_err(|error| conversation_failure(error, &correlation_id(&headers)))?;
    Ok(Json(match delivery {
        Delivery::Sent { message_id } => ManualMessageResponse { delivered: true, message_id, error: None },
        Delivery::Failed { error } => {
            ManualMessageResponse { delivered: false, message_id: None, error: Some(error) }
        }
    }))
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::{to_bytes, Body};
    use axum::extract::{Path, Query, State};
    use axum::http::{HeaderMap, HeaderValue, Request, StatusCode};
    use axum::Json;
    use chrono::Utc;
    use secrecy::SecretString;
    use serde_json::Value;
    use tower::ServiceExt;

    use listing_agent::AdminService;
    use listing_core::domain::property::PropertyStatus;
    use listing_core::domain::session::SessionState;
    use listing_db::{PropertyRepository, SessionRepository};

    use super::{force_complete, list_sessions, reopen, router, AdminState, CompleteRequest, ListQuery};
    use crate::testing::{fixture, open_session, Fixture};

    fn state(fixture: &Fixture) -> AdminState {
        AdminState {
            service: Arc::new(AdminService::for_manager(&fixture.manager)),
            api_key: Some(SecretString::from("admin-key".to_string())),
        }
    }

    fn authorized() -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert("authorization", HeaderValue::from_static("Bearer admin-key"));
        headers
    }

    #[tokio::test]
    async fn force_complete_closes_the_session_and_exports() {
        let fixture = fixture();
        let session = open_session(&fixture, "573001112233", Utc::now()).await;

        let Json(closed) = force_complete(
            State(state(&fixture)),
            authorized(),
            Path(session.id.0.clone()),
            Json(CompleteRequest { reason: "datos confirmados por teléfono".to_string() }),
        )
        .await
        .expect("forced");

        assert_eq!(closed.state, SessionState::Completed);
        assert_eq!(closed.closed_reason.as_deref(), Some("admin: datos confirmados por teléfono"));
        let record = fixture.properties.find_by_id(&session.property_id).await.expect("query").expect("record");
        assert_eq!(record.status, PropertyStatus::Complete);

        for _ in 0..50 {
            if !fixture.exporter.exported().is_empty() {
                break;
            }
            tokio::time::sleep(std::time::Duration::from_millis(10)).await;
        }
        assert_eq!(fixture.exporter.exported().len(), 1);
    }

    #[tokio::test]
    async fn reopen_restores_an_active_session() {
        let fixture = fixture();
        let session = open_session(&fixture, "573001112233", Utc::now()).await;
        force_complete(
            State(state(&fixture)),
            authorized(),
            Path(session.id.0.clone()),
            Json(CompleteRequest { reason: "prueba".to_string() }),
        )
        .await
        .expect("forced");

        let Json(reopened) =
            reopen(State(state(&fixture)), authorized(), Path(session.id.0.clone())).await.expect("reopened");

        assert_eq!(reopened.state, SessionState::Active);
        assert!(reopened.closed_reason.is_none());
        let stored = fixture.sessions.find_by_id(&session.id).await.expect("query").expect("session");
        assert_eq!(stored.state, SessionState::Active);
    }

    #[tokio::test]
    async fn unknown_session_is_not_found_and_bad_filters_are_rejected() {
        let fixture = fixture();

        let (status, _) = reopen(State(state(&fixture)), authorized(), Path("SES-missing".to_string()))
            .await
            .expect_err("missing");
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _) = list_sessions(
            State(state(&fixture)),
            authorized(),
            Query(ListQuery { state: Some("archived".to_string()), limit: None }),
        )
        .await
        .expect_err("bad filter");
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn routes_reject_missing_key_and_report_stats() {
        let fixture = fixture();
        open_session(&fixture, "573001112233", Utc::now()).await;
        let app = router(state(&fixture));

        let denied = app
            .clone()
            .oneshot(Request::builder().uri("/api/v1/admin/stats").body(Body::empty()).expect("request"))
            .await
            .expect("response");
        assert_eq!(denied.status(), StatusCode::UNAUTHORIZED);

        let response = app
            .oneshot(
                Request::builder()
                    .uri("/api/v1/admin/stats")
                    .header("authorization", "Bearer admin-key")
                    .body(Body::empty())
                    .expect("request"),
            )
            .await
            .expect("response");
        assert_eq!(response.status(), StatusCode::OK);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let body: Value = serde_json::from_slice(&bytes).expect("json");
        assert_eq!(body["total_sessions"], 1);
        assert_eq!(body["sessions_by_state"]["active"], 1);
    }

    #[tokio::test]
    async fn listing_filters_by_state() {
        let fixture = fixture();
        open_session(&fixture, "573001112233", Utc::now()).await;

        let Json(active) = list_sessions(
            State(state(&fixture)),
            authorized(),
            Query(ListQuery { state: Some("active".to_string()), limit: Some(10) }),
        )
        .await
        .expect("listed");
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].owner_name, "Ana");

        let Json(completed) = list_sessions(
            State(state(&fixture)),
            authorized(),
            Query(ListQuery { state: Some("completed".to_string()), limit: None }),
        )
        .await
        .expect("listed");
        assert!(completed.is_empty());
    }
}
