use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use listing_db::DbPool;
use serde::Serialize;
use tracing::error;

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: DbPool,
    /// `whatsapp` when replies go to the Cloud API, `logging` otherwise.
    pub messaging: &'static str,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub messaging: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_sessions: Option<i64>,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let (database, active_sessions) = database_check(&state.db_pool).await;
    let ready = database.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "listing-server runtime initialized".to_string(),
        },
        database,
        messaging: state.messaging,
        active_sessions,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> (HealthCheck, Option<i64>) {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => {}
        Err(error) => {
            error!(event_name = "system.health.database_failed", error = %error, "health probe failed");
            return (
                HealthCheck { status: "degraded", detail: format!("database query failed: {error}") },
                None,
            );
        }
    }

    // Missing before migrations run; the probe still reports ready.
    let active = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM conversation_session WHERE state = 'active'",
    )
    .fetch_one(pool)
    .await
    .ok();
    (HealthCheck { status: "ready", detail: "database query succeeded".to_string() }, active)
}
