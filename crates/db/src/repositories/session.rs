use chrono::{DateTime, Utc};
use sqlx::Row;

use listing_core::domain::property::{ContactId, PropertyId};
use listing_core::domain::session::{ConversationContext, Session, SessionId, SessionState};

use super::{parse_timestamp, timestamp, RepositoryError, SessionRepository};
use crate::DbPool;

const SESSION_COLUMNS: &str = "id, contact_id, property_id, state, context_json, last_activity_at,
     closed_reason, created_at, updated_at";

pub struct SqlSessionRepository {
    pool: DbPool,
}

impl SqlSessionRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn decode(column: &str) -> impl FnOnce(sqlx::Error) -> RepositoryError + '_ {
    move |error| RepositoryError::Decode(format!("{column}: {error}"))
}

fn row_to_session(row: &sqlx::sqlite::SqliteRow) -> Result<Session, RepositoryError> {
    let id: String = row.try_get("id").map_err(decode("id"))?;
    let contact_id: String = row.try_get("contact_id").map_err(decode("contact_id"))?;
    let property_id: String =
        row.try_get("property_id").map_err(decode("property_id"))?;
    let state_str: String = row.try_get("state").map_err(decode("state"))?;
    let context_json: String =
        row.try_get("context_json").map_err(decode("context_json"))?;
    let last_activity_at: String =
        row.try_get("last_activity_at").map_err(decode("last_activity_at"))?;
    let closed_reason: Option<String> =
        row.try_get("closed_reason").map_err(decode("closed_reason"))?;
    let created_at: String = row.try_get("created_at").map_err(decode("created_at"))?;
    let updated_at: String = row.try_get("updated_at").map_err(decode("updated_at"))?;

    let state = SessionState::parse(&state_str)
        .ok_or_else(|| RepositoryError::Decode(format!("unknown session state `{state_str}`")))?;
    let context: ConversationContext = serde_json::from_str(&context_json)
        .map_err(|error| RepositoryError::Decode(format!("context_json: {error}")))?;

    Ok(Session {
        id: SessionId(id),
        contact_id: ContactId(contact_id),
        property_id: PropertyId(property_id),
        state,
        context,
        last_activity_at: parse_timestamp("last_activity_at", &last_activity_at)?,
        closed_reason,
        created_at: parse_timestamp("created_at", &created_at)?,
        updated_at: parse_timestamp("updated_at", &updated_at)?,
    })
}

fn encode_context(session: &Session) -> Result<String, RepositoryError> {
    serde_json::to_string(&session.context)
        .map_err(|error| RepositoryError::Decode(format!("context_json: {error}")))
}

fn map_unique_violation(error: sqlx::Error, contact_id: &ContactId) -> RepositoryError {
    match &error {
        sqlx::Error::Database(db) if db.is_unique_violation() => RepositoryError::Conflict(
            format!("contact {contact_id} already has an active session"),
        ),
        _ => RepositoryError::Database(error),
    }
}

#[async_trait::async_trait]
impl SessionRepository for SqlSessionRepository {
    async fn create(&self, session: Session) -> Result<(), RepositoryError> {
        let context_json = encode_context(&session)?;
        sqlx::query(
            "INSERT INTO conversation_session (id, contact_id, property_id, state, context_json,
                                               last_activity_at, closed_reason, created_at, updated_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&session.id.0)
        .bind(&session.contact_id.0)
        .bind(&session.property_id.0)
        .bind(session.state.as_str())
        .bind(&context_json)
        .bind(timestamp(session.last_activity_at))
        .bind(&session.closed_reason)
        .bind(timestamp(session.created_at))
        .bind(timestamp(session.updated_at))
        .execute(&self.pool)
        .await
        .map_err(|error| map_unique_violation(error, &session.contact_id))?;

        Ok(())
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM conversation_session WHERE id = ?"
        ))
        .bind(&id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    async fn find_active_by_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<Session>, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM conversation_session
             WHERE contact_id = ? AND state = 'active'
             ORDER BY created_at DESC LIMIT 1"
        ))
        .bind(&contact_id.0)
        .fetch_optional(&self.pool)
        .await?;

        row.as_ref().map(row_to_session).transpose()
    }

    async fn save(&self, session: Session) -> Result<(), RepositoryError> {
        let context_json = encode_context(&session)?;
        let result = sqlx::query(
            "UPDATE conversation_session
             SET state = ?, context_json = ?, last_activity_at = ?, closed_reason = ?, updated_at = ?
             WHERE id = ?",
        )
        .bind(session.state.as_str())
        .bind(&context_json)
        .bind(timestamp(session.last_activity_at))
        .bind(&session.closed_reason)
        .bind(timestamp(session.updated_at))
        .bind(&session.id.0)
        .execute(&self.pool)
        .await
        .map_err(|error| map_unique_violation(error, &session.contact_id))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("session {}", session.id)));
        }
        Ok(())
    }

    async fn list_idle_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Session>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {SESSION_COLUMNS} FROM conversation_session
             WHERE state = 'active' AND last_activity_at <= ?
             ORDER BY last_activity_at ASC"
        ))
        .bind(timestamp(cutoff))
        .fetch_all(&self.pool)
        .await?;

        rows.iter().map(row_to_session).collect()
    }

    async fn list(
        &self,
        state: Option<SessionState>,
        limit: u32,
    ) -> Result<Vec<Session>, RepositoryError> {
        let rows = match state {
            Some(state) => {
                sqlx::query(&format!(
                    "SELECT {SESSION_COLUMNS} FROM conversation_session
                     WHERE state = ? ORDER BY updated_at DESC LIMIT ?"
                ))
                .bind(state.as_str())
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
            None => {
                sqlx::query(&format!(
                    "SELECT {SESSION_COLUMNS} FROM conversation_session
                     ORDER BY updated_at DESC LIMIT ?"
                ))
                .bind(i64::from(limit))
                .fetch_all(&self.pool)
                .await?
            }
        };

        rows.iter().map(row_to_session).collect()
    }

    async fn count_by_state(&self) -> Result<Vec<(SessionState, u64)>, RepositoryError> {
        let rows = sqlx::query(
            "SELECT state, COUNT(*) AS count FROM conversation_session GROUP BY state ORDER BY state",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.iter()
            .map(|row| {
                let state_str: String = row.try_get("state").map_err(decode("state"))?;
                let count: i64 = row.try_get("count").map_err(decode("count"))?;
                let state = SessionState::parse(&state_str).ok_or_else(|| {
                    RepositoryError::Decode(format!("unknown session state `{state_str}`"))
                })?;
                Ok((state, u64::try_from(count).unwrap_or(0)))
            })
            .collect()
    }
}
