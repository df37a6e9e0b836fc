use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::sync::RwLock;

use listing_core::domain::property::{
    ContactId, PropertyFields, PropertyId, PropertyRecord, PropertyStatus,
};
use listing_core::domain::session::{Session, SessionId, SessionState};

use super::{PropertyRepository, RepositoryError, SessionRepository};

#[derive(Default)]
pub struct InMemorySessionRepository {
    sessions: RwLock<HashMap<String, Session>>,
}

#[async_trait::async_trait]
impl SessionRepository for InMemorySessionRepository {
    async fn create(&self, session: Session) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        let duplicate_active = session.is_active()
            && sessions
                .values()
                .any(|existing| existing.is_active() && existing.contact_id == session.contact_id);
        if duplicate_active {
            return Err(RepositoryError::Conflict(format!(
                "contact {} already has an active session",
                session.contact_id
            )));
        }
        sessions.insert(session.id.0.clone(), session);
        Ok(())
    }

    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions.get(&id.0).cloned())
    }

    async fn find_active_by_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        Ok(sessions
            .values()
            .filter(|session| session.is_active() && &session.contact_id == contact_id)
            .max_by_key(|session| session.created_at)
            .cloned())
    }

    async fn save(&self, session: Session) -> Result<(), RepositoryError> {
        let mut sessions = self.sessions.write().await;
        match sessions.get_mut(&session.id.0) {
            Some(existing) => {
                *existing = session;
                Ok(())
            }
            None => Err(RepositoryError::NotFound(format!("session {}", session.id))),
        }
    }

    async fn list_idle_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        let mut idle: Vec<Session> =
            sessions.values().filter(|session| session.is_idle_since(cutoff)).cloned().collect();
        idle.sort_by_key(|session| session.last_activity_at);
        Ok(idle)
    }

    async fn list(
        &self,
        state: Option<SessionState>,
        limit: u32,
    ) -> Result<Vec<Session>, RepositoryError> {
        let sessions = self.sessions.read().await;
        let mut matching: Vec<Session> = sessions
            .values()
            .filter(|session| state.map(|state| session.state == state).unwrap_or(true))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }

    async fn count_by_state(&self) -> Result<Vec<(SessionState, u64)>, RepositoryError> {
        let sessions = self.sessions.read().await;
        let mut counts: Vec<(SessionState, u64)> = Vec::new();
        for session in sessions.values() {
            match counts.iter_mut().find(|(state, _)| *state == session.state) {
                Some((_, count)) => *count += 1,
                None => counts.push((session.state, 1)),
            }
        }
        counts.sort_by_key(|(state, _)| state.as_str());
        Ok(counts)
    }
}

#[derive(Default)]
pub struct InMemoryPropertyRepository {
    properties: RwLock<HashMap<String, PropertyRecord>>,
}

#[async_trait::async_trait]
impl PropertyRepository for InMemoryPropertyRepository {
    async fn create(&self, record: PropertyRecord) -> Result<(), RepositoryError> {
        let mut properties = self.properties.write().await;
        if properties.contains_key(&record.id.0) {
            return Err(RepositoryError::Conflict(format!("property {} already exists", record.id)));
        }
        properties.insert(record.id.0.clone(), record);
        Ok(())
    }

    async fn find_by_id(&self, id: &PropertyId) -> Result<Option<PropertyRecord>, RepositoryError> {
        let properties = self.properties.read().await;
        Ok(properties.get(&id.0).cloned())
    }

    async fn update_fields(
        &self,
        id: &PropertyId,
        fields: &PropertyFields,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut properties = self.properties.write().await;
        let record = properties
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("property {id}")))?;
        record.fields = fields.clone();
        record.updated_at = updated_at;
        Ok(())
    }

    async fn update_status(
        &self,
        id: &PropertyId,
        status: PropertyStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError> {
        let mut properties = self.properties.write().await;
        let record = properties
            .get_mut(&id.0)
            .ok_or_else(|| RepositoryError::NotFound(format!("property {id}")))?;
        record.status = status;
        record.updated_at = updated_at;
        Ok(())
    }

    async fn list(
        &self,
        status: Option<PropertyStatus>,
        limit: u32,
    ) -> Result<Vec<PropertyRecord>, RepositoryError> {
        let properties = self.properties.read().await;
        let mut matching: Vec<PropertyRecord> = properties
            .values()
            .filter(|record| status.as_ref().map(|status| &record.status == status).unwrap_or(true))
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.updated_at.cmp(&a.updated_at));
        matching.truncate(limit as usize);
        Ok(matching)
    }
}
