use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use thiserror::Error;

use listing_core::domain::property::{
    ContactId, PropertyFields, PropertyId, PropertyRecord, PropertyStatus,
};
use listing_core::domain::session::{Session, SessionId, SessionState};

pub mod memory;
pub mod property;
pub mod session;

pub use memory::{InMemoryPropertyRepository, InMemorySessionRepository};
pub use property::SqlPropertyRepository;
pub use session::SqlSessionRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("record not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
}

#[async_trait]
pub trait SessionRepository: Send + Sync {
    async fn create(&self, session: Session) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &SessionId) -> Result<Option<Session>, RepositoryError>;
    async fn find_active_by_contact(
        &self,
        contact_id: &ContactId,
    ) -> Result<Option<Session>, RepositoryError>;
    async fn save(&self, session: Session) -> Result<(), RepositoryError>;
    /// Active sessions whose last activity is at or before `cutoff`.
    async fn list_idle_since(
        &self,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Session>, RepositoryError>;
    async fn list(
        &self,
        state: Option<SessionState>,
        limit: u32,
    ) -> Result<Vec<Session>, RepositoryError>;
    async fn count_by_state(&self) -> Result<Vec<(SessionState, u64)>, RepositoryError>;
}

#[async_trait]
pub trait PropertyRepository: Send + Sync {
    async fn create(&self, record: PropertyRecord) -> Result<(), RepositoryError>;
    async fn find_by_id(&self, id: &PropertyId) -> Result<Option<PropertyRecord>, RepositoryError>;
    async fn update_fields(
        &self,
        id: &PropertyId,
        fields: &PropertyFields,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    async fn update_status(
        &self,
        id: &PropertyId,
        status: PropertyStatus,
        updated_at: DateTime<Utc>,
    ) -> Result<(), RepositoryError>;
    async fn list(
        &self,
        status: Option<PropertyStatus>,
        limit: u32,
    ) -> Result<Vec<PropertyRecord>, RepositoryError>;
}

/// Fixed-width UTC timestamps so that stored values compare lexicographically.
pub(crate) fn timestamp(value: DateTime<Utc>) -> String {
    value.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub(crate) fn parse_timestamp(column: &str, value: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(value)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|error| RepositoryError::Decode(format!("{column}: {error}")))
}
