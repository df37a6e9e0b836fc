use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::property::{ContactId, FieldName, PropertyId};

#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct SessionId(pub String);

impl SessionId {
    pub fn generate() -> Self {
        Self(format!("SES-{}", Uuid::new_v4()))
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Active,
    Completed,
    TimedOut,
}

impl SessionState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::TimedOut => "timed_out",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_ascii_lowercase().as_str() {
            "active" => Some(Self::Active),
            "completed" => Some(Self::Completed),
            "timed_out" => Some(Self::TimedOut),
            _ => None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        !matches!(self, Self::Active)
    }
}

pub const CONTEXT_VERSION: u32 = 1;

/// Conversation progress persisted with the session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationContext {
    pub version: u32,
    pub current_field: Option<FieldName>,
    pub collected_fields: BTreeSet<FieldName>,
    pub step: u32,
}

impl Default for ConversationContext {
    fn default() -> Self {
        Self {
            version: CONTEXT_VERSION,
            current_field: None,
            collected_fields: BTreeSet::new(),
            step: 0,
        }
    }
}

impl ConversationContext {
    pub fn record_collected(&mut self, field: FieldName) {
        self.collected_fields.insert(field);
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: SessionId,
    pub contact_id: ContactId,
    pub property_id: PropertyId,
    pub state: SessionState,
    pub context: ConversationContext,
    pub last_activity_at: DateTime<Utc>,
    pub closed_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Session {
    pub fn open(contact_id: ContactId, property_id: PropertyId, now: DateTime<Utc>) -> Self {
        Self {
            id: SessionId::generate(),
            contact_id,
            property_id,
            state: SessionState::Active,
            context: ConversationContext::default(),
            last_activity_at: now,
            closed_reason: None,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn is_active(&self) -> bool {
        self.state == SessionState::Active
    }

    /// Resets the idle clock. Later timestamps always win.
    pub fn touch(&mut self, now: DateTime<Utc>) {
        if now > self.last_activity_at {
            self.last_activity_at = now;
        }
        self.updated_at = now.max(self.updated_at);
    }

    pub fn is_idle_since(&self, cutoff: DateTime<Utc>) -> bool {
        self.is_active() && self.last_activity_at <= cutoff
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use super::{Session, SessionState};
    use crate::domain::property::{ContactId, FieldName, PropertyId};

    fn session() -> Session {
        Session::open(
            ContactId("573001234567".to_string()),
            PropertyId("PROP-1".to_string()),
            Utc::now() - Duration::hours(30),
        )
    }

    #[test]
    fn new_sessions_start_active_with_empty_context() {
        let session = session();
        assert_eq!(session.state, SessionState::Active);
        assert!(session.context.collected_fields.is_empty());
        assert_eq!(session.context.current_field, None);
        assert!(session.id.0.starts_with("SES-"));
    }

    #[test]
    fn touch_never_moves_activity_backwards() {
        let mut session = session();
        let later = Utc::now();
        session.touch(later);
        session.touch(later - Duration::hours(2));
        assert_eq!(session.last_activity_at, later);
    }

    #[test]
    fn idle_check_respects_cutoff_and_state() {
        let mut session = session();
        let cutoff = Utc::now() - Duration::hours(24);
        assert!(session.is_idle_since(cutoff));

        session.state = SessionState::Completed;
        assert!(!session.is_idle_since(cutoff));
    }

    #[test]
    fn context_serializes_with_version_and_wire_field_names() {
        let mut session = session();
        session.context.current_field = Some(FieldName::BuiltArea);
        session.context.record_collected(FieldName::PropertyType);

        let json = serde_json::to_value(&session.context).expect("serialize context");
        assert_eq!(json["version"], 1);
        assert_eq!(json["current_field"], "area_construida");
        assert_eq!(json["collected_fields"][0], "tipo_propiedad");
    }

    #[test]
    fn state_parse_round_trips() {
        for state in [SessionState::Active, SessionState::Completed, SessionState::TimedOut] {
            assert_eq!(SessionState::parse(state.as_str()), Some(state));
        }
        assert!(SessionState::TimedOut.is_terminal());
        assert!(!SessionState::Active.is_terminal());
    }
}
