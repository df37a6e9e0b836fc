use serde::{Deserialize, Serialize};

use crate::domain::property::FieldName;
use crate::domain::session::SessionState;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionEvent {
    MessageProcessed,
    CompletionConfirmed,
    IdleTimeoutElapsed,
    /// A new registration from the same contact replaces the open session.
    Superseded,
    AdminForceComplete,
    AdminReopen,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct FlowContext {
    pub missing_required_fields: Vec<FieldName>,
    pub failed_requirements: Vec<String>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum FlowAction {
    PromptNextField,
    PersistTerminalState,
    ExportSubject,
    NotifyStaff,
    SendCompletionMessage,
    SendTimeoutNotice,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TransitionOutcome {
    pub from: SessionState,
    pub to: SessionState,
    pub event: SessionEvent,
    pub actions: Vec<FlowAction>,
}
