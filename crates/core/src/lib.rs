pub mod audit;
pub mod collaborators;
pub mod completion;
pub mod config;
pub mod domain;
pub mod errors;
pub mod flows;
pub mod questions;
pub mod validation;

pub use collaborators::{
    CollaboratorError, CompletionNotifier, Delivery, OutboundMessenger, SubjectExporter,
};
pub use completion::{
    CoherencePolicy, CompletionAssessment, CompletionEngine, CompletionSnapshot, CompletionTracker,
    RequirementGate, RequirementPolicy, RequirementReport, TrackerConfig,
};
pub use domain::property::{
    ContactId, FieldCategory, FieldName, FieldValue, OwnerDetails, PropertyFields, PropertyId,
    PropertyRecord, PropertyStatus, PropertyType,
};
pub use domain::session::{ConversationContext, Session, SessionId, SessionState};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use validation::{FieldValidator, SubjectContext, ValidationFailure, ValidationRules};
