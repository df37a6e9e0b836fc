pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, ListingIntakeFlow};
pub use states::{FlowAction, FlowContext, SessionEvent, TransitionOutcome};
