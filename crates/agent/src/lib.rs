//! Listing agent - conversation runtime for seller intake over WhatsApp
//!
//! This crate drives one conversation per seller contact until the property
//! record is complete:
//! - Interprets free-text replies into typed field values (`interpreter`, `extraction`)
//! - Tells questions apart from answers and answers them (`intent`, `knowledge`)
//! - Runs the per-message state machine and session registration (`runtime`)
//! - Closes idle sessions on a timer (`sweeper`)
//! - Exposes operator overrides and dashboard queries (`admin`)
//!
//! # Message loop
//!
//! 1. **Lock** the contact (`locks`), so messages from one seller never interleave
//! 2. **Classify** the message, answering questions without touching fields
//! 3. **Interpret** answers, then validate every extracted field in `listing-core`
//! 4. **Assess** completeness and the requirement gate, and ask the next field
//! 5. **Complete** by persisting the terminal state and firing export (`completion`)
//!
//! # Safety Principle
//!
//! The LLM only proposes values. Whether a value is stored, and whether a
//! listing is complete, is decided by the deterministic validator and gate.

pub mod admin;
pub mod completion;
pub mod extraction;
pub mod intent;
pub mod interpreter;
pub mod knowledge;
pub mod llm;
pub mod locks;
pub mod replies;
pub mod runtime;
pub mod sweeper;

pub use admin::AdminService;
pub use completion::CompletionTrigger;
pub use runtime::{Collaborators, ConversationError, ConversationManager, Registration};
pub use sweeper::IdleSweeper;
