//! Automation sessions: state machine, registry, and the orchestrator
//! that drives them.

pub mod model;
pub mod orchestrator;
pub mod registry;

pub use model::{AutomationRun, AutomationSession, PendingUserInput, SessionStatus};
pub use orchestrator::{AdvanceOutcome, Orchestrator};
pub use registry::{SessionHandle, SessionRegistry};
