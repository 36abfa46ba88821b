pub mod engine;
pub mod locks;
pub mod states;

pub use engine::{AssessmentFlow, FlowDefinition, FlowEngine, FlowTransitionError};
pub use locks::AssessmentLocks;
pub use states::{FlowContext, FlowEvent, TransitionOutcome};
