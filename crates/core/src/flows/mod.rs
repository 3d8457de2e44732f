pub mod engine;
pub mod states;

pub use engine::{FlowDefinition, FlowEngine, FlowTransitionError, ServiceRequestFlow};
pub use states::{FlowContext, RequestAction, TransitionOutcome};
