pub mod engine;
pub mod events;

pub use engine::{Orchestrator, OrchestratorConfig, UnitRegistry};
pub use events::{EventChannel, EventEnvelope, WorkflowEvent};
