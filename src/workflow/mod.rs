//! Event-authoring workflow: a compiled step graph over a typed state.

pub mod engine;
pub mod graph;
pub mod state;
mod steps;

pub use engine::WorkflowEngine;
pub use graph::{GraphBuilder, Router, StepName, WorkflowGraph};
pub use state::{EventCreationState, RunStatus};
