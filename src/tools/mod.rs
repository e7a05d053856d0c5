//! Tool system: contracts, validation, dispatch and the event tool
//! catalogue.

pub mod arguments;
pub mod event_tools;
pub mod registry;
pub mod tool;
pub mod types;
pub mod validation;

pub use arguments::ToolArguments;
pub use event_tools::default_registry;
pub use registry::{ToolInvocation, ToolOutcome, ToolRegistry, DEFAULT_TOOL_TIMEOUT};
pub use tool::{Idempotency, Tool, ToolContext};
pub use types::{ParameterBuilder, ToolParameters};
pub use validation::validate_arguments;
