//! Tool catalogue and dispatcher.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::time::Instant;
use tracing::{debug, warn};

use super::arguments::ToolArguments;
use super::tool::{Idempotency, Tool, ToolContext};
use super::validation::validate_arguments;
use crate::error::{ComposerError, ToolValidationError};
use crate::provider::ToolDefinition;
use crate::types::ToolCall;

/// Default tool execution timeout.
pub const DEFAULT_TOOL_TIMEOUT: Duration = Duration::from_secs(10);

/// What happened to one dispatched call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ToolOutcome {
    Success { output: Value },
    /// Input broke the contract; the executor did not run.
    Rejected { error: ToolValidationError },
    Failed { message: String },
    NotFound,
}

/// Audit record of one tool call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolInvocation {
    pub call_id: String,
    pub tool: String,
    pub input: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency: Option<Idempotency>,
    pub outcome: ToolOutcome,
    pub duration_ms: u64,
    pub at: DateTime<Utc>,
}

impl ToolInvocation {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ToolOutcome::Success { .. })
    }

    pub fn output(&self) -> Option<&Value> {
        match &self.outcome {
            ToolOutcome::Success { output } => Some(output),
            _ => None,
        }
    }

    /// What the model is told about this call.
    pub fn observation(&self) -> Value {
        match &self.outcome {
            ToolOutcome::Success { output } => output.clone(),
            ToolOutcome::Rejected { error } => json!({
                "error": "invalid_input",
                "field": error.field,
                "message": error.message,
            }),
            ToolOutcome::Failed { message } => json!({
                "error": "tool_failed",
                "message": message,
            }),
            ToolOutcome::NotFound => json!({
                "error": "unknown_tool",
                "message": format!("no tool named '{}'", self.tool),
            }),
        }
    }

    /// The failure as an engine error, if the call failed.
    pub fn error(&self) -> Option<ComposerError> {
        match &self.outcome {
            ToolOutcome::Success { .. } => None,
            ToolOutcome::Rejected { error } => Some(error.clone().into()),
            ToolOutcome::Failed { message } => {
                Some(ComposerError::tool_execution(&self.tool, message))
            }
            ToolOutcome::NotFound => Some(ComposerError::tool_execution(&self.tool, "unknown tool")),
        }
    }
}

/// Registered tools, keyed by name.
#[derive(Clone)]
pub struct ToolRegistry {
    tools: BTreeMap<String, Arc<dyn Tool>>,
    timeout: Duration,
}

impl std::fmt::Debug for ToolRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolRegistry")
            .field("tools", &self.tools.keys().collect::<Vec<_>>())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            tools: BTreeMap::new(),
            timeout: DEFAULT_TOOL_TIMEOUT,
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn register(&mut self, tool: Arc<dyn Tool>) {
        self.tools.insert(tool.name().to_string(), tool);
    }

    pub fn get(&self, name: &str) -> Option<&Arc<dyn Tool>> {
        self.tools.get(name)
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.keys().map(String::as_str).collect()
    }

    pub fn idempotency(&self, name: &str) -> Option<Idempotency> {
        self.tools.get(name).map(|t| t.idempotency())
    }

    /// Definitions to offer a provider.
    pub fn definitions(&self) -> Vec<ToolDefinition> {
        self.tools
            .values()
            .map(|t| ToolDefinition {
                name: t.name().to_string(),
                description: t.description().to_string(),
                parameters: t.parameters().schema.clone(),
            })
            .collect()
    }

    /// Validate and execute one call against `ctx`.
    ///
    /// Never fails: every outcome, including rejection and timeout, is
    /// captured in the returned record.
    pub async fn dispatch(&self, call: &ToolCall, ctx: &mut ToolContext) -> ToolInvocation {
        let started = Instant::now();
        let at = Utc::now();
        let tool = self.tools.get(&call.name);

        let outcome = match tool {
            None => {
                warn!(tool = %call.name, "unknown tool requested");
                ToolOutcome::NotFound
            }
            Some(tool) => self.run(tool.as_ref(), call, ctx).await,
        };

        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        debug!(tool = %call.name, call_id = %call.id, duration_ms, ?outcome, "tool dispatched");

        ToolInvocation {
            call_id: call.id.clone(),
            tool: call.name.clone(),
            input: call.arguments.clone(),
            idempotency: tool.map(|t| t.idempotency()),
            outcome,
            duration_ms,
            at,
        }
    }

    async fn run(&self, tool: &dyn Tool, call: &ToolCall, ctx: &mut ToolContext) -> ToolOutcome {
        if let Err(error) = validate_arguments(tool.name(), &call.arguments, &tool.parameters().schema) {
            debug!(tool = tool.name(), %error, "tool input rejected");
            return ToolOutcome::Rejected { error };
        }

        let args = ToolArguments::new(tool.name(), call.arguments.clone());
        // Work on a scratch copy so a timed-out or failed call leaves `ctx`
        // untouched.
        let mut scratch = ctx.clone();
        match tokio::time::timeout(self.timeout, tool.execute(&args, &mut scratch)).await {
            Ok(Ok(output)) => {
                *ctx = scratch;
                ToolOutcome::Success { output }
            }
            Ok(Err(ComposerError::ToolValidation(error))) => ToolOutcome::Rejected { error },
            Ok(Err(e)) => ToolOutcome::Failed {
                message: e.to_string(),
            },
            Err(_) => ToolOutcome::Failed {
                message: format!("timed out after {}ms", self.timeout.as_millis()),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::InMemoryCalendar;
    use crate::tools::ToolParameters;
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct Counting {
        params: ToolParameters,
        calls: AtomicUsize,
        delay: Duration,
    }

    #[async_trait]
    impl Tool for Counting {
        fn name(&self) -> &str {
            "count"
        }
        fn description(&self) -> &str {
            "Counts calls"
        }
        fn parameters(&self) -> &ToolParameters {
            &self.params
        }
        fn idempotency(&self) -> Idempotency {
            Idempotency::SideEffecting
        }
        async fn execute(
            &self,
            args: &ToolArguments,
            ctx: &mut ToolContext,
        ) -> Result<Value, ComposerError> {
            tokio::time::sleep(self.delay).await;
            self.calls.fetch_add(1, Ordering::SeqCst);
            ctx.draft = Some(Default::default());
            Ok(json!({"n": args.get_i64_opt("n")}))
        }
    }

    fn setup(delay: Duration) -> (ToolRegistry, Arc<Counting>, ToolContext) {
        let tool = Arc::new(Counting {
            params: ToolParameters::object()
                .integer("n", "A number", 0, 10, true)
                .build(),
            calls: AtomicUsize::new(0),
            delay,
        });
        let mut registry = ToolRegistry::new().with_timeout(Duration::from_millis(100));
        registry.register(tool.clone());
        let ctx = ToolContext::new(
            None,
            Arc::new(InMemoryCalendar::new()),
            NaiveDate::from_ymd_opt(2026, 10, 19).unwrap(),
        );
        (registry, tool, ctx)
    }

    #[tokio::test]
    async fn invalid_input_never_reaches_the_executor() {
        let (registry, tool, mut ctx) = setup(Duration::ZERO);
        let inv = registry
            .dispatch(&ToolCall::new("c1", "count", json!({"n": -1})), &mut ctx)
            .await;

        assert!(matches!(inv.outcome, ToolOutcome::Rejected { .. }));
        assert_eq!(tool.calls.load(Ordering::SeqCst), 0);
        assert!(ctx.draft.is_none());
        assert_eq!(inv.observation()["error"], "invalid_input");
        assert_eq!(inv.observation()["field"], "n");
    }

    #[tokio::test]
    async fn success_commits_context_changes() {
        let (registry, tool, mut ctx) = setup(Duration::ZERO);
        let inv = registry
            .dispatch(&ToolCall::new("c1", "count", json!({"n": 3})), &mut ctx)
            .await;

        assert!(inv.is_success());
        assert_eq!(inv.output().unwrap()["n"], 3);
        assert_eq!(inv.idempotency, Some(Idempotency::SideEffecting));
        assert_eq!(tool.calls.load(Ordering::SeqCst), 1);
        assert!(ctx.draft.is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn timed_out_call_leaves_context_untouched() {
        let (registry, _, mut ctx) = setup(Duration::from_secs(5));
        let inv = registry
            .dispatch(&ToolCall::new("c1", "count", json!({"n": 1})), &mut ctx)
            .await;

        assert!(matches!(inv.outcome, ToolOutcome::Failed { ref message } if message.contains("timed out")));
        assert!(ctx.draft.is_none());
    }

    #[tokio::test]
    async fn unknown_tool_is_recorded() {
        let (registry, _, mut ctx) = setup(Duration::ZERO);
        let inv = registry
            .dispatch(&ToolCall::new("c1", "nope", json!({})), &mut ctx)
            .await;
        assert_eq!(inv.outcome, ToolOutcome::NotFound);
        assert!(inv.idempotency.is_none());
        assert!(inv.error().is_some());
    }
}
