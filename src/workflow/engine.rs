//! Runs the compiled graph over an [`EventCreationState`].

use tracing::{debug, info, warn};

use super::graph::{StepName, WorkflowGraph};
use super::state::{EventCreationState, RunStatus};
use super::steps;
use crate::context::TurnContext;
use crate::error::{WorkflowError, WorkflowErrorKind};

/// Drives one event-authoring run step by step.
///
/// Every step runs at most once per run, except the ticket loop, which is
/// bounded by `max_ticket_iterations`.
#[derive(Debug, Clone)]
pub struct WorkflowEngine {
    graph: WorkflowGraph,
    max_ticket_iterations: usize,
}

impl WorkflowEngine {
    pub fn new(max_ticket_iterations: usize) -> Result<Self, WorkflowError> {
        Ok(Self {
            graph: WorkflowGraph::event_creation()?,
            max_ticket_iterations,
        })
    }

    /// Upper bound on steps in one run.
    pub fn step_budget(&self) -> usize {
        // extract, create, respond, plus one check per add and a final check
        3 + 2 * self.max_ticket_iterations + 1
    }

    /// Start a run for `input` and drive it to a terminal state.
    pub async fn run(
        &self,
        state: &mut EventCreationState,
        input: &str,
        ctx: &TurnContext,
    ) -> Result<(), WorkflowError> {
        state.begin_run(input, ctx.today);
        state.current_step = self.graph.entry();
        self.resume(state, ctx).await
    }

    /// Continue from `state.current_step` until the run finishes.
    pub async fn resume(&self, state: &mut EventCreationState, ctx: &TurnContext) -> Result<(), WorkflowError> {
        if state.status == RunStatus::Idle {
            state.status = RunStatus::Running;
        }
        while !state.is_finished() {
            self.step(state, ctx).await?;
        }
        Ok(())
    }

    /// Execute the current step and route to the next one.
    pub async fn step(&self, state: &mut EventCreationState, ctx: &TurnContext) -> Result<(), WorkflowError> {
        let step = state.current_step;
        match self.execute(step, state, ctx).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(%step, error = %e, "workflow run failed");
                state.status = RunStatus::Failed;
                state.failure = Some(e.clone());
                Err(e)
            }
        }
    }

    async fn execute(
        &self,
        step: StepName,
        state: &mut EventCreationState,
        ctx: &TurnContext,
    ) -> Result<(), WorkflowError> {
        if ctx.cancel.is_cancelled() {
            return Err(WorkflowError::cancelled(step));
        }
        if !self.graph.is_looping(step) && state.visits(step) > 0 {
            return Err(WorkflowError::new(
                step,
                WorkflowErrorKind::Graph,
                "step already ran in this run",
            ));
        }
        if state.visited.len() >= self.step_budget() {
            return Err(WorkflowError::new(
                step,
                WorkflowErrorKind::LoopLimit,
                format!("run exceeded {} steps", self.step_budget()),
            ));
        }

        debug!(%step, "running workflow step");
        match step {
            StepName::ExtractDetails => steps::extract_details(state, ctx).await?,
            StepName::CreateEventDraft => steps::create_event_draft(state, ctx).await?,
            StepName::CheckTickets => steps::check_tickets(state, self.max_ticket_iterations),
            StepName::AddTicketType => steps::add_ticket_type(state, ctx).await?,
            StepName::GenerateResponse => steps::generate_response(state),
        }
        state.visited.push(step);

        match self.graph.next(step, state)? {
            Some(next) => state.current_step = next,
            None => {
                state.status = RunStatus::Completed;
                info!(
                    steps = state.visited.len(),
                    tools = state.invocations.len(),
                    "workflow run completed"
                );
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::engine_with;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;
    use tokio_util::sync::CancellationToken;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 19).unwrap()
    }

    #[tokio::test]
    async fn pottery_request_runs_the_canonical_path() {
        let (engine_ctx, _) = engine_with(|_| {});
        let ctx = TurnContext::new(engine_ctx, today());
        let engine = WorkflowEngine::new(5).unwrap();
        let mut state = EventCreationState::default();

        engine
            .run(
                &mut state,
                "Create a Saturday morning pottery workshop for ages 5-8, $20, max 15 spots",
                &ctx,
            )
            .await
            .unwrap();

        assert_eq!(
            state.visited,
            vec![
                StepName::ExtractDetails,
                StepName::CreateEventDraft,
                StepName::CheckTickets,
                StepName::AddTicketType,
                StepName::CheckTickets,
                StepName::GenerateResponse,
            ]
        );
        assert_eq!(state.status, RunStatus::Completed);
        let draft = state.draft.as_ref().unwrap();
        assert!(draft.is_complete());
        assert_eq!(draft.tickets().len(), 1);
        assert_eq!(draft.tickets()[0].capacity, Some(15));
    }

    #[tokio::test]
    async fn cancelled_turn_fails_before_the_next_step() {
        let (engine_ctx, _) = engine_with(|_| {});
        let cancel = CancellationToken::new();
        cancel.cancel();
        let ctx = TurnContext::new(engine_ctx, today()).with_cancel(cancel);
        let engine = WorkflowEngine::new(5).unwrap();
        let mut state = EventCreationState::default();

        let err = engine.run(&mut state, "plan a picnic", &ctx).await.unwrap_err();
        assert_eq!(err.kind, WorkflowErrorKind::Cancelled);
        assert_eq!(state.status, RunStatus::Failed);
        assert_eq!(state.failure.as_ref().unwrap().step, StepName::ExtractDetails);
    }

    #[tokio::test]
    async fn repeated_non_loop_step_is_refused() {
        let (engine_ctx, _) = engine_with(|_| {});
        let ctx = TurnContext::new(engine_ctx, today());
        let engine = WorkflowEngine::new(5).unwrap();
        let mut state = EventCreationState::default();
        state.begin_run("hello", today());
        state.visited.push(StepName::ExtractDetails);

        let err = engine.step(&mut state, &ctx).await.unwrap_err();
        assert_eq!(err.kind, WorkflowErrorKind::Graph);
    }
}
