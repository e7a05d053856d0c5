//! Compiled step graph.
//!
//! Edges are either fixed or decided by a plain routing function over the
//! state, so the same state always routes to the same next step.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter, EnumString, IntoEnumIterator};

use super::state::EventCreationState;
use crate::error::{WorkflowError, WorkflowErrorKind};

/// Named steps of the event-authoring workflow.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    Display,
    EnumString,
    EnumIter,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum StepName {
    #[default]
    ExtractDetails,
    CreateEventDraft,
    CheckTickets,
    AddTicketType,
    GenerateResponse,
}

/// Routing function for a conditional edge.
pub type Router = fn(&EventCreationState) -> StepName;

#[derive(Clone, Copy)]
enum Edge {
    To(StepName),
    Route(Router),
    End,
}

impl fmt::Debug for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::To(step) => write!(f, "To({step})"),
            Self::Route(_) => f.write_str("Route"),
            Self::End => f.write_str("End"),
        }
    }
}

/// Validated graph ready to execute.
#[derive(Debug, Clone)]
pub struct WorkflowGraph {
    entry: StepName,
    edges: BTreeMap<StepName, Edge>,
    targets: BTreeMap<StepName, BTreeSet<StepName>>,
    /// Steps allowed to run more than once per run.
    looping: BTreeSet<StepName>,
}

impl WorkflowGraph {
    pub fn builder(entry: StepName) -> GraphBuilder {
        GraphBuilder {
            entry,
            edges: BTreeMap::new(),
            targets: BTreeMap::new(),
            looping: BTreeSet::new(),
        }
    }

    /// `extract_details → create_event_draft → check_tickets ⇄ add_ticket_type → generate_response`.
    pub fn event_creation() -> Result<Self, WorkflowError> {
        Self::builder(StepName::ExtractDetails)
            .edge(StepName::ExtractDetails, StepName::CreateEventDraft)
            .conditional(
                StepName::CreateEventDraft,
                route_after_create,
                &[StepName::CheckTickets, StepName::GenerateResponse],
            )
            .conditional(
                StepName::CheckTickets,
                route_tickets,
                &[StepName::AddTicketType, StepName::GenerateResponse],
            )
            .edge(StepName::AddTicketType, StepName::CheckTickets)
            .finish(StepName::GenerateResponse)
            .looping(&[StepName::CheckTickets, StepName::AddTicketType])
            .compile()
    }

    pub fn entry(&self) -> StepName {
        self.entry
    }

    pub fn is_looping(&self, step: StepName) -> bool {
        self.looping.contains(&step)
    }

    /// Next step after `step`, or `None` when `step` is terminal.
    pub fn next(&self, step: StepName, state: &EventCreationState) -> Result<Option<StepName>, WorkflowError> {
        match self.edges.get(&step) {
            Some(Edge::To(next)) => Ok(Some(*next)),
            Some(Edge::End) => Ok(None),
            Some(Edge::Route(router)) => {
                let next = router(state);
                let declared = self.targets.get(&step).is_some_and(|t| t.contains(&next));
                if declared {
                    Ok(Some(next))
                } else {
                    Err(WorkflowError::new(
                        step,
                        WorkflowErrorKind::Graph,
                        format!("router chose undeclared step '{next}'"),
                    ))
                }
            }
            None => Err(WorkflowError::new(
                step,
                WorkflowErrorKind::Graph,
                "step has no outgoing edge",
            )),
        }
    }
}

fn route_after_create(state: &EventCreationState) -> StepName {
    if state.halted {
        StepName::GenerateResponse
    } else {
        StepName::CheckTickets
    }
}

fn route_tickets(state: &EventCreationState) -> StepName {
    if state.needs_tickets {
        StepName::AddTicketType
    } else {
        StepName::GenerateResponse
    }
}

pub struct GraphBuilder {
    entry: StepName,
    edges: BTreeMap<StepName, Edge>,
    targets: BTreeMap<StepName, BTreeSet<StepName>>,
    looping: BTreeSet<StepName>,
}

impl GraphBuilder {
    pub fn edge(mut self, from: StepName, to: StepName) -> Self {
        self.edges.insert(from, Edge::To(to));
        self.targets.insert(from, BTreeSet::from([to]));
        self
    }

    pub fn conditional(mut self, from: StepName, router: Router, targets: &[StepName]) -> Self {
        self.edges.insert(from, Edge::Route(router));
        self.targets.insert(from, targets.iter().copied().collect());
        self
    }

    pub fn finish(mut self, step: StepName) -> Self {
        self.edges.insert(step, Edge::End);
        self.targets.insert(step, BTreeSet::new());
        self
    }

    pub fn looping(mut self, steps: &[StepName]) -> Self {
        self.looping.extend(steps.iter().copied());
        self
    }

    /// Check that every step has an edge, every target exists, and a
    /// terminal step is reachable from the entry.
    pub fn compile(self) -> Result<WorkflowGraph, WorkflowError> {
        let graph_error =
            |step: StepName, message: String| WorkflowError::new(step, WorkflowErrorKind::Graph, message);

        for step in StepName::iter() {
            if !self.edges.contains_key(&step) {
                return Err(graph_error(step, "step has no outgoing edge".into()));
            }
        }
        for (from, targets) in &self.targets {
            if let Some(missing) = targets.iter().find(|t| !self.edges.contains_key(*t)) {
                return Err(graph_error(*from, format!("edge to unknown step '{missing}'")));
            }
        }

        let mut seen = BTreeSet::new();
        let mut stack = vec![self.entry];
        let mut terminal = false;
        while let Some(step) = stack.pop() {
            if !seen.insert(step) {
                continue;
            }
            if matches!(self.edges.get(&step), Some(Edge::End)) {
                terminal = true;
            }
            if let Some(targets) = self.targets.get(&step) {
                stack.extend(targets.iter().copied());
            }
        }
        if !terminal {
            return Err(graph_error(self.entry, "no terminal step is reachable".into()));
        }

        Ok(WorkflowGraph {
            entry: self.entry,
            edges: self.edges,
            targets: self.targets,
            looping: self.looping,
        })
    }
}
