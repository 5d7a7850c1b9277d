//! Test run orchestration.
//!
//! One orchestrator tracks one "current" run. Every run started bumps a
//! generation counter; a response is applied only if it carries the latest
//! generation, so the last run started always wins.

use crate::client::{ExecutionClient, TransportError};
use crate::types::{
    DetectionDefinition, RunSummary, TestCaseDefinition, TestCaseResult, ValidationError,
    validate_test_cases,
};
use thiserror::Error;
use tokio::sync::{mpsc, watch};

/// State of the current run.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum RunState {
    #[default]
    Idle,
    InFlight {
        test_count: usize,
    },
    Succeeded(Vec<TestCaseResult>),
    Failed(TransportError),
}

impl RunState {
    #[must_use]
    pub const fn is_in_flight(&self) -> bool {
        matches!(self, Self::InFlight { .. })
    }

    #[must_use]
    pub fn results(&self) -> Option<&[TestCaseResult]> {
        match self {
            Self::Succeeded(results) => Some(results),
            _ => None,
        }
    }

    #[must_use]
    pub const fn error(&self) -> Option<&TransportError> {
        match self {
            Self::Failed(error) => Some(error),
            _ => None,
        }
    }
}

/// Identifies one started run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RunTicket(u64);

impl RunTicket {
    #[must_use]
    pub const fn generation(self) -> u64 {
        self.0
    }
}

/// State together with the generation that produced it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunSnapshot {
    pub generation: u64,
    pub state: RunState,
}

/// Whether a resolved run was allowed to update state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Resolution {
    Applied,
    /// A newer run was started before this one resolved.
    Stale,
}

/// Events emitted as runs progress.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunEvent {
    Started {
        ticket: RunTicket,
        test_count: usize,
    },
    Completed {
        ticket: RunTicket,
        summary: RunSummary,
    },
    Failed {
        ticket: RunTicket,
        error: TransportError,
    },
    /// The response for this run arrived after a newer run started and was dropped.
    Superseded {
        ticket: RunTicket,
    },
}

/// Sender for run events.
pub type RunEventSender = mpsc::UnboundedSender<RunEvent>;

/// Errors raised before a run is started.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum OrchestratorError {
    #[error("validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Coordinates test runs against an [`ExecutionClient`].
pub struct TestRunOrchestrator<C> {
    client: C,
    snapshot: watch::Sender<RunSnapshot>,
    events: Option<RunEventSender>,
}

impl<C: ExecutionClient> TestRunOrchestrator<C> {
    #[must_use]
    pub fn new(client: C) -> Self {
        let (snapshot, _) = watch::channel(RunSnapshot::default());
        Self {
            client,
            snapshot,
            events: None,
        }
    }

    /// Mirror applied transitions to `events`.
    #[must_use]
    pub fn with_events(mut self, events: RunEventSender) -> Self {
        self.events = Some(events);
        self
    }

    #[must_use]
    pub fn state(&self) -> RunState {
        self.snapshot.borrow().state.clone()
    }

    /// Ticket of the most recently started run, if any.
    #[must_use]
    pub fn current_ticket(&self) -> Option<RunTicket> {
        let generation = self.snapshot.borrow().generation;
        (generation > 0).then_some(RunTicket(generation))
    }

    /// Watch state transitions.
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<RunSnapshot> {
        self.snapshot.subscribe()
    }

    /// Start a new run, superseding any run still in flight. Prior results are cleared.
    pub fn begin(&self, test_count: usize) -> RunTicket {
        let mut ticket = RunTicket(0);
        self.snapshot.send_modify(|snapshot| {
            snapshot.generation += 1;
            snapshot.state = RunState::InFlight { test_count };
            ticket = RunTicket(snapshot.generation);
        });
        self.emit(RunEvent::Started { ticket, test_count });
        ticket
    }

    /// Apply the outcome of a run if it is still the current one.
    pub fn resolve(
        &self,
        ticket: RunTicket,
        outcome: Result<Vec<TestCaseResult>, TransportError>,
    ) -> Resolution {
        let event = match &outcome {
            Ok(results) => RunEvent::Completed {
                ticket,
                summary: RunSummary::from_results(results),
            },
            Err(error) => RunEvent::Failed {
                ticket,
                error: error.clone(),
            },
        };

        let applied = self.snapshot.send_if_modified(|snapshot| {
            if snapshot.generation != ticket.0 {
                return false;
            }
            snapshot.state = match outcome {
                Ok(results) => RunState::Succeeded(results),
                Err(error) => RunState::Failed(error),
            };
            true
        });

        if applied {
            self.emit(event);
            Resolution::Applied
        } else {
            self.emit(RunEvent::Superseded { ticket });
            Resolution::Stale
        }
    }

    /// Validate input, execute it and apply the outcome.
    ///
    /// Transport failures become [`RunState::Failed`]; they are not returned here.
    ///
    /// # Errors
    /// Returns `OrchestratorError::Validation` if the input is malformed. State
    /// is left untouched in that case.
    pub async fn run(
        &self,
        definition: &DetectionDefinition,
        tests: &[TestCaseDefinition],
    ) -> Result<Resolution, OrchestratorError> {
        definition.validate()?;
        validate_test_cases(tests)?;

        let ticket = self.begin(tests.len());
        let outcome = self.client.execute(definition, tests).await;
        Ok(self.resolve(ticket, outcome))
    }

    fn emit(&self, event: RunEvent) {
        if let Some(tx) = &self.events {
            let _ = tx.send(event);
        }
    }
}
