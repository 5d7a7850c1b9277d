//! Display-ready views of test results.
//!
//! The mapper never branches on detection kind: rows come from whichever
//! optional sub-function slots are present on the result.

use crate::orchestrator::RunState;
use crate::status::{Badge, OutputValue, derive_status};
use crate::types::TestCaseResult;
use serde::Serialize;

/// Title of the run-level error banner.
pub const ERROR_BANNER_TITLE: &str = "Internal error during testing";

/// One labelled line under a test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DisplayRow {
    pub label: String,
    pub value: String,
    pub is_error: bool,
}

/// A rendered test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCaseView {
    pub id: String,
    pub title: String,
    pub badge: Badge,
    pub primary_error: Option<String>,
    pub rows: Vec<DisplayRow>,
    /// False when a passing test still reports errors.
    pub consistent: bool,
}

/// A rendered run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunView {
    pub loading: bool,
    pub banner: Option<String>,
    pub tests: Vec<TestCaseView>,
}

impl RunView {
    /// Total number of output rows across all tests.
    #[must_use]
    pub fn row_count(&self) -> usize {
        self.tests.iter().map(|t| t.rows.len()).sum()
    }
}

/// Map one result into its view.
#[must_use]
pub fn map(result: &TestCaseResult) -> TestCaseView {
    let status = derive_status(result);
    let rows = status
        .outputs
        .iter()
        .map(|output| {
            let (value, is_error) = match output.value {
                OutputValue::Output(text) => (text, false),
                OutputValue::Error(message) => (message, true),
            };
            DisplayRow {
                label: output.slot.label().to_string(),
                value: value.to_string(),
                is_error,
            }
        })
        .collect();

    TestCaseView {
        id: result.id.clone(),
        title: result.name.clone(),
        badge: status.badge,
        primary_error: status.primary_error.map(|p| p.message.to_string()),
        rows,
        consistent: status.consistent,
    }
}

/// Map the orchestrator state into a run view.
///
/// A failed run shows only the banner; no test rows survive it.
#[must_use]
pub fn map_run(state: &RunState) -> RunView {
    match state {
        RunState::Idle => RunView::default(),
        RunState::InFlight { .. } => RunView {
            loading: true,
            ..RunView::default()
        },
        RunState::Succeeded(results) => RunView {
            loading: false,
            banner: None,
            tests: results.iter().map(map).collect(),
        },
        RunState::Failed(error) => RunView {
            loading: false,
            banner: Some(format!("{ERROR_BANNER_TITLE}: {error}")),
            tests: Vec::new(),
        },
    }
}
