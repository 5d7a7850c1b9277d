//! Status derivation for a single test-case result.

use crate::types::{FunctionSlot, TestCaseResult};
use serde::Serialize;

/// Pass/fail badge shown for a test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Badge {
    Pass,
    Fail,
}

impl Badge {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Pass => "PASS",
            Self::Fail => "FAIL",
        }
    }
}

/// Where a primary error came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSource {
    /// The detection's required sub-function.
    Function(FunctionSlot),
    /// The top-level error, not attributable to a named sub-function.
    Generic,
}

/// The test-invalidating error for a result.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PrimaryError<'a> {
    pub source: ErrorSource,
    pub message: &'a str,
}

/// What an output row shows.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputValue<'a> {
    Output(&'a str),
    Error(&'a str),
}

/// Status of one optional output-producing sub-function.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OutputStatus<'a> {
    pub slot: FunctionSlot,
    pub value: OutputValue<'a>,
}

/// Everything presentation needs to know about one result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TestStatus<'a> {
    pub badge: Badge,
    pub primary_error: Option<PrimaryError<'a>>,
    pub outputs: Vec<OutputStatus<'a>>,
    pub consistent: bool,
}

/// Badge is a direct projection of `passed`; errors never influence it.
#[must_use]
pub const fn badge(result: &TestCaseResult) -> Badge {
    if result.passed { Badge::Pass } else { Badge::Fail }
}

/// Derive the primary error.
///
/// | required fn error | top-level error | → primary        |
/// |-------------------|-----------------|------------------|
/// | some              | *               | required fn      |
/// | none              | some            | generic          |
/// | none              | none            | none             |
#[must_use]
pub fn primary_error(result: &TestCaseResult) -> Option<PrimaryError<'_>> {
    let (slot, required) = result.functions.required();
    if let Some(message) = required.error_message() {
        return Some(PrimaryError {
            source: ErrorSource::Function(slot),
            message,
        });
    }
    result.error.as_ref().map(|e| PrimaryError {
        source: ErrorSource::Generic,
        message: &e.message,
    })
}

/// Derive one row per present optional sub-function.
///
/// Each sub-function's error is attributed to that sub-function only.
#[must_use]
pub fn output_statuses(result: &TestCaseResult) -> Vec<OutputStatus<'_>> {
    result
        .functions
        .outputs()
        .into_iter()
        .map(|(slot, sub)| {
            let value = sub.error_message().map_or_else(
                || OutputValue::Output(sub.output.as_deref().unwrap_or_default()),
                OutputValue::Error,
            );
            OutputStatus { slot, value }
        })
        .collect()
}

/// A passing result should carry no errors at all.
#[must_use]
pub fn is_consistent(result: &TestCaseResult) -> bool {
    !(result.passed && result.errored())
}

/// Derive the full status of a result.
#[must_use]
pub fn derive_status(result: &TestCaseResult) -> TestStatus<'_> {
    TestStatus {
        badge: badge(result),
        primary_error: primary_error(result),
        outputs: output_statuses(result),
        consistent: is_consistent(result),
    }
}
