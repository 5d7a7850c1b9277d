//! Core data types for detection tests.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors raised when run input fails shape validation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("detection body cannot be empty")]
    EmptyBody,
    #[error("test case #{index} has an empty name")]
    EmptyTestName { index: usize },
    #[error("resource for test \"{name}\" is not valid json: {message}")]
    InvalidResource { name: String, message: String },
}

/// Kind of detection under test.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DetectionKind {
    Rule,
    Policy,
}

impl DetectionKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Rule => "rule",
            Self::Policy => "policy",
        }
    }
}

impl std::fmt::Display for DetectionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Metadata sent alongside the detection body.
///
/// Rules are scoped to log types, policies to resource types, so the variant
/// also fixes the detection kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DetectionMetadata {
    #[serde(rename = "logTypes")]
    LogTypes(Vec<String>),
    #[serde(rename = "resourceTypes")]
    ResourceTypes(Vec<String>),
}

impl DetectionMetadata {
    #[must_use]
    pub const fn kind(&self) -> DetectionKind {
        match self {
            Self::LogTypes(_) => DetectionKind::Rule,
            Self::ResourceTypes(_) => DetectionKind::Policy,
        }
    }

    #[must_use]
    pub fn types(&self) -> &[String] {
        match self {
            Self::LogTypes(types) | Self::ResourceTypes(types) => types,
        }
    }
}

/// A detection as supplied by the caller. Read-only for the duration of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DetectionDefinition {
    /// Display name used in reports.
    pub name: Option<String>,
    pub body: String,
    pub metadata: DetectionMetadata,
}

impl DetectionDefinition {
    #[must_use]
    pub fn rule(body: impl Into<String>, log_types: Vec<String>) -> Self {
        Self {
            name: None,
            body: body.into(),
            metadata: DetectionMetadata::LogTypes(log_types),
        }
    }

    #[must_use]
    pub fn policy(body: impl Into<String>, resource_types: Vec<String>) -> Self {
        Self {
            name: None,
            body: body.into(),
            metadata: DetectionMetadata::ResourceTypes(resource_types),
        }
    }

    #[must_use]
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    #[must_use]
    pub const fn kind(&self) -> DetectionKind {
        self.metadata.kind()
    }

    /// Name for display, falling back to the detection kind.
    #[must_use]
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_else(|| self.kind().as_str())
    }

    /// Check the definition before it is sent.
    ///
    /// # Errors
    /// Returns `ValidationError::EmptyBody` if the body is blank.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.body.trim().is_empty() {
            return Err(ValidationError::EmptyBody);
        }
        Ok(())
    }
}

/// A named sample input with the result the detection should produce for it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TestCaseDefinition {
    pub name: String,
    /// Serialized JSON payload.
    pub resource: String,
    pub expected_result: bool,
}

impl TestCaseDefinition {
    #[must_use]
    pub fn new(name: impl Into<String>, resource: impl Into<String>, expected_result: bool) -> Self {
        Self {
            name: name.into(),
            resource: resource.into(),
            expected_result,
        }
    }
}

/// Validate the shape of a test-case list: non-empty names and JSON resources.
///
/// Name collisions are not checked.
///
/// # Errors
/// Returns the first `ValidationError` found, in list order.
pub fn validate_test_cases(tests: &[TestCaseDefinition]) -> Result<(), ValidationError> {
    for (index, test) in tests.iter().enumerate() {
        if test.name.trim().is_empty() {
            return Err(ValidationError::EmptyTestName { index });
        }
        if let Err(e) = serde_json::from_str::<serde_json::Value>(&test.resource) {
            return Err(ValidationError::InvalidResource {
                name: test.name.clone(),
                message: e.to_string(),
            });
        }
    }
    Ok(())
}

/// Error reported by the execution service. The message is opaque.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ErrorInfo {
    pub message: String,
}

impl ErrorInfo {
    #[must_use]
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// Outcome of one sub-function. Both fields empty means it was not executed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubFunctionResult {
    #[serde(default)]
    pub output: Option<String>,
    #[serde(default)]
    pub error: Option<ErrorInfo>,
}

impl SubFunctionResult {
    #[must_use]
    pub fn output(output: impl Into<String>) -> Self {
        Self {
            output: Some(output.into()),
            error: None,
        }
    }

    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            output: None,
            error: Some(ErrorInfo::new(message)),
        }
    }

    #[must_use]
    pub fn error_message(&self) -> Option<&str> {
        self.error.as_ref().map(|e| e.message.as_str())
    }
}

/// Named sub-function slots across all detection kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FunctionSlot {
    RuleFunction,
    TitleFunction,
    DedupFunction,
    PolicyFunction,
}

impl FunctionSlot {
    /// Field name used on the wire.
    #[must_use]
    pub const fn wire_name(self) -> &'static str {
        match self {
            Self::RuleFunction => "ruleFunction",
            Self::TitleFunction => "titleFunction",
            Self::DedupFunction => "dedupFunction",
            Self::PolicyFunction => "policyFunction",
        }
    }

    #[must_use]
    pub const fn label(self) -> &'static str {
        match self {
            Self::RuleFunction => "Rule",
            Self::TitleFunction => "Alert Title",
            Self::DedupFunction => "Dedup String",
            Self::PolicyFunction => "Policy",
        }
    }
}

/// Sub-function outcomes, shaped by detection kind.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DetectionResult {
    Rule {
        #[serde(rename = "ruleFunction")]
        rule: SubFunctionResult,
        #[serde(rename = "titleFunction", skip_serializing_if = "Option::is_none")]
        title: Option<SubFunctionResult>,
        #[serde(rename = "dedupFunction", skip_serializing_if = "Option::is_none")]
        dedup: Option<SubFunctionResult>,
    },
    Policy {
        #[serde(rename = "policyFunction")]
        policy: SubFunctionResult,
    },
}

impl DetectionResult {
    #[must_use]
    pub const fn kind(&self) -> DetectionKind {
        match self {
            Self::Rule { .. } => DetectionKind::Rule,
            Self::Policy { .. } => DetectionKind::Policy,
        }
    }

    /// The sub-function whose failure invalidates the test.
    #[must_use]
    pub const fn required(&self) -> (FunctionSlot, &SubFunctionResult) {
        match self {
            Self::Rule { rule, .. } => (FunctionSlot::RuleFunction, rule),
            Self::Policy { policy } => (FunctionSlot::PolicyFunction, policy),
        }
    }

    /// Optional output-producing sub-functions that are present, title before dedup.
    #[must_use]
    pub fn outputs(&self) -> Vec<(FunctionSlot, &SubFunctionResult)> {
        match self {
            Self::Rule { title, dedup, .. } => [
                (FunctionSlot::TitleFunction, title.as_ref()),
                (FunctionSlot::DedupFunction, dedup.as_ref()),
            ]
            .into_iter()
            .filter_map(|(slot, result)| result.map(|r| (slot, r)))
            .collect(),
            Self::Policy { .. } => Vec::new(),
        }
    }

    /// Errors of every present sub-function, required first.
    #[must_use]
    pub fn errors(&self) -> Vec<(FunctionSlot, &ErrorInfo)> {
        std::iter::once(self.required())
            .chain(self.outputs())
            .filter_map(|(slot, result)| result.error.as_ref().map(|e| (slot, e)))
            .collect()
    }

    /// Whether any present sub-function carries an error.
    #[must_use]
    pub fn has_errors(&self) -> bool {
        !self.errors().is_empty()
    }
}

/// Outcome of one test case.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TestCaseResult {
    pub id: String,
    pub name: String,
    pub passed: bool,
    /// Run-level failure not attributable to a named sub-function.
    pub error: Option<ErrorInfo>,
    pub functions: DetectionResult,
}

impl TestCaseResult {
    /// Whether anything went wrong executing this test, as opposed to a plain mismatch.
    #[must_use]
    pub fn errored(&self) -> bool {
        self.error.is_some() || self.functions.has_errors()
    }
}

/// Counts over a completed run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    pub total: usize,
    pub passed: usize,
    pub failed: usize,
    /// Tests with at least one error, whatever their pass flag says.
    pub errored: usize,
}

impl RunSummary {
    #[must_use]
    pub fn from_results(results: &[TestCaseResult]) -> Self {
        let passed = results.iter().filter(|r| r.passed).count();
        Self {
            total: results.len(),
            passed,
            failed: results.len() - passed,
            errored: results.iter().filter(|r| r.errored()).count(),
        }
    }

    #[must_use]
    pub const fn all_passed(&self) -> bool {
        self.failed == 0
    }
}
