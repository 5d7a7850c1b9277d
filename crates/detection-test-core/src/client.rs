//! Remote execution client for detection tests.

use crate::config::DetectionTestConfig;
use crate::types::{
    DetectionDefinition, DetectionKind, DetectionMetadata, DetectionResult, ErrorInfo,
    SubFunctionResult, TestCaseDefinition, TestCaseResult,
};
use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

/// Upper bound on a response body from the execution service.
pub const MAX_RESPONSE_BYTES: usize = 8 * 1024 * 1024;

/// Path for rule test requests, relative to the endpoint.
pub const RULE_TEST_PATH: &str = "/v1/detections/rules/test";

/// Path for policy test requests, relative to the endpoint.
pub const POLICY_TEST_PATH: &str = "/v1/detections/policies/test";

/// Failures of the execution request itself.
///
/// A well-formed response that reports failing tests is never a `TransportError`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("invalid client configuration: {0}")]
    Config(String),
    #[error("could not reach execution service: {0}")]
    Connect(String),
    #[error("execution service did not respond in time")]
    Timeout,
    #[error("execution service returned status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("malformed response from execution service: {0}")]
    Decode(String),
    #[error("response from execution service exceeded {limit} bytes")]
    ResponseTooLarge { limit: usize },
    /// Any other send failure, e.g. a URL the HTTP client rejects.
    #[error("request failed: {0}")]
    Request(String),
}

/// Executes a detection against a set of test cases.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Run every test case once and return one result per test.
    ///
    /// # Errors
    /// Returns a `TransportError` when the request cannot be completed.
    async fn execute(
        &self,
        definition: &DetectionDefinition,
        tests: &[TestCaseDefinition],
    ) -> Result<Vec<TestCaseResult>, TransportError>;
}

#[derive(Serialize)]
struct ExecutionRequest<'a> {
    body: &'a str,
    #[serde(flatten)]
    metadata: &'a DetectionMetadata,
    tests: &'a [TestCaseDefinition],
}

#[derive(Debug, Deserialize)]
struct ExecutionResponse {
    results: Vec<TestRecord>,
}

#[derive(Debug, Deserialize)]
struct TestRecord {
    #[serde(default)]
    id: String,
    name: String,
    passed: bool,
    #[serde(default)]
    error: Option<ErrorInfo>,
    #[serde(default)]
    functions: FunctionRecords,
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FunctionRecords {
    #[serde(default)]
    rule_function: Option<SubFunctionResult>,
    #[serde(default)]
    title_function: Option<SubFunctionResult>,
    #[serde(default)]
    dedup_function: Option<SubFunctionResult>,
    #[serde(default)]
    policy_function: Option<SubFunctionResult>,
}

impl TestRecord {
    /// Shape the record by the kind that was requested. A missing required
    /// slot becomes a not-executed result; slots foreign to the kind are dropped.
    fn into_result(self, kind: DetectionKind) -> TestCaseResult {
        let functions = match kind {
            DetectionKind::Rule => DetectionResult::Rule {
                rule: self.functions.rule_function.unwrap_or_default(),
                title: self.functions.title_function,
                dedup: self.functions.dedup_function,
            },
            DetectionKind::Policy => DetectionResult::Policy {
                policy: self.functions.policy_function.unwrap_or_default(),
            },
        };
        let id = if self.id.is_empty() {
            self.name.clone()
        } else {
            self.id
        };
        TestCaseResult {
            id,
            name: self.name,
            passed: self.passed,
            error: self.error,
            functions,
        }
    }
}

/// Decode a response body into results for the given kind.
///
/// # Errors
/// Returns `TransportError::Decode` if the body is not a valid response.
pub fn decode_response(body: &[u8], kind: DetectionKind) -> Result<Vec<TestCaseResult>, TransportError> {
    let response: ExecutionResponse =
        serde_json::from_slice(body).map_err(|e| TransportError::Decode(e.to_string()))?;
    Ok(response
        .results
        .into_iter()
        .map(|record| record.into_result(kind))
        .collect())
}

/// HTTP implementation of [`ExecutionClient`].
#[derive(Debug, Clone)]
pub struct HttpExecutionClient {
    client: Client,
    endpoint: String,
    api_token: Option<String>,
}

impl HttpExecutionClient {
    /// Build a client for the given endpoint.
    ///
    /// # Errors
    /// Returns `TransportError::Config` if the HTTP client cannot be built.
    pub fn new(
        endpoint: &str,
        api_token: Option<String>,
        timeout: Duration,
        connect_timeout: Duration,
    ) -> Result<Self, TransportError> {
        let client = Client::builder()
            .connect_timeout(connect_timeout)
            .timeout(timeout)
            .build()
            .map_err(|e| TransportError::Config(e.to_string()))?;
        Ok(Self {
            client,
            endpoint: endpoint.trim_end_matches('/').to_string(),
            api_token,
        })
    }

    /// Build a client from loaded configuration.
    ///
    /// # Errors
    /// See [`HttpExecutionClient::new`].
    pub fn from_config(config: &DetectionTestConfig) -> Result<Self, TransportError> {
        Self::new(
            &config.endpoint,
            config.api_token.clone(),
            Duration::from_millis(config.timeout),
            Duration::from_millis(config.connect_timeout),
        )
    }

    #[must_use]
    pub fn url_for(&self, kind: DetectionKind) -> String {
        let path = match kind {
            DetectionKind::Rule => RULE_TEST_PATH,
            DetectionKind::Policy => POLICY_TEST_PATH,
        };
        format!("{}{path}", self.endpoint)
    }
}

#[async_trait]
impl ExecutionClient for HttpExecutionClient {
    async fn execute(
        &self,
        definition: &DetectionDefinition,
        tests: &[TestCaseDefinition],
    ) -> Result<Vec<TestCaseResult>, TransportError> {
        let kind = definition.kind();
        let request = ExecutionRequest {
            body: &definition.body,
            metadata: &definition.metadata,
            tests,
        };

        let mut builder = self.client.post(self.url_for(kind)).json(&request);
        if let Some(token) = &self.api_token {
            builder = builder.bearer_auth(token);
        }

        let response = builder.send().await.map_err(|e| map_send_error(&e))?;
        let status = response.status();
        let body = read_body_with_limit(response, MAX_RESPONSE_BYTES).await?;

        if !status.is_success() {
            let preview = String::from_utf8_lossy(&body);
            return Err(TransportError::Status {
                status: status.as_u16(),
                body: preview.trim().to_string(),
            });
        }

        decode_response(&body, kind)
    }
}

fn map_send_error(error: &reqwest::Error) -> TransportError {
    if error.is_timeout() {
        TransportError::Timeout
    } else if error.is_connect() {
        TransportError::Connect(error.to_string())
    } else {
        TransportError::Request(error.to_string())
    }
}

async fn read_body_with_limit(
    mut response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, TransportError> {
    let mut body = Vec::new();
    while let Some(chunk) = response.chunk().await.map_err(|e| map_send_error(&e))? {
        if body.len() + chunk.len() > limit {
            return Err(TransportError::ResponseTooLarge { limit });
        }
        body.extend_from_slice(&chunk);
    }
    Ok(body)
}
