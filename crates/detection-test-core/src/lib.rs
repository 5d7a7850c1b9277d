//! Core library for detection-test.
//!
//! This crate runs rules and policies against a remote execution service:
//! - Detection file loading from YAML
//! - Remote execution client
//! - Run orchestration with last-run-wins ordering
//! - Status derivation and display-ready views
//! - Console and JSON reporting

pub mod client;
pub mod config;
pub mod loader;
pub mod orchestrator;
pub mod presenter;
pub mod report;
pub mod reporter;
pub mod status;
pub mod types;

pub use client::{ExecutionClient, HttpExecutionClient, TransportError, decode_response};
pub use config::{ConfigError, ConfigOverrides, DetectionTestConfig, apply_overrides, load_config};
pub use loader::{
    LoadedDetection, LoaderError, discover_detection_files, filter_tests, load_detection_file,
    resolve_detection_paths,
};
pub use orchestrator::{
    OrchestratorError, Resolution, RunEvent, RunEventSender, RunSnapshot, RunState, RunTicket,
    TestRunOrchestrator,
};
pub use presenter::{DisplayRow, RunView, TestCaseView, map, map_run};
pub use report::{DetectionReport, ExecutionReport, ReportFormat, format_report_json};
pub use reporter::{Reporter, ReporterConfig};
pub use status::{Badge, derive_status};
pub use types::*;
