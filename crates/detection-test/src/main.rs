//! detection-test CLI - Test runner for rules and policies.

use clap::Parser;
use comfy_table::{Cell, Color, Table};
use detection_test_core::config::validate_config;
use detection_test_core::report::format_detection_summary;
use detection_test_core::{
    Badge, ConfigOverrides, DetectionReport, ExecutionReport, HttpExecutionClient, LoadedDetection,
    ReportFormat, Reporter, ReporterConfig, RunEvent, RunSummary, TestRunOrchestrator,
    apply_overrides, filter_tests, format_report_json, load_config, load_detection_file, map_run,
    resolve_detection_paths,
};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::task::JoinError;

/// Exit codes for the CLI.
mod exit_code {
    pub const SUCCESS: u8 = 0;
    pub const TESTS_FAILED: u8 = 1;
    pub const CONFIG_ERROR: u8 = 2;
    pub const EXECUTION_ERROR: u8 = 3;
}

/// Prints run events as they arrive. Only active for table output.
struct ProgressPrinter {
    reporter: Reporter,
    enabled: bool,
}

impl ProgressPrinter {
    const fn new(reporter: Reporter, enabled: bool) -> Self {
        Self { reporter, enabled }
    }

    async fn listen(self, mut events: mpsc::UnboundedReceiver<RunEvent>) {
        while let Some(event) = events.recv().await {
            self.on_event(&event);
        }
    }

    fn on_event(&self, event: &RunEvent) {
        if !self.enabled {
            return;
        }
        match event {
            RunEvent::Started { test_count, .. } => {
                self.reporter
                    .verbose(&format!("waiting for execution service ({test_count} tests)..."));
            }
            RunEvent::Completed { summary, .. } => {
                self.reporter.verbose(&format!(
                    "received {} results ({} errored)",
                    summary.total, summary.errored
                ));
            }
            RunEvent::Failed { error, .. } => {
                self.reporter.verbose(&format!("run failed: {error}"));
            }
            RunEvent::Superseded { ticket } => {
                self.reporter.verbose(&format!(
                    "dropped response of superseded run #{}",
                    ticket.generation()
                ));
            }
        }
        self.reporter.flush();
    }
}

#[derive(Parser)]
#[command(name = "detection-test")]
#[command(about = "Test runner for detection rules and policies")]
#[command(version)]
struct Cli {
    /// Detection files or directories to search for `*.detection.yaml`
    /// (default: current directory)
    #[arg(value_name = "PATH")]
    paths: Vec<PathBuf>,

    /// Execution service base URL (overrides config)
    #[arg(long)]
    endpoint: Option<String>,

    /// Request timeout in milliseconds (overrides config)
    #[arg(long)]
    timeout: Option<u64>,

    /// Bearer token for the execution service (overrides config)
    #[arg(long, env = "DETECTION_TEST_API_TOKEN", hide_env_values = true)]
    api_token: Option<String>,

    /// Output format: table, json
    #[arg(long, default_value = "table")]
    format: String,

    /// Filter test cases by name (substring match)
    #[arg(long)]
    filter: Option<String>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Disable colored output
    #[arg(long)]
    no_color: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    run_command(&cli).await
}

fn print_results_table(reports: &[DetectionReport]) {
    let mut table = Table::new();
    table.set_header(vec!["Detection", "Kind", "Test", "Result", "Error"]);

    for report in reports {
        if let Some(banner) = &report.error {
            table.add_row(vec![
                Cell::new(&report.detection),
                Cell::new(report.kind),
                Cell::new("-"),
                Cell::new("Error").fg(Color::Red),
                Cell::new(banner),
            ]);
            continue;
        }
        for test in &report.tests {
            let result_cell = match test.badge {
                Badge::Pass => Cell::new("Pass").fg(Color::Green),
                Badge::Fail => Cell::new("Fail").fg(Color::Red),
            };
            table.add_row(vec![
                Cell::new(&report.detection),
                Cell::new(report.kind),
                Cell::new(&test.title),
                result_cell,
                Cell::new(test.primary_error.as_deref().unwrap_or("")),
            ]);
        }
    }

    println!("{table}");
}

fn total_summary(reports: &[DetectionReport]) -> RunSummary {
    reports.iter().fold(RunSummary::default(), |mut acc, r| {
        acc.total += r.summary.total;
        acc.passed += r.summary.passed;
        acc.failed += r.summary.failed;
        acc.errored += r.summary.errored;
        acc
    })
}

/// Describe a progress printer task that did not finish cleanly.
fn progress_failure(outcome: Result<(), JoinError>) -> Option<String> {
    outcome
        .err()
        .map(|e| format!("progress output stopped early: {e}"))
}

/// Load config next to the detection file, run it once and build its report.
async fn run_detection(
    loaded: &LoadedDetection,
    overrides: &ConfigOverrides,
    filter: Option<&str>,
    reporter: &Reporter,
    show_progress: bool,
) -> Result<DetectionReport, String> {
    let config_dir = loaded.path.parent().unwrap_or_else(|| Path::new("."));
    let config = load_config(config_dir)
        .map(|config| apply_overrides(config, overrides))
        .map_err(|e| format!("{}: {e}", loaded.path.display()))?;
    validate_config(&config).map_err(|e| format!("{}: {e}", loaded.path.display()))?;

    let client = HttpExecutionClient::from_config(&config).map_err(|e| e.to_string())?;
    let tests = filter_tests(&loaded.tests, filter);
    if let Some(filter) = filter {
        if tests.is_empty() {
            reporter.warn(&format!(
                "no tests in {} match filter '{filter}'",
                loaded.path.display()
            ));
        }
    }

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let orchestrator = TestRunOrchestrator::new(client).with_events(events_tx);
    let progress = tokio::spawn(
        ProgressPrinter::new(reporter.clone(), show_progress).listen(events_rx),
    );

    if show_progress {
        reporter.run_start(&loaded.definition, tests.len());
        reporter.flush();
    }

    let _resolution = orchestrator
        .run(&loaded.definition, &tests)
        .await
        .map_err(|e| format!("{}: {e}", loaded.path.display()))?;

    let state = orchestrator.state();
    drop(orchestrator);
    if let Some(warning) = progress_failure(progress.await) {
        reporter.warn(&warning);
    }

    let view = map_run(&state);
    if show_progress {
        reporter.run_view(&view);
    }

    Ok(DetectionReport {
        detection: loaded.definition.display_name().to_string(),
        kind: loaded.definition.kind(),
        path: loaded.path.display().to_string(),
        tests: view.tests,
        summary: state
            .results()
            .map(RunSummary::from_results)
            .unwrap_or_default(),
        error: view.banner,
    })
}

#[allow(clippy::too_many_lines)]
async fn run_command(cli: &Cli) -> ExitCode {
    let reporter = Reporter::new(ReporterConfig {
        verbose: cli.verbose,
        color: !cli.no_color,
    });

    // Parse format
    let report_format: ReportFormat = match cli.format.parse() {
        Ok(f) => f,
        Err(e) => {
            reporter.error(&format!("Invalid format: {e}"));
            return ExitCode::from(exit_code::CONFIG_ERROR);
        }
    };

    let paths = match resolve_detection_paths(&cli.paths) {
        Ok(paths) => paths,
        Err(e) => {
            reporter.error(&format!("Failed to resolve detection paths: {e}"));
            return ExitCode::from(exit_code::CONFIG_ERROR);
        }
    };

    if paths.is_empty() {
        reporter.error("No detection files found");
        return ExitCode::from(exit_code::CONFIG_ERROR);
    }

    // Load everything up front so a broken file fails before any request is sent
    let mut detections = Vec::with_capacity(paths.len());
    for path in &paths {
        match load_detection_file(path) {
            Ok(loaded) => detections.push(loaded),
            Err(e) => {
                reporter.error(&format!("Failed to load {}: {e}", path.display()));
                return ExitCode::from(exit_code::CONFIG_ERROR);
            }
        }
    }

    let overrides = ConfigOverrides {
        endpoint: cli.endpoint.clone(),
        timeout: cli.timeout,
        api_token: cli.api_token.clone(),
    };

    let show_progress = report_format == ReportFormat::Table;
    let start_time = Instant::now();

    if show_progress {
        println!("Running tests for {} detection(s)...", detections.len());
        for loaded in &detections {
            println!(
                "  - {} ({})",
                loaded.definition.display_name(),
                loaded.path.display()
            );
        }
    }

    let mut reports = Vec::with_capacity(detections.len());
    for loaded in &detections {
        match run_detection(
            loaded,
            &overrides,
            cli.filter.as_deref(),
            &reporter,
            show_progress,
        )
        .await
        {
            Ok(report) => reports.push(report),
            Err(e) => {
                reporter.error(&e);
                return ExitCode::from(exit_code::CONFIG_ERROR);
            }
        }
    }

    let summary = total_summary(&reports);
    let duration = start_time.elapsed();

    match report_format {
        ReportFormat::Json => {
            let report = ExecutionReport::now(reports.clone());
            println!("{}", format_report_json(&report));
        }
        ReportFormat::Table => {
            if reports.len() > 1 {
                println!("\n=== Summary ===");
                for report in &reports {
                    println!(
                        "  {}",
                        format_detection_summary(&report.detection, &report.summary)
                    );
                }
            }
            reporter.summary(&summary, duration);

            if cli.verbose {
                println!("\n=== Detailed Results ===");
                print_results_table(&reports);
            }
        }
    }

    if reports.iter().any(|r| r.error.is_some()) {
        ExitCode::from(exit_code::EXECUTION_ERROR)
    } else if summary.all_passed() {
        ExitCode::from(exit_code::SUCCESS)
    } else {
        ExitCode::from(exit_code::TESTS_FAILED)
    }
}
