//! Test output reporter with cargo test-like formatting.

use crate::presenter::{RunView, TestCaseView};
use crate::status::Badge;
use crate::types::{DetectionDefinition, RunSummary};
use std::io::{self, Write};
use std::time::Duration;

/// Reporter configuration.
#[derive(Debug, Clone)]
pub struct ReporterConfig {
    /// Show verbose output (sub-function rows for passing tests).
    pub verbose: bool,
    /// Use colors in output.
    pub color: bool,
}

impl Default for ReporterConfig {
    fn default() -> Self {
        Self {
            verbose: false,
            color: true,
        }
    }
}

const GREEN: &str = "32";
const RED: &str = "31";
const YELLOW: &str = "33";

/// Test reporter with cargo test-like output.
#[derive(Debug, Clone)]
pub struct Reporter {
    config: ReporterConfig,
}

impl Reporter {
    /// Create a new reporter with the given configuration.
    #[must_use]
    pub const fn new(config: ReporterConfig) -> Self {
        Self { config }
    }

    fn paint(&self, text: &str, color: &str) -> String {
        if self.config.color {
            format!("\x1b[{color}m{text}\x1b[0m")
        } else {
            text.to_string()
        }
    }

    /// Print the start of a detection run.
    pub fn run_start(&self, definition: &DetectionDefinition, test_count: usize) {
        println!();
        println!(
            "running {test_count} tests for {} ({})",
            definition.display_name(),
            definition.kind()
        );
    }

    /// Print a test result line, followed by its error and output rows.
    ///
    /// Rows of passing tests are only shown in verbose mode.
    pub fn test_result(&self, test: &TestCaseView) {
        let status = match test.badge {
            Badge::Pass => self.paint("ok", GREEN),
            Badge::Fail => self.paint("FAILED", RED),
        };
        println!("test {} ... {status}", test.title);

        if let Some(message) = &test.primary_error {
            println!("    {} {message}", self.paint("error:", RED));
        }

        if test.badge == Badge::Fail || self.config.verbose {
            for row in &test.rows {
                if row.is_error {
                    println!("    {}: {}", row.label, self.paint(&row.value, YELLOW));
                } else {
                    println!("    {}: {}", row.label, row.value);
                }
            }
        }

        if !test.consistent {
            self.warn(&format!(
                "test '{}' passed but reported errors",
                test.title
            ));
        }
    }

    /// Print every test of a run view, or its banner.
    pub fn run_view(&self, view: &RunView) {
        if let Some(banner) = &view.banner {
            self.error(banner);
            return;
        }
        for test in &view.tests {
            self.test_result(test);
        }
    }

    /// Print the final summary.
    pub fn summary(&self, summary: &RunSummary, duration: Duration) {
        let status = if summary.all_passed() {
            self.paint("ok", GREEN)
        } else {
            self.paint("FAILED", RED)
        };

        println!();
        println!(
            "test result: {}. {} passed; {} failed; {} errored; finished in {:.1}s",
            status,
            summary.passed,
            summary.failed,
            summary.errored,
            duration.as_secs_f64()
        );
    }

    /// Print verbose progress output (only in verbose mode).
    pub fn verbose(&self, message: &str) {
        if self.config.verbose {
            println!("  {message}");
        }
    }

    /// Print a warning message.
    pub fn warn(&self, message: &str) {
        eprintln!("{}: {message}", self.paint("warning", YELLOW));
    }

    /// Print an error message.
    pub fn error(&self, message: &str) {
        eprintln!("{}: {message}", self.paint("error", RED));
    }

    /// Flush stdout.
    pub fn flush(&self) {
        let _ = io::stdout().flush();
    }
}
