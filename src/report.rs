//! Parsing captured command output into structured results, and rendering
//! the human-readable report.
//!
//! The parser is a small state machine over the line stream. The first
//! whitespace-delimited token of a line decides its class via a fixed table;
//! everything unrecognized is a continuation of the message currently being
//! accumulated (build errors, compiler diagnostics, test log lines).

use std::collections::BTreeMap;

use crate::command::{CommandKind, CommandSpec};
use crate::engine::PackageRun;
use crate::Outcome;

/// Coverage value recorded when a line carries no parsable percentage.
pub const COVERAGE_UNKNOWN: f32 = -1.0;

const COVERAGE_MARKER: &str = "coverage: ";

const FAIL_TOKEN: &str = "FAIL";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LineClass {
    Pass,
    Fail,
}

/// Token → class table. Extending the parser to a new tool's output format
/// means adding rows here, not logic.
const CLASS_TOKENS: &[(&str, LineClass)] = &[("ok", LineClass::Pass), (FAIL_TOKEN, LineClass::Fail)];

#[derive(Debug, PartialEq, Eq)]
enum ParseState {
    Idle,
    AccumulatingFail,
}

/// Aggregated results of one run: ordered pass lines, ordered (possibly
/// multi-line) fail messages, and per-package coverage.
#[derive(Debug, Default, Clone, PartialEq)]
pub struct RunResult {
    pub passes: Vec<String>,
    pub fails: Vec<String>,
    pub coverage: BTreeMap<String, f32>,
}

impl RunResult {
    /// Parses one blob of captured output.
    pub fn parse(text: &str) -> Self {
        let mut result = Self::default();
        let mut message = String::new();
        let mut state = ParseState::Idle;

        for line in text.lines() {
            let mut tagged = None;
            match classify(line) {
                Some(LineClass::Pass) => {
                    result.passes.push(line.to_string());
                    tagged = name_and_coverage(line);
                    state = ParseState::Idle;
                }
                Some(LineClass::Fail) => {
                    push_line(&mut message, line);
                    if line.trim() == FAIL_TOKEN {
                        // Bare marker; the detail line is still to come.
                        state = ParseState::AccumulatingFail;
                    } else {
                        result.fails.push(std::mem::take(&mut message));
                        tagged = name_and_coverage(line);
                        state = ParseState::Idle;
                    }
                }
                None => {
                    push_line(&mut message, line);
                    if state == ParseState::AccumulatingFail {
                        result.fails.push(std::mem::take(&mut message));
                        tagged = name_and_coverage(line);
                        state = ParseState::Idle;
                    }
                }
            }
            if let Some((name, coverage)) = tagged {
                result.coverage.insert(name, coverage);
            }
        }

        result
    }

    /// Parses and merges the output of every package run.
    pub fn aggregate(runs: &[PackageRun]) -> Self {
        let mut total = Self::default();
        for run in runs {
            total.merge(Self::parse(&run.output));
        }
        total
    }

    fn merge(&mut self, other: Self) {
        self.passes.extend(other.passes);
        self.fails.extend(other.fails);
        self.coverage.extend(other.coverage);
    }
}

fn classify(line: &str) -> Option<LineClass> {
    classify_token(line.split_whitespace().next()?)
}

fn classify_token(token: &str) -> Option<LineClass> {
    CLASS_TOKENS
        .iter()
        .find(|(t, _)| *t == token)
        .map(|(_, class)| *class)
}

fn push_line(message: &mut String, line: &str) {
    if !message.is_empty() {
        message.push('\n');
    }
    message.push_str(line);
}

/// Extracts the package name and coverage percentage from a result line.
///
/// The name is the first token that is not a classification marker, so both
/// `FAIL\tpkg\t0.01s` and a bare `pkg\t[build failed]` detail line resolve to
/// `pkg`. Lines with fewer than two tokens carry no name.
fn name_and_coverage(line: &str) -> Option<(String, f32)> {
    let fields: Vec<&str> = line.split_whitespace().collect();
    if fields.len() < 2 {
        return None;
    }
    let name = if classify_token(fields[0]).is_some() {
        fields[1]
    } else {
        fields[0]
    };
    Some((name.to_string(), parse_coverage(line)))
}

/// Pulls a percentage out of a `coverage: <n>% ...` fragment, tolerating
/// decimals. Absent or malformed values become [`COVERAGE_UNKNOWN`].
fn parse_coverage(line: &str) -> f32 {
    let Some(start) = line.find(COVERAGE_MARKER) else {
        return COVERAGE_UNKNOWN;
    };
    let rest = &line[start + COVERAGE_MARKER.len()..];
    let Some(end) = rest.find('%') else {
        return COVERAGE_UNKNOWN;
    };
    rest[..end].parse().unwrap_or(COVERAGE_UNKNOWN)
}

/// Renders the summary line, e.g. `3 run. 2 succeeded. 1 failed. [67% success]`.
///
/// Callers must special-case `ran == 0` (see [`render_report`]); the success
/// ratio is undefined there.
pub fn render_summary(ran: usize, succeeded: usize, failed: usize) -> String {
    let pct = succeeded as f32 / ran as f32 * 100.0;
    format!("{ran} run. {succeeded} succeeded. {failed} failed. [{pct:.0}% success]")
}

/// Renders the full post-run report for a command.
pub fn render_report(spec: &CommandSpec, outcome: &Outcome) -> String {
    if outcome.ran == 0 {
        return "\nNo matching packages found.\n".to_string();
    }

    let mut out = String::new();
    match spec.kind {
        CommandKind::Test => {
            push_pass_fail(&mut out, &outcome.result);
        }
        CommandKind::Coverage => {
            out.push_str("\nCoverage Summary:\n\n");
            for (package, coverage) in &outcome.result.coverage {
                if *coverage >= 0.0 {
                    out.push_str(&format!("{package}: {coverage:.1}%\n"));
                } else {
                    out.push_str(&format!(
                        "{package}: N/A (tests failed or no tests found)\n"
                    ));
                }
            }
            push_pass_fail(&mut out, &outcome.result);
        }
        CommandKind::Quiet => {
            for run in &outcome.runs {
                if !run.output.trim().is_empty() {
                    out.push('\n');
                    out.push_str(&run.output);
                }
            }
        }
    }

    out.push_str(&format!(
        "\n{}\n",
        render_summary(outcome.ran, outcome.succeeded(), outcome.failed)
    ));
    out
}

/// On failure, the full pass and fail output is listed above the summary.
fn push_pass_fail(out: &mut String, result: &RunResult) {
    if result.fails.is_empty() {
        return;
    }
    out.push_str("\nPassed Packages:\n");
    for pass in &result.passes {
        out.push_str(pass);
        out.push('\n');
    }
    out.push_str("\nFailed Packages:\n");
    for fail in &result.fails {
        out.push_str(fail);
        out.push('\n');
    }
}
