//! A library for discovering testable packages in a directory tree and
//! running build/test commands against each of them.
//!
//! Discovery walks the tree for directories containing marker files, the
//! exclusion filter narrows the list, the engine fans the command out
//! (serially or in parallel), and the report module turns the captured output
//! into pass/fail/coverage records. Watch mode re-runs the whole pipeline on
//! debounced filesystem changes.
//!
//! # Examples
//!
//! ```no_run
//! use packrun::{command, ExecMode, Session};
//! use std::path::PathBuf;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let session = Session::new(PathBuf::from("."), Vec::new(), ExecMode::Parallel);
//! let spec = command::lookup("test").unwrap();
//! let outcome = session.run(spec, "")?;
//!
//! println!("{} run, {} failed", outcome.ran, outcome.failed);
//! # Ok(())
//! # }
//! ```

pub mod command;
pub mod config;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod filter;
pub mod process;
pub mod report;
pub mod signal;
pub mod watch;

use std::path::{Path, PathBuf};

use command::{CommandKind, CommandSpec};
use engine::PackageRun;
pub use engine::ExecMode;
pub use error::{Error, Result};
use report::RunResult;

/// One pipeline invocation's aggregated result.
#[derive(Debug, Default, Clone)]
pub struct Outcome {
    /// Number of packages the command ran against.
    pub ran: usize,
    /// Number of packages that failed.
    pub failed: usize,
    /// Parsed pass/fail/coverage records (empty for quiet commands).
    pub result: RunResult,
    /// Raw per-package runs, in package order.
    pub runs: Vec<PackageRun>,
}

impl Outcome {
    /// Builds an outcome from the per-package runs and their parsed result.
    pub fn new(runs: Vec<PackageRun>, result: RunResult) -> Self {
        Self {
            ran: runs.len(),
            failed: runs.iter().filter(|run| !run.success).count(),
            result,
            runs,
        }
    }

    /// The outcome of a run that matched no packages.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn succeeded(&self) -> usize {
        self.ran - self.failed
    }
}

/// One invocation's context: the search root, the exclusion list loaded at
/// startup, and the execution mode.
///
/// All state lives here rather than in globals; a fresh session (or a fresh
/// call on an existing one) always re-discovers packages from the filesystem.
#[derive(Debug, Clone)]
pub struct Session {
    root: PathBuf,
    exclusions: Vec<String>,
    mode: ExecMode,
}

impl Session {
    pub fn new(root: PathBuf, exclusions: Vec<String>, mode: ExecMode) -> Self {
        Self {
            root,
            exclusions,
            mode,
        }
    }

    /// Discovers, filters and runs `spec` against the tree.
    ///
    /// `target` selects a single named package, `"all"` bypasses the
    /// exclusion list, and `""` runs everything except exclusions.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory tree cannot be walked. Individual
    /// package failures are recorded in the outcome, not raised.
    pub fn run(&self, spec: &CommandSpec, target: &str) -> Result<Outcome> {
        let packages = discovery::locate_packages(&self.root, spec.marker)?;
        log::debug!("discovered {} package(s)", packages.len());

        let selected = filter::filter_packages(packages, target, &self.exclusions);
        log::debug!("selected {} package(s) after filtering", selected.len());
        if selected.is_empty() {
            return Ok(Outcome::empty());
        }

        let runs = engine::run_packages(&self.root, &selected, spec, self.mode);
        let result = match spec.kind {
            CommandKind::Test | CommandKind::Coverage => RunResult::aggregate(&runs),
            CommandKind::Quiet => RunResult::default(),
        };
        Ok(Outcome::new(runs, result))
    }

    /// The root directory this session searches.
    pub fn root(&self) -> &Path {
        &self.root
    }
}
