//! Fanning a command out across packages and collecting the results.

use rayon::prelude::*;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::command::CommandSpec;
use crate::process;

/// Whether packages run one at a time or concurrently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecMode {
    Serial,
    Parallel,
}

/// The outcome of running the command against one package.
#[derive(Debug, Clone)]
pub struct PackageRun {
    /// Root-relative package path, e.g. `./store/cache`.
    pub package: String,
    /// Merged output of the command, or a spawn-error message.
    pub output: String,
    pub success: bool,
}

/// Runs `spec` against every package, returning one [`PackageRun`] per input
/// package, in input order.
///
/// In parallel mode the packages are distributed over rayon's worker pool and
/// the call returns only once every worker has reported; partial results are
/// never surfaced. A package whose command fails (or cannot even be spawned)
/// is recorded and does not stop the others.
///
/// A `[i of N]` progress counter is rewritten in place as results arrive.
/// Under parallel execution the intermediate values depend on completion
/// order; only the final `[N of N]` is deterministic.
pub fn run_packages(
    root: &Path,
    packages: &[String],
    spec: &CommandSpec,
    mode: ExecMode,
) -> Vec<PackageRun> {
    let progress = Progress::new(packages.len());

    let run_one = |package: &String| {
        let run = execute(root, package, spec);
        progress.tick();
        run
    };

    let runs = match mode {
        ExecMode::Serial => packages.iter().map(run_one).collect(),
        ExecMode::Parallel => packages.par_iter().map(run_one).collect(),
    };

    progress.finish();
    runs
}

fn execute(root: &Path, package: &str, spec: &CommandSpec) -> PackageRun {
    let dir = package_dir(root, package);
    log::debug!("running {} {:?} in {}", spec.program, spec.args, dir.display());

    match process::run_in_dir(&dir, spec.program, spec.args) {
        Ok(output) => PackageRun {
            package: package.to_string(),
            success: spec.succeeded(&output),
            output: output.text,
        },
        Err(e) => PackageRun {
            package: package.to_string(),
            success: false,
            output: format!("failed to run {} in {package}: {e}\n", spec.program),
        },
    }
}

/// Resolves a root-relative display path (`.` or `./a/b`) back to a real
/// directory under `root`.
fn package_dir(root: &Path, package: &str) -> PathBuf {
    match package.strip_prefix("./") {
        Some(rel) => root.join(rel),
        None => root.to_path_buf(),
    }
}

/// In-place `[i of N]` counter shared across workers.
struct Progress {
    done: AtomicUsize,
    total: usize,
}

impl Progress {
    fn new(total: usize) -> Self {
        Self {
            done: AtomicUsize::new(0),
            total,
        }
    }

    fn tick(&self) {
        let done = self.done.fetch_add(1, Ordering::SeqCst) + 1;
        print!("\r[{done} of {}]", self.total);
        let _ = std::io::stdout().flush();
    }

    fn finish(&self) {
        if self.total > 0 {
            println!();
        }
    }
}
