//! CLI tool for running build/test commands across every package in a tree.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use crossbeam_channel::unbounded;
use notify::{RecommendedWatcher, Watcher};
use packrun::config::{self, Config};
use packrun::{command, report, signal, watch, ExecMode, Outcome, Session};
use std::path::PathBuf;
use std::sync::Arc;

/// Run build and test commands across every package in a directory tree
#[derive(Parser, Debug)]
#[command(
    name = "packrun",
    version,
    about = "Runs build and test commands across every package in a directory tree",
    long_about = "Recursively discovers packages (directories containing test or source files) \
                  under a root, runs the requested toolchain command against each of them \
                  concurrently, and aggregates the results.\n\n\
                  With no subcommand, installs test dependencies and then runs all tests."
)]
struct Args {
    /// Root directory to search for packages
    #[arg(short = 'C', long, default_value = ".", global = true)]
    directory: PathBuf,

    /// Run packages one at a time instead of concurrently
    #[arg(long, global = true)]
    serial: bool,

    #[command(subcommand)]
    command: Option<Cmd>,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Run tests, or a named package's tests
    ///
    /// With no package argument, runs all tests recursively. "all" also runs
    /// packages on the exclusion list.
    Test {
        /// Package name to run, or "all"
        package: Option<String>,
    },

    /// Install test dependencies, or a named package's dependencies
    Install {
        /// Package name to install, or "all"
        package: Option<String>,
    },

    /// Vet packages, or a named package
    Vet {
        /// Package name to vet, or "all"
        package: Option<String>,
    },

    /// Run tests under the race detector
    Race {
        /// Package name to run, or "all"
        package: Option<String>,
    },

    /// Run tests with coverage analysis
    Coverage {
        /// Package name to run, or "all"
        package: Option<String>,
    },

    /// Watch for file changes and re-run a command on every change
    Watch {
        /// Command to re-run: test, vet, race or coverage
        #[arg(default_value = "test")]
        command: String,

        /// Package name to run, or "all"
        package: Option<String>,
    },

    /// Exclude a directory from discovery
    ///
    /// An excluded directory is skipped when building the package list, along
    /// with all of its subdirectories.
    Exclude {
        /// Directory name to exclude
        #[arg(id = "exclude_directory")]
        directory: String,
    },

    /// Remove a directory from the exclusion list
    Include {
        /// Directory name to include again
        #[arg(id = "include_directory")]
        directory: String,
    },

    /// Print the exclusion list
    Exclusions,
}

fn main() -> Result<()> {
    env_logger::init();

    let args = Args::parse();
    let root = args
        .directory
        .canonicalize()
        .with_context(|| format!("Failed to access directory: {}", args.directory.display()))?;

    let mut config = Config::load(&root).context("Failed to load configuration")?;
    let mode = if args.serial {
        ExecMode::Serial
    } else {
        ExecMode::Parallel
    };

    log::debug!("searching for packages in: {}", root.display());
    if !config.exclusions.is_empty() {
        log::debug!("excluding directories: {:?}", config.exclusions);
    }

    let session = Session::new(root.clone(), config.exclusions.clone(), mode);

    match args.command {
        None => {
            let install = command_spec("install")?;
            let outcome = run_and_report(&session, install, None)?;
            if outcome.failed == 0 {
                run_and_report(&session, command_spec("test")?, None)?;
            }
        }
        Some(Cmd::Test { package }) => {
            run_and_report(&session, command_spec("test")?, package)?;
        }
        Some(Cmd::Install { package }) => {
            run_and_report(&session, command_spec("install")?, package)?;
        }
        Some(Cmd::Vet { package }) => {
            run_and_report(&session, command_spec("vet")?, package)?;
        }
        Some(Cmd::Race { package }) => {
            run_and_report(&session, command_spec("race")?, package)?;
        }
        Some(Cmd::Coverage { package }) => {
            run_and_report(&session, command_spec("coverage")?, package)?;
        }
        Some(Cmd::Watch { command, package }) => {
            run_watch(session, &command, package.unwrap_or_default())?;
        }
        Some(Cmd::Exclude { directory }) => {
            config.exclude(&directory);
            config.save(&root).context("Failed to save configuration")?;
            println!("\nExcluded \"{directory}\" from being examined during recursion.");
            println!("\n{}\n", config::format_exclusions(&config.exclusions));
        }
        Some(Cmd::Include { directory }) => {
            config.include(&directory);
            config.save(&root).context("Failed to save configuration")?;
            println!("\nRemoved \"{directory}\" from the exclusion list.");
            println!("\n{}\n", config::format_exclusions(&config.exclusions));
        }
        Some(Cmd::Exclusions) => {
            println!("\n{}\n", config::format_exclusions(&config.exclusions));
        }
    }

    Ok(())
}

fn command_spec(name: &str) -> Result<&'static command::CommandSpec> {
    command::lookup(name).with_context(|| format!("Unknown command: {name}"))
}

fn run_and_report(
    session: &Session,
    spec: &'static command::CommandSpec,
    package: Option<String>,
) -> Result<Outcome> {
    println!("\n{}:", spec.banner);
    let outcome = session.run(spec, package.as_deref().unwrap_or(""))?;
    print!("{}", report::render_report(spec, &outcome));
    Ok(outcome)
}

fn run_watch(session: Session, command: &str, target: String) -> Result<()> {
    let spec = match command::lookup(command) {
        Some(spec) if spec.name != "install" => spec,
        _ => bail!("Unknown watch command: {command}"),
    };

    signal::install();

    let (tx, rx) = unbounded();
    let watcher = RecommendedWatcher::new(
        move |res: notify::Result<notify::Event>| {
            let _ = tx.send(res);
        },
        notify::Config::default(),
    )?;

    let runner = {
        let session = session.clone();
        Arc::new(move || {
            match session.run(spec, &target) {
                Ok(outcome) => print!("{}", report::render_report(spec, &outcome)),
                Err(e) => log::error!("watch-triggered run failed: {e}"),
            }
            println!("\n----------------------------------");
        })
    };

    let mut controller = watch::WatchController::new(
        watcher,
        rx,
        watch::DEBOUNCE_WINDOW,
        runner,
        Box::new(signal::requested),
    );
    controller.watch_root(session.root())?;

    println!(
        "\nWatching {} and its subdirectories ({} watched); running \"{}\" whenever files change. \
         Press Ctrl-C to stop.",
        session.root().display(),
        controller.watched_dirs(),
        spec.name,
    );
    println!("\n----------------------------------");

    controller.run_loop();
    println!("\nDone - exiting...");
    Ok(())
}
