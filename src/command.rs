//! The table of toolchain commands packrun knows how to fan out.

use crate::process::CommandOutput;

/// File-name fragment identifying a directory with tests.
pub const TEST_FILE_MARKER: &str = "_test.go";

/// File-name fragment identifying a directory with source files.
pub const SOURCE_FILE_MARKER: &str = ".go";

/// How a command's output is interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandKind {
    /// Output is parsed into pass/fail records; a pass/fail summary is printed.
    Test,
    /// Like `Test`, but the report leads with a per-package coverage table.
    Coverage,
    /// The command is expected to be silent on success; any output means the
    /// package failed.
    Quiet,
}

/// One runnable toolchain command.
#[derive(Debug)]
pub struct CommandSpec {
    /// Subcommand name on the CLI.
    pub name: &'static str,
    /// Banner printed before the run starts.
    pub banner: &'static str,
    pub program: &'static str,
    pub args: &'static [&'static str],
    /// File-name fragment a directory must contain to be a package for this
    /// command.
    pub marker: &'static str,
    pub kind: CommandKind,
}

impl CommandSpec {
    /// Whether one package's execution counts as a success for this command.
    pub fn succeeded(&self, output: &CommandOutput) -> bool {
        match self.kind {
            CommandKind::Test | CommandKind::Coverage => output.success,
            CommandKind::Quiet => output.success && output.text.trim().is_empty(),
        }
    }
}

/// All known commands, keyed by `name`. New commands are added here, not in
/// the engine or the parser.
pub const COMMANDS: &[CommandSpec] = &[
    CommandSpec {
        name: "test",
        banner: "Running tests",
        program: "go",
        args: &["test"],
        marker: TEST_FILE_MARKER,
        kind: CommandKind::Test,
    },
    CommandSpec {
        name: "install",
        banner: "Installing test dependencies",
        program: "go",
        args: &["test", "-i"],
        marker: TEST_FILE_MARKER,
        kind: CommandKind::Quiet,
    },
    CommandSpec {
        name: "vet",
        banner: "Vetting packages",
        program: "go",
        args: &["vet"],
        marker: SOURCE_FILE_MARKER,
        kind: CommandKind::Quiet,
    },
    CommandSpec {
        name: "race",
        banner: "Running race tests",
        program: "go",
        args: &["test", "-race"],
        marker: TEST_FILE_MARKER,
        kind: CommandKind::Test,
    },
    CommandSpec {
        name: "coverage",
        banner: "Running coverage tests",
        program: "go",
        args: &["test", "-cover"],
        marker: TEST_FILE_MARKER,
        kind: CommandKind::Coverage,
    },
];

/// Looks a command up by its CLI name.
pub fn lookup(name: &str) -> Option<&'static CommandSpec> {
    COMMANDS.iter().find(|spec| spec.name == name)
}
