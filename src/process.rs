//! Running one external command against one package directory.

use std::path::Path;
use std::process::Command;

/// Captured output of a single command invocation.
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Standard output and standard error merged into one blob. Ordering
    /// between the two streams is not guaranteed; downstream parsing is
    /// line-based and does not depend on it.
    pub text: String,
    /// Whether the process exited with status zero.
    pub success: bool,
}

/// Runs `program args...` with the working directory set to `dir`, blocking
/// until it exits.
///
/// # Errors
///
/// Returns an error if the process cannot be spawned at all (missing binary,
/// missing directory). A non-zero exit is not an error; it is reported through
/// [`CommandOutput::success`].
pub fn run_in_dir(dir: &Path, program: &str, args: &[&str]) -> std::io::Result<CommandOutput> {
    let output = Command::new(program)
        .args(args)
        .current_dir(dir)
        .output()?;

    let mut text = String::from_utf8_lossy(&output.stdout).into_owned();
    text.push_str(&String::from_utf8_lossy(&output.stderr));

    Ok(CommandOutput {
        text,
        success: output.status.success(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn captures_stdout() {
        let temp = assert_fs::TempDir::new().unwrap();
        let output = run_in_dir(temp.path(), "echo", &["hello"]).unwrap();
        assert!(output.success);
        assert_eq!(output.text, "hello\n");
        temp.close().unwrap();
    }

    #[test]
    fn runs_in_the_given_directory() {
        let temp = assert_fs::TempDir::new().unwrap();
        let output = run_in_dir(temp.path(), "pwd", &[]).unwrap();
        assert!(output.success);
        let reported = output.text.trim();
        assert_eq!(
            std::fs::canonicalize(reported).unwrap(),
            std::fs::canonicalize(temp.path()).unwrap()
        );
        temp.close().unwrap();
    }

    #[test]
    fn nonzero_exit_is_reported_not_an_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        let output = run_in_dir(temp.path(), "false", &[]).unwrap();
        assert!(!output.success);
        temp.close().unwrap();
    }

    #[test]
    fn missing_binary_is_an_error() {
        let temp = assert_fs::TempDir::new().unwrap();
        assert!(run_in_dir(temp.path(), "definitely-not-a-real-binary", &[]).is_err());
        temp.close().unwrap();
    }

    #[test]
    fn stderr_is_merged_into_the_blob() {
        let temp = assert_fs::TempDir::new().unwrap();
        let output = run_in_dir(temp.path(), "sh", &["-c", "echo out; echo err >&2"]).unwrap();
        assert!(output.text.contains("out"));
        assert!(output.text.contains("err"));
        temp.close().unwrap();
    }
}
