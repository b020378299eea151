//! Command execution abstraction.
//!
//! Everything the crate knows about the host comes through a
//! [`CommandRunner`], so the parsing and policy layers can be exercised with
//! canned output.

use std::process::Command;

use tracing::error;

use crate::error::{InitiatorError, Result};
use crate::metrics;

/// Result of running an external command.
#[derive(Clone, Debug, Default, Eq, PartialEq)]
pub struct CommandOutput {
    /// Exit code reported by the process, if available.
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    /// Returns `true` when the exit code equals zero.
    pub const fn is_success(&self) -> bool {
        matches!(self.code, Some(0))
    }
}

/// Abstraction over command execution to support fakes in tests.
pub trait CommandRunner {
    /// Runs `program` with `args`, capturing stdout and stderr.
    ///
    /// A non-zero exit is not an error here; only failing to start the
    /// process is.
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput>;

    /// Runs a command that must succeed.
    ///
    /// A non-zero exit becomes [`InitiatorError::CommandFailed`] carrying the
    /// command line and both output streams.
    fn run_checked(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let output = self.run(program, args)?;
        if output.is_success() {
            return Ok(output);
        }
        let command = command_line(program, args);
        error!(command = %command, code = ?output.code, stderr = %output.stderr, "command failed");
        Err(InitiatorError::CommandFailed {
            command,
            code: output.code,
            stdout: output.stdout,
            stderr: output.stderr,
        })
    }
}

impl<R: CommandRunner + ?Sized> CommandRunner for &R {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        (**self).run(program, args)
    }
}

/// Real command runner that shells out to the host operating system.
#[derive(Clone, Debug, Default)]
pub struct ProcessCommandRunner;

impl CommandRunner for ProcessCommandRunner {
    fn run(&self, program: &str, args: &[&str]) -> Result<CommandOutput> {
        let output = Command::new(program)
            .args(args)
            .output()
            .map_err(|e| {
                error!(program = %program, error = %e, "Failed to execute command");
                InitiatorError::Spawn {
                    program: program.to_string(),
                    message: e.to_string(),
                }
            })?;

        let result = CommandOutput {
            code: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
        };
        metrics::record_command(program, args, result.is_success());
        Ok(result)
    }
}

/// Render a command and its arguments for logs and error messages.
pub fn command_line(program: &str, args: &[&str]) -> String {
    if args.is_empty() {
        program.to_string()
    } else {
        format!("{} {}", program, args.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed(CommandOutput);

    impl CommandRunner for Fixed {
        fn run(&self, _program: &str, _args: &[&str]) -> Result<CommandOutput> {
            Ok(self.0.clone())
        }
    }

    #[test]
    fn test_command_line() {
        assert_eq!(command_line("iscsiadm", &[]), "iscsiadm");
        assert_eq!(
            command_line("iscsiadm", &["list", "target", "-v"]),
            "iscsiadm list target -v"
        );
    }

    #[test]
    fn test_run_checked_success() {
        let runner = Fixed(CommandOutput {
            code: Some(0),
            stdout: "ok".into(),
            stderr: String::new(),
        });
        let output = runner.run_checked("iscsiadm", &["list", "target"]).unwrap();
        assert_eq!(output.stdout, "ok");
    }

    #[test]
    fn test_run_checked_failure_carries_output() {
        let runner = Fixed(CommandOutput {
            code: Some(1),
            stdout: "partial".into(),
            stderr: "iscsiadm: boom".into(),
        });
        match runner.run_checked("iscsiadm", &["list", "target"]) {
            Err(InitiatorError::CommandFailed {
                command,
                code,
                stdout,
                stderr,
            }) => {
                assert_eq!(command, "iscsiadm list target");
                assert_eq!(code, Some(1));
                assert_eq!(stdout, "partial");
                assert_eq!(stderr, "iscsiadm: boom");
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_signal_exit_is_not_success() {
        let output = CommandOutput {
            code: None,
            ..Default::default()
        };
        assert!(!output.is_success());
    }

    #[test]
    fn test_process_runner_spawn_failure() {
        let result = ProcessCommandRunner.run("/nonexistent/iscsiadm", &["list"]);
        assert!(matches!(result, Err(InitiatorError::Spawn { .. })));
    }
}
