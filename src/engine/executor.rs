//! Runs job commands through the platform shell.

use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::Command;

/// Why an attempt failed. Always absorbed by the worker and turned into
/// a retry or a dead-letter, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ExecutionFailure {
    #[error("command exited with status {0}")]
    Exit(i32),

    #[error("command was terminated by a signal")]
    Signal,

    #[error("failed to launch command: {0}")]
    Launch(String),

    #[error("failed to wait for command: {0}")]
    Wait(String),
}

/// Build the shell invocation for a job command.
///
/// Output passes straight through to the worker's stdout/stderr; stdin is
/// closed so a job can't block on the terminal. On Unix the command leads
/// its own process group, so terminal signals sent to the worker leave it
/// running to completion.
pub(crate) fn shell(command: &str) -> Command {
    #[cfg(windows)]
    let mut cmd = {
        let mut cmd = Command::new("cmd");
        cmd.arg("/C").arg(command);
        cmd
    };
    #[cfg(not(windows))]
    let mut cmd = {
        let mut cmd = Command::new("sh");
        cmd.arg("-c").arg(command);
        cmd
    };
    cmd.stdin(Stdio::null())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit());
    // Own process group: a Ctrl-C aimed at the worker must not kill the job
    #[cfg(unix)]
    cmd.process_group(0);
    cmd
}

/// Map an exit status to success or an execution failure.
pub(crate) fn check_status(status: ExitStatus) -> Result<(), ExecutionFailure> {
    if status.success() {
        Ok(())
    } else {
        Err(status
            .code()
            .map_or(ExecutionFailure::Signal, ExecutionFailure::Exit))
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;

    async fn run(command: &str) -> Result<(), ExecutionFailure> {
        let status = shell(command).status().await.unwrap();
        check_status(status)
    }

    #[tokio::test]
    async fn zero_exit_is_success() {
        assert_eq!(run("true").await, Ok(()));
    }

    #[tokio::test]
    async fn nonzero_exit_carries_code() {
        assert_eq!(run("exit 3").await, Err(ExecutionFailure::Exit(3)));
    }

    #[tokio::test]
    async fn missing_program_is_a_failure() {
        // sh reports "command not found" as exit status 127
        assert_eq!(
            run("definitely-not-a-real-command-xyz").await,
            Err(ExecutionFailure::Exit(127))
        );
    }

    #[cfg(target_os = "linux")]
    #[tokio::test]
    async fn command_leads_its_own_process_group() {
        // field 5 of /proc/<pid>/stat is the process group id
        assert_eq!(
            run(r#"test "$(cut -d' ' -f5 /proc/$$/stat)" = "$$""#).await,
            Ok(())
        );
    }

    #[tokio::test]
    async fn signal_is_a_failure() {
        assert_eq!(run("kill -9 $$").await, Err(ExecutionFailure::Signal));
    }
}
