//! Async shell execution with captured output.
//!
//! Everything that leaves the process — docker, ssh, rsync — goes through
//! the [`CommandExecutor`] trait so execution environments can be driven
//! against a recording double in tests and invocation counts become
//! observable.

use std::fmt;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use cradle_common::error::{CradleError, Result};

/// Captured output of a finished shell command.
///
/// A nonzero exit code is data, not an error: the caller decides how to
/// classify it (script result, build failure, sync failure).
#[derive(Debug, Clone)]
pub struct CommandOutput {
    /// Captured standard output.
    pub stdout: String,
    /// Captured standard error.
    pub stderr: String,
    /// Exit code; `-1` when the process was terminated by a signal.
    pub exit_code: i32,
}

impl CommandOutput {
    /// Returns whether the command exited zero.
    #[must_use]
    pub const fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Combined stdout and stderr, for error logs.
    #[must_use]
    pub fn log(&self) -> String {
        let mut out = self.stdout.clone();
        if !self.stderr.is_empty() {
            if !out.is_empty() && !out.ends_with('\n') {
                out.push('\n');
            }
            out.push_str(&self.stderr);
        }
        out
    }
}

/// Executes shell commands on behalf of the control plane.
#[async_trait]
pub trait CommandExecutor: Send + Sync + fmt::Debug {
    /// Runs a shell command to completion, capturing output.
    ///
    /// # Errors
    ///
    /// Returns a transport error if the command cannot be spawned; a
    /// command that runs and exits nonzero is `Ok` with its exit code.
    async fn run(&self, command: &str) -> Result<CommandOutput> {
        self.run_with_deadline(command, None).await
    }

    /// Runs a shell command, killing it if the deadline elapses.
    ///
    /// # Errors
    ///
    /// Returns [`CradleError::Timeout`] when the deadline elapses and a
    /// transport error if the command cannot be spawned.
    async fn run_with_deadline(
        &self,
        command: &str,
        deadline: Option<Duration>,
    ) -> Result<CommandOutput>;
}

/// Real executor backed by `sh -c` via `tokio::process`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemExecutor;

#[async_trait]
impl CommandExecutor for SystemExecutor {
    async fn run_with_deadline(
        &self,
        command: &str,
        deadline: Option<Duration>,
    ) -> Result<CommandOutput> {
        tracing::debug!(%command, "running shell command");
        let child = tokio::process::Command::new("sh")
            .arg("-c")
            .arg(command)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| CradleError::Transport {
                op: command.to_owned(),
                detail: e.to_string(),
            })?;

        let awaited = child.wait_with_output();
        let output = match deadline {
            Some(limit) => match tokio::time::timeout(limit, awaited).await {
                Ok(result) => result,
                // Dropping the future kills the child (kill_on_drop).
                Err(_elapsed) => {
                    tracing::warn!(%command, ?limit, "command timed out, killed");
                    return Err(CradleError::Timeout { seconds: limit.as_secs() });
                }
            },
            None => awaited.await,
        }
        .map_err(|e| CradleError::Transport {
            op: command.to_owned(),
            detail: e.to_string(),
        })?;

        let result = CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        };
        if result.success() {
            tracing::debug!(%command, "command finished");
        } else {
            tracing::warn!(%command, code = result.exit_code, "command exited nonzero");
        }
        Ok(result)
    }
}

/// Recording test double for the executor seam.
///
/// Registers every command it receives and answers from two rule tables:
/// queued one-shot responses (consumed in order, for state that changes
/// between calls) and persistent rules (first substring match wins).
/// Unmatched commands succeed with empty output. Kept in the library so
/// unit and end-to-end tests across the workspace share one double and
/// its invocation counters.
#[derive(Debug, Default)]
pub struct RecordingExecutor {
    commands: std::sync::Mutex<Vec<String>>,
    queued: std::sync::Mutex<Vec<(String, CommandOutput)>>,
    rules: std::sync::Mutex<Vec<(String, CommandOutput)>>,
}

#[allow(clippy::expect_used)]
impl RecordingExecutor {
    /// Creates an empty recorder where every command succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a persistent rule: commands containing `needle` answer
    /// with `output`.
    pub fn respond(&self, needle: &str, output: CommandOutput) {
        self.rules
            .lock()
            .expect("rules lock")
            .push((needle.to_owned(), output));
    }

    /// Registers a one-shot rule consumed by the next matching command,
    /// ahead of any persistent rule.
    pub fn enqueue(&self, needle: &str, output: CommandOutput) {
        self.queued
            .lock()
            .expect("queue lock")
            .push((needle.to_owned(), output));
    }

    /// Shorthand for a successful response with the given stdout.
    #[must_use]
    pub fn ok(stdout: &str) -> CommandOutput {
        CommandOutput {
            stdout: stdout.to_owned(),
            stderr: String::new(),
            exit_code: 0,
        }
    }

    /// Shorthand for a failed response with the given exit code and
    /// stderr.
    #[must_use]
    pub fn fail(exit_code: i32, stderr: &str) -> CommandOutput {
        CommandOutput {
            stdout: String::new(),
            stderr: stderr.to_owned(),
            exit_code,
        }
    }

    /// Every command received so far, in order.
    #[must_use]
    pub fn commands(&self) -> Vec<String> {
        self.commands.lock().expect("commands lock").clone()
    }

    /// Number of received commands containing `needle`.
    #[must_use]
    pub fn count_matching(&self, needle: &str) -> usize {
        self.commands()
            .iter()
            .filter(|c| c.contains(needle))
            .count()
    }
}

#[async_trait]
#[allow(clippy::expect_used)]
impl CommandExecutor for RecordingExecutor {
    async fn run_with_deadline(
        &self,
        command: &str,
        _deadline: Option<Duration>,
    ) -> Result<CommandOutput> {
        self.commands
            .lock()
            .expect("commands lock")
            .push(command.to_owned());

        let queued = {
            let mut queue = self.queued.lock().expect("queue lock");
            queue
                .iter()
                .position(|(needle, _)| command.contains(needle))
                .map(|i| queue.remove(i).1)
        };
        if let Some(output) = queued {
            return Ok(output);
        }
        let matched = self
            .rules
            .lock()
            .expect("rules lock")
            .iter()
            .find(|(needle, _)| command.contains(needle))
            .map(|(_, output)| output.clone());
        Ok(matched.unwrap_or_else(|| Self::ok("")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn captures_stdout_and_exit_code() {
        let out = SystemExecutor.run("echo hello").await.expect("run");
        assert_eq!(out.stdout, "hello\n");
        assert_eq!(out.exit_code, 0);
    }

    #[tokio::test]
    async fn nonzero_exit_is_ok_with_code() {
        let out = SystemExecutor.run("exit 3").await.expect("run");
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn deadline_kills_the_child() {
        let err = SystemExecutor
            .run_with_deadline("sleep 5", Some(Duration::from_millis(50)))
            .await
            .unwrap_err();
        assert!(matches!(err, CradleError::Timeout { .. }));
    }

    #[test]
    fn log_combines_both_streams() {
        let out = CommandOutput {
            stdout: "building".into(),
            stderr: "warning".into(),
            exit_code: 0,
        };
        assert_eq!(out.log(), "building\nwarning");
    }
}
