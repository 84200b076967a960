//! Supervised command execution inside a running environment.
//!
//! One execution = create an exec instance with stdin/stdout/stderr
//! attached, deliver the input payload, then drain output until the
//! command finishes or the deadline passes. A timeout is a terminal
//! outcome, not an error: partial stdout is preserved and a
//! best-effort kill is issued so the lingering process does not bleed
//! into the next execution's measurements.

use bollard::container::LogOutput;
use bollard::exec::{CreateExecOptions, StartExecResults};
use bollard::Docker;
use futures_util::StreamExt;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::ExecError;
use crate::provision::EnvironmentHandle;

/// Result of running the artifact once against one input.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionOutcome {
    /// Captured standard output (partial if the execution timed out).
    pub stdout: String,
    /// Wall-clock time the execution took. Equal to the configured
    /// timeout when `timed_out` is set.
    pub elapsed: Duration,
    /// Peak memory observed during the execution window, in bytes.
    pub peak_memory_bytes: u64,
    /// Whether the deadline passed before the command finished.
    pub timed_out: bool,
}

impl ExecutionOutcome {
    /// Elapsed wall-clock time in milliseconds.
    pub fn elapsed_ms(&self) -> u128 {
        self.elapsed.as_millis()
    }
}

/// An execution result before peak memory has been attributed to it.
///
/// Produced by the supervisor; the runtime pairs it with the sampling
/// session's peak to form an [`ExecutionOutcome`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawExecution {
    /// Captured standard output.
    pub stdout: String,
    /// Wall-clock time spent waiting for the command.
    pub elapsed: Duration,
    /// Whether the deadline passed first.
    pub timed_out: bool,
}

/// Runs one command per input inside a running environment.
pub(crate) struct ExecutionSupervisor {
    docker: Docker,
}

impl ExecutionSupervisor {
    pub(crate) fn new(docker: Docker) -> Self {
        Self { docker }
    }

    /// Executes `command` in the environment, feeding `input` on
    /// stdin, waiting up to `timeout` for completion.
    pub(crate) async fn execute(
        &self,
        handle: &EnvironmentHandle,
        command: &[String],
        input: &str,
        timeout: Duration,
    ) -> Result<RawExecution, ExecError> {
        let exec = self
            .docker
            .create_exec(
                &handle.id,
                CreateExecOptions {
                    cmd: Some(command.to_vec()),
                    attach_stdin: Some(true),
                    attach_stdout: Some(true),
                    attach_stderr: Some(true),
                    ..Default::default()
                },
            )
            .await
            .map_err(|e| ExecError::create_failed(e.to_string()))?;

        let started = self
            .docker
            .start_exec(&exec.id, None)
            .await
            .map_err(|e| ExecError::attach_failed(e.to_string()))?;

        let StartExecResults::Attached {
            mut output,
            input: mut stdin,
        } = started
        else {
            return Err(ExecError::attach_failed(
                "exec started detached; streams were not attached",
            ));
        };

        let mut stdout = String::new();
        let clock = Instant::now();

        // Input delivery happens inside the timed window, concurrently
        // with output draining: a command that never reads its stdin
        // must not block the write past the deadline.
        let exchange = async {
            let feed = async {
                // The command may exit without reading its input; a
                // broken pipe here is not a failure of the execution.
                if let Err(e) = stdin.write_all(input.as_bytes()).await {
                    debug!("stdin write ended early: {e}");
                }
                if let Err(e) = stdin.shutdown().await {
                    debug!("stdin close failed: {e}");
                }
            };

            let drain = async {
                while let Some(chunk) = output.next().await {
                    match chunk {
                        Ok(LogOutput::StdOut { message }) => {
                            stdout.push_str(&String::from_utf8_lossy(&message));
                        }
                        Ok(LogOutput::StdErr { message }) => {
                            debug!("stderr: {}", String::from_utf8_lossy(&message));
                        }
                        Err(e) => {
                            warn!("error reading exec output: {e}");
                        }
                        _ => {}
                    }
                }
            };

            tokio::join!(feed, drain);
        };

        match tokio::time::timeout(timeout, exchange).await {
            Ok(()) => Ok(RawExecution {
                stdout,
                elapsed: clock.elapsed(),
                timed_out: false,
            }),
            Err(_) => {
                warn!(
                    environment = %handle,
                    "execution exceeded {}ms; killing lingering process",
                    timeout.as_millis()
                );
                self.kill_lingering(handle).await;
                Ok(RawExecution {
                    stdout,
                    elapsed: timeout,
                    timed_out: true,
                })
            }
        }
    }

    /// Best-effort kill of a command that outlived its deadline, so it
    /// stops consuming the environment's CPU and memory.
    ///
    /// Kills every process in the environment except PID 1 (the
    /// keep-alive shell, which must survive for the remaining inputs)
    /// and the killer itself. Executions are sequential, so anything
    /// else alive at this point is residue of the timed-out command.
    async fn kill_lingering(&self, handle: &EnvironmentHandle) {
        let exec = match self
            .docker
            .create_exec(
                &handle.id,
                CreateExecOptions {
                    cmd: Some(kill_command()),
                    ..Default::default()
                },
            )
            .await
        {
            Ok(exec) => exec,
            Err(e) => {
                warn!(environment = %handle, "failed to create kill exec: {e}");
                return;
            }
        };

        if let Err(e) = self.docker.start_exec(&exec.id, None).await {
            warn!(environment = %handle, "failed to kill lingering process: {e}");
        }
    }
}

/// The argument vector used to reap timed-out processes.
///
/// A fixed script, never built from the configured command: pattern
/// matching on argv would risk matching the keep-alive shell at PID 1
/// and would break on metacharacters in the command itself.
fn kill_command() -> Vec<String> {
    const REAP_SCRIPT: &str = r#"for p in /proc/[0-9]*; do
    p=${p#/proc/}
    [ "$p" = 1 ] && continue
    [ "$p" = "$$" ] && continue
    kill -KILL "$p" 2>/dev/null
done"#;

    vec![
        "sh".to_string(),
        "-c".to_string(),
        REAP_SCRIPT.to_string(),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kill_command_is_fixed_and_spares_init() {
        let cmd = kill_command();
        assert_eq!(cmd[0], "sh");
        assert_eq!(cmd[1], "-c");

        let script = &cmd[2];
        // The reaper must skip the keep-alive shell and itself.
        assert!(script.contains(r#"[ "$p" = 1 ] && continue"#));
        assert!(script.contains(r#"[ "$p" = "$$" ] && continue"#));
    }

    #[test]
    fn test_outcome_elapsed_ms() {
        let outcome = ExecutionOutcome {
            stdout: "sum=6".to_string(),
            elapsed: Duration::from_millis(512),
            peak_memory_bytes: 1024,
            timed_out: false,
        };
        assert_eq!(outcome.elapsed_ms(), 512);
    }
}
