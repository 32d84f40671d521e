use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use thiserror::Error;
use tokio::process::Command;
use tracing::debug;

/// Failures running an external command.
#[derive(Error, Debug)]
pub enum CommandError {
    #[error("command is empty")]
    Empty,

    #[error("spawning {program}: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{program} did not finish within {timeout:?}")]
    Timeout { program: String, timeout: Duration },

    #[error("{program} exited with {status}: {stderr}")]
    Failed {
        program: String,
        status: ExitStatus,
        stderr: String,
    },

    #[error("{program} produced non-UTF-8 output")]
    InvalidUtf8 { program: String },
}

/// Run `argv` to completion and return its stdout as text.
///
/// The child is killed if it outlives `timeout`.
pub async fn run(argv: &[String], timeout: Duration) -> Result<String, CommandError> {
    let (program, args) = argv.split_first().ok_or(CommandError::Empty)?;

    debug!(command = %argv.join(" "), "running command");

    let child = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true)
        .spawn()
        .map_err(|source| CommandError::Spawn {
            program: program.clone(),
            source,
        })?;

    let output = match tokio::time::timeout(timeout, child.wait_with_output()).await {
        Ok(result) => result.map_err(|source| CommandError::Spawn {
            program: program.clone(),
            source,
        })?,
        Err(_) => {
            return Err(CommandError::Timeout {
                program: program.clone(),
                timeout,
            })
        }
    };

    if !output.status.success() {
        return Err(CommandError::Failed {
            program: program.clone(),
            status: output.status,
            stderr: String::from_utf8_lossy(&output.stderr).trim().to_string(),
        });
    }

    String::from_utf8(output.stdout).map_err(|_| CommandError::InvalidUtf8 {
        program: program.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(parts: &[&str]) -> Vec<String> {
        parts.iter().map(|s| (*s).to_string()).collect()
    }

    #[tokio::test]
    async fn test_run_captures_stdout() {
        let out = run(&argv(&["sh", "-c", "printf 'a\\tb\\n'"]), Duration::from_secs(5))
            .await
            .expect("command should succeed");
        assert_eq!(out, "a\tb\n");
    }

    #[tokio::test]
    async fn test_run_empty_command() {
        let err = run(&[], Duration::from_secs(1)).await.unwrap_err();
        assert!(matches!(err, CommandError::Empty));
    }

    #[tokio::test]
    async fn test_run_nonzero_exit() {
        let err = run(
            &argv(&["sh", "-c", "echo boom >&2; exit 3"]),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();

        match err {
            CommandError::Failed { status, stderr, .. } => {
                assert_eq!(status.code(), Some(3));
                assert_eq!(stderr, "boom");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_run_missing_program() {
        let err = run(
            &argv(&["/nonexistent/awg-exporter-test-binary"]),
            Duration::from_secs(1),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CommandError::Spawn { .. }));
    }

    #[tokio::test]
    async fn test_run_timeout() {
        let err = run(&argv(&["sleep", "5"]), Duration::from_millis(100))
            .await
            .unwrap_err();
        assert!(matches!(err, CommandError::Timeout { .. }));
        assert!(err.to_string().contains("did not finish"));
    }

    #[tokio::test]
    async fn test_run_invalid_utf8() {
        let err = run(
            &argv(&["sh", "-c", "printf '\\377\\376'"]),
            Duration::from_secs(5),
        )
        .await
        .unwrap_err();
        assert!(matches!(err, CommandError::InvalidUtf8 { .. }));
    }
}
