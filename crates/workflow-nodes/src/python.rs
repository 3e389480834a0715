//! Python code execution
//!
//! Runs a snippet with `python3`, feeding it through stdin and capturing
//! both output streams. Uses `tokio::process::Command` with a timeout.

use std::process::Stdio;
use std::time::Duration;

use tokio::io::AsyncWriteExt;
use tokio::process::Command;

use crate::error::{NodeError, Result};

/// Default timeout in seconds for code execution
pub const DEFAULT_TIMEOUT_SECS: u64 = 300;

const INTERPRETER: &str = "python3";

/// Captured result of one execution
#[derive(Debug, Clone, PartialEq)]
pub struct PythonOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl PythonOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }
}

/// Execute `code` and wait at most `timeout_secs`
pub async fn run_python(code: &str, timeout_secs: u64) -> Result<PythonOutput> {
    log::debug!(
        "Executing {} bytes of Python code, timeout {}s",
        code.len(),
        timeout_secs
    );

    let mut cmd = Command::new(INTERPRETER);
    cmd.arg("-")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let run = async {
        let mut child = cmd
            .spawn()
            .map_err(|e| NodeError::Process(format!("failed to spawn {}: {}", INTERPRETER, e)))?;
        if let Some(mut stdin) = child.stdin.take() {
            stdin.write_all(code.as_bytes()).await?;
            drop(stdin);
        }
        Ok::<_, NodeError>(child.wait_with_output().await?)
    };

    let output = tokio::time::timeout(Duration::from_secs(timeout_secs), run)
        .await
        .map_err(|_| NodeError::Timeout(timeout_secs))??;

    let result = PythonOutput {
        stdout: String::from_utf8_lossy(&output.stdout).to_string(),
        stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        exit_code: output.status.code().unwrap_or(-1),
    };
    log::debug!(
        "Python exited with {}: stdout={} bytes, stderr={} bytes",
        result.exit_code,
        result.stdout.len(),
        result.stderr.len()
    );
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn python_available() -> bool {
        which::which(INTERPRETER).is_ok()
    }

    #[tokio::test]
    async fn test_captures_streams_and_exit_code() {
        if !python_available() {
            return;
        }
        let out = run_python("import sys\nprint('hi')\nsys.stderr.write('warn')\nsys.exit(3)", 30)
            .await
            .unwrap();
        assert_eq!(out.stdout.trim(), "hi");
        assert_eq!(out.stderr, "warn");
        assert_eq!(out.exit_code, 3);
        assert!(!out.success());
    }

    #[tokio::test]
    async fn test_timeout() {
        if !python_available() {
            return;
        }
        let err = run_python("import time\ntime.sleep(5)", 1).await.unwrap_err();
        assert!(matches!(err, NodeError::Timeout(1)));
    }
}
