//! Process sandbox for generated checks
//!
//! Each check runs as a fresh interpreter process:
//! - script written into a private temporary directory, which is also the working directory
//! - environment cleared except `PATH`; the dataset path arrives as `CLAIMCHECK_DATASET` and argv[1]
//! - killed when the timeout elapses or the caller drops the future
//!
//! The temporary directory is removed on every exit path.

use async_trait::async_trait;
use claimcheck_core::{CheckOutput, ExecutableCheck, ResidentHandle, Sandbox, SandboxError, ValidationConfig};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, warn};
use uuid::Uuid;

/// Longest stderr excerpt carried into an error
const STDERR_EXCERPT: usize = 400;

#[derive(Debug, Clone)]
pub struct ProcessSandbox {
    interpreter: String,
}

impl ProcessSandbox {
    #[must_use]
    pub fn new(interpreter: impl Into<String>) -> Self {
        Self {
            interpreter: interpreter.into(),
        }
    }

    #[must_use]
    pub fn from_config(config: &ValidationConfig) -> Self {
        Self::new(config.interpreter.clone())
    }

    #[inline]
    #[must_use]
    pub fn interpreter(&self) -> &str {
        &self.interpreter
    }
}

fn script_extension(language: &str) -> &'static str {
    match language.to_ascii_lowercase().as_str() {
        "python" | "python3" | "py" => "py",
        "sh" | "bash" | "shell" => "sh",
        _ => "txt",
    }
}

fn excerpt(bytes: &[u8]) -> String {
    let text = String::from_utf8_lossy(bytes);
    let text = text.trim();
    let start = text
        .char_indices()
        .rev()
        .nth(STDERR_EXCERPT)
        .map_or(0, |(idx, _)| idx);
    text[start..].to_string()
}

#[async_trait]
impl Sandbox for ProcessSandbox {
    async fn run(
        &self,
        check: &ExecutableCheck,
        dataset: &ResidentHandle,
        timeout: Duration,
    ) -> Result<CheckOutput, SandboxError> {
        let workdir = tempfile::Builder::new()
            .prefix("claimcheck-check-")
            .tempdir()
            .map_err(|e| SandboxError::Spawn(format!("temp dir: {e}")))?;

        let script = workdir
            .path()
            .join(format!("check-{}.{}", Uuid::new_v4(), script_extension(&check.language)));
        tokio::fs::write(&script, &check.source)
            .await
            .map_err(|e| SandboxError::Spawn(format!("write script: {e}")))?;

        let mut cmd = Command::new(&self.interpreter);
        cmd.arg(&script)
            .current_dir(workdir.path())
            .env_clear()
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        if let Some(path) = std::env::var_os("PATH") {
            cmd.env("PATH", path);
        }
        if let Some((path, _)) = dataset.as_dataset() {
            cmd.arg(path).env("CLAIMCHECK_DATASET", path);
        }

        let child = cmd
            .spawn()
            .map_err(|e| SandboxError::Spawn(format!("{}: {e}", self.interpreter)))?;
        debug!(handle = %dataset.id, interpreter = %self.interpreter, "check started");

        // Dropping the child on timeout kills it; dropping `workdir` removes the script.
        let output = tokio::time::timeout(timeout, child.wait_with_output())
            .await
            .map_err(|_| SandboxError::Timeout)?
            .map_err(|e| SandboxError::Runtime(e.to_string()))?;

        if let Err(e) = workdir.close() {
            warn!(error = %e, "failed to remove check directory");
        }

        if !output.status.success() {
            let code = output
                .status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            return Err(SandboxError::Runtime(format!(
                "exit {code}: {}",
                excerpt(&output.stderr)
            )));
        }

        CheckOutput::parse(&String::from_utf8_lossy(&output.stdout))
    }
}
