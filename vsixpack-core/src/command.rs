//! Process-backed [`CommandRunner`].

use std::path::Path;

use async_trait::async_trait;
use tokio::process::Command;
use tracing::{debug, error, info};

use crate::contract::{CommandOutput, CommandRunner};
use crate::error::{PackageError, Result};

/// Runs commands as child processes of the current one.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessRunner;

#[async_trait]
impl CommandRunner for ProcessRunner {
    async fn run(&self, cwd: &Path, program: &str, args: Vec<String>) -> Result<CommandOutput> {
        let command_line = format!("{program} {}", args.join(" "));
        debug!(command = %command_line, cwd = %cwd.display(), "Launching command");

        let output = Command::new(program)
            .args(&args)
            .current_dir(cwd)
            .output()
            .await
            .map_err(|e| {
                error!(error = ?e, command = %command_line, "Failed to launch command");
                PackageError::Command(format!("failed to launch `{command_line}`: {e}"))
            })?;

        let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
        let stderr = String::from_utf8_lossy(&output.stderr).into_owned();

        if !output.status.success() {
            error!(command = %command_line, status = %output.status, stderr = %stderr.trim(), "Command exited with non-zero status");
            return Err(PackageError::Command(format!(
                "`{command_line}` exited with {}: {}",
                output.status,
                stderr.trim()
            )));
        }

        info!(command = %command_line, stdout_bytes = stdout.len(), "Command finished");
        Ok(CommandOutput { stdout, stderr })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(unix)]
    #[tokio::test]
    async fn captures_stdout_of_successful_command() {
        let out = ProcessRunner
            .run(Path::new("."), "sh", vec!["-c".into(), "echo hello".into()])
            .await
            .expect("sh should run");
        assert_eq!(out.stdout.trim(), "hello");
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn non_zero_exit_is_an_error() {
        let err = ProcessRunner
            .run(Path::new("."), "sh", vec!["-c".into(), "echo boom >&2; exit 3".into()])
            .await
            .unwrap_err();
        let msg = err.to_string();
        assert!(msg.contains("boom"), "{msg}");
    }
}
