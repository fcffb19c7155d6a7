use std::ffi::OsStr;
use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use super::ToolError;

#[cfg(windows)]
const CREATE_NO_WINDOW: u32 = 0x0800_0000;

#[derive(Debug, Clone)]
pub struct ProcessOutput {
    pub success: bool,
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// stdout and stderr joined, for phrase matching.
    pub fn combined(&self) -> String {
        format!("{}\n{}", self.stdout, self.stderr)
    }

    /// Most useful diagnostic text: stderr, then stdout.
    pub fn diagnostic(&self) -> String {
        let stderr = self.stderr.trim();
        if !stderr.is_empty() {
            return stderr.to_string();
        }
        let stdout = self.stdout.trim();
        if !stdout.is_empty() {
            return stdout.to_string();
        }
        match self.code {
            Some(code) => format!("exit code {}", code),
            None => "terminated by signal".to_string(),
        }
    }
}

/// Piped command that never opens a console window and dies with its handle.
pub fn command(program: impl AsRef<OsStr>) -> tokio::process::Command {
    let mut cmd = tokio::process::Command::new(program);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);
    #[cfg(windows)]
    cmd.creation_flags(CREATE_NO_WINDOW);
    cmd
}

/// Runs `program` to completion, killing it once `timeout` expires.
pub async fn run_with_timeout<S>(
    program: impl AsRef<OsStr>,
    args: &[S],
    timeout: Duration,
) -> Result<ProcessOutput, ToolError>
where
    S: AsRef<OsStr>,
{
    let name = program.as_ref().to_string_lossy().into_owned();
    let mut cmd = command(program.as_ref());
    cmd.args(args);

    let output = tokio::time::timeout(timeout, cmd.output())
        .await
        .map_err(|_| ToolError::Timeout {
            program: name.clone(),
            timeout,
        })?
        .map_err(|source| ToolError::Spawn {
            program: name.clone(),
            source,
        })?;

    Ok(ProcessOutput {
        success: output.status.success(),
        code: output.status.code(),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// First line printed by `<binary> --version`.
pub async fn query_version(binary: &Path, timeout: Duration) -> Result<String, ToolError> {
    let output = run_with_timeout(binary, &["--version"], timeout).await?;
    if !output.success {
        return Err(ToolError::Failed {
            program: binary.display().to_string(),
            message: output.diagnostic(),
        });
    }

    output
        .stdout
        .lines()
        .next()
        .map(str::trim)
        .filter(|line| !line.is_empty())
        .map(str::to_string)
        .ok_or(ToolError::NoVersion)
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use std::os::unix::fs::PermissionsExt;
    use tempfile::TempDir;

    fn script(dir: &TempDir, name: &str, body: &str) -> std::path::PathBuf {
        let path = dir.path().join(name);
        std::fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
        path
    }

    #[tokio::test]
    async fn test_query_version_reads_first_line() {
        let dir = TempDir::new().unwrap();
        let tool = script(&dir, "yt-dlp", "echo 2024.08.06\necho extra");
        let version = query_version(&tool, Duration::from_secs(5)).await.unwrap();
        assert_eq!(version, "2024.08.06");
    }

    #[tokio::test]
    async fn test_run_with_timeout_expires() {
        let dir = TempDir::new().unwrap();
        let tool = script(&dir, "slow", "sleep 5");
        let err = run_with_timeout(&tool, &[] as &[&str], Duration::from_millis(200))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_missing_program_is_spawn_error() {
        let err = run_with_timeout("/nonexistent/yt-dlp", &["--version"], Duration::from_secs(1))
            .await
            .unwrap_err();
        assert!(matches!(err, ToolError::Spawn { .. }));
    }

    #[test]
    fn test_diagnostic_prefers_stderr() {
        let output = ProcessOutput {
            success: false,
            code: Some(1),
            stdout: "out".to_string(),
            stderr: " ERROR: boom \n".to_string(),
        };
        assert_eq!(output.diagnostic(), "ERROR: boom");

        let silent = ProcessOutput {
            stderr: String::new(),
            stdout: String::new(),
            ..output
        };
        assert_eq!(silent.diagnostic(), "exit code 1");
    }
}
