//! 默认的外部进程执行器：`sh -c`，工作区为当前目录，带超时，拒绝危险命令

use std::path::Path;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use crate::agents::{ProcessFailure, ProcessOutput, ProcessRunner};

/// 禁止的子串（命中即拒绝启动）
const FORBIDDEN_SUBSTR: &[&str] = &[
    "rm -rf /",
    "rm -fr /",
    "sudo ",
    "curl | sh",
    "wget -o- | sh",
    "chmod 777 /",
    "mkfs",
    "dd if=",
    "> /dev/sd",
    ":(){ :|:& };:", // fork bomb
];

#[derive(Debug, Default, Clone)]
pub struct TokioProcessRunner;

impl TokioProcessRunner {
    pub fn new() -> Self {
        Self
    }

    fn check(command: &str) -> Result<(), ProcessFailure> {
        if command.trim().is_empty() {
            return Err(ProcessFailure::Launch("empty command".to_string()));
        }
        let lower = command.to_lowercase();
        for forbidden in FORBIDDEN_SUBSTR {
            if lower.contains(forbidden) {
                return Err(ProcessFailure::Launch(format!(
                    "forbidden pattern: {}",
                    forbidden.trim()
                )));
            }
        }
        Ok(())
    }
}

#[async_trait]
impl ProcessRunner for TokioProcessRunner {
    async fn run(
        &self,
        command: &str,
        cwd: &Path,
        timeout: Duration,
    ) -> Result<ProcessOutput, ProcessFailure> {
        Self::check(command)?;
        tracing::info!(command = %command, cwd = %cwd.display(), "process run");

        let mut cmd = if cfg!(target_os = "windows") {
            let mut c = Command::new("cmd");
            c.args(["/C", command]);
            c
        } else {
            let mut c = Command::new("sh");
            c.args(["-c", command]);
            c
        };
        cmd.current_dir(cwd)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let output = tokio::time::timeout(timeout, cmd.output())
            .await
            .map_err(|_| ProcessFailure::Timeout(timeout.as_secs()))?
            .map_err(|e| ProcessFailure::Launch(e.to_string()))?;

        Ok(ProcessOutput {
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
            exit_code: output.status.code(),
        })
    }
}

#[cfg(all(test, unix))]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_runs_in_cwd_and_reports_exit_code() {
        let dir = TempDir::new().unwrap();
        std::fs::write(dir.path().join("marker.txt"), "x").unwrap();
        let runner = TokioProcessRunner::new();
        let ok = runner
            .run("ls", dir.path(), Duration::from_secs(10))
            .await
            .unwrap();
        assert!(ok.success());
        assert!(ok.stdout.contains("marker.txt"));

        let failed = runner
            .run("echo oops >&2; exit 3", dir.path(), Duration::from_secs(10))
            .await
            .unwrap();
        assert_eq!(failed.exit_code, Some(3));
        assert!(failed.stderr.contains("oops"));
    }

    #[tokio::test]
    async fn test_timeout_and_forbidden() {
        let dir = TempDir::new().unwrap();
        let runner = TokioProcessRunner::new();
        let slow = runner
            .run("sleep 5", dir.path(), Duration::from_millis(100))
            .await;
        assert!(matches!(slow, Err(ProcessFailure::Timeout(_))));
        let refused = runner
            .run("sudo rm -rf /", dir.path(), Duration::from_secs(1))
            .await;
        assert!(matches!(refused, Err(ProcessFailure::Launch(_))));
    }
}
