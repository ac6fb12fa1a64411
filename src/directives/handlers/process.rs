//! `run(command)`：在工作区根目录执行外部命令
//!
//! 非零退出、超时、启动失败都转为 Replan 事件（原因中带退出码），从不作为普通 Error 上报。

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::agents::{ProcessFailure, ProcessRunner};
use crate::core::DirectiveError;
use crate::directives::registry::{Args, DirectiveContext, DirectiveHandler};
use crate::directives::DirectiveEvent;

/// 输出预览上限（字符）
const OUTPUT_PREVIEW_CHARS: usize = 2000;

pub struct RunCommand {
    runner: Arc<dyn ProcessRunner>,
    timeout: Duration,
}

impl RunCommand {
    pub fn new(runner: Arc<dyn ProcessRunner>, timeout: Duration) -> Self {
        Self { runner, timeout }
    }
}

fn preview(s: &str) -> String {
    let trimmed = s.trim_end();
    if trimmed.chars().count() > OUTPUT_PREVIEW_CHARS {
        let head: String = trimmed.chars().take(OUTPUT_PREVIEW_CHARS).collect();
        format!("{}...", head)
    } else {
        trimmed.to_string()
    }
}

#[async_trait]
impl DirectiveHandler for RunCommand {
    fn name(&self) -> &str {
        "run"
    }

    fn description(&self) -> &str {
        "run(command): run a shell command in the workspace root; failures trigger a replan"
    }

    async fn execute(
        &self,
        args: &Args<'_>,
        ctx: &mut DirectiveContext<'_>,
    ) -> Result<Vec<DirectiveEvent>, DirectiveError> {
        args.expect_count(1, 1)?;
        let command = args.text(0)?.trim();
        tracing::info!(command = %command, "run directive");

        let result = self
            .runner
            .run(command, ctx.workspace.root(), self.timeout)
            .await;
        // 命令可能改动了任意文件
        ctx.state.mark_listing_stale();

        let event = match result {
            Ok(out) if out.success() => {
                let mut message = format!("`{}` exited with code 0", command);
                let stdout = preview(&out.stdout);
                if !stdout.is_empty() {
                    message.push_str(":\n");
                    message.push_str(&stdout);
                }
                DirectiveEvent::status(message)
            }
            Ok(out) => {
                let code = out
                    .exit_code
                    .map(|c| format!("exit code {}", c))
                    .unwrap_or_else(|| "termination by signal".to_string());
                let detail = preview(if out.stderr.trim().is_empty() {
                    &out.stdout
                } else {
                    &out.stderr
                });
                DirectiveEvent::Replan {
                    reason: format!("Command `{}` failed with {}: {}", command, code, detail),
                }
            }
            Err(ProcessFailure::Timeout(secs)) => DirectiveEvent::Replan {
                reason: format!("Command `{}` timed out after {}s", command, secs),
            },
            Err(ProcessFailure::Launch(e)) => DirectiveEvent::Replan {
                reason: format!("Command `{}` could not be launched: {}", command, e),
            },
        };
        Ok(vec![event])
    }
}
