//! 指令解释器
//!
//! 对整段文本：扫描候选 → 名字不在注册表中则记一条 ignored 状态 → 严格解析 → 分派到处理器。
//! 每条指令独立成败，任何失败只产生一条 Error 事件，随后继续下一条。
//! 每次分派输出一条结构化审计日志（JSON）。

use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::agents::{ImageGenerator, ProcessRunner};
use crate::core::DirectiveError;
use crate::directives::handlers::{
    CreateFile, DeletePath, EditLines, GenerateImage, GetPreference, ListDirectory, RenamePath,
    ReplaceSnippet, RunCommand, SetPreference, WriteFile,
};
use crate::directives::parser::{parse_call, scan_candidates};
use crate::directives::registry::{canonical_name, Args, DirectiveContext, DirectiveRegistry};
use crate::directives::{DirectiveEvent, InterpretReport};
use crate::memory::PreferenceStore;
use crate::workspace::{Workspace, WorkspaceState};

pub struct DirectiveInterpreter {
    registry: DirectiveRegistry,
}

impl DirectiveInterpreter {
    pub fn new(registry: DirectiveRegistry) -> Self {
        Self { registry }
    }

    /// 注册全部内置指令
    pub fn standard(
        workspace: &Workspace,
        runner: Arc<dyn ProcessRunner>,
        images: Arc<dyn ImageGenerator>,
        run_timeout: Duration,
    ) -> Self {
        let prefs = PreferenceStore::open(workspace);
        let mut registry = DirectiveRegistry::new();
        registry.register(CreateFile);
        registry.register(WriteFile);
        registry.register(DeletePath);
        registry.register(RenamePath);
        registry.register(ListDirectory);
        registry.register(ReplaceSnippet);
        registry.register(EditLines);
        registry.register(RunCommand::new(runner, run_timeout));
        registry.register(GenerateImage::new(images));
        registry.register(SetPreference::new(prefs.clone()));
        registry.register(GetPreference::new(prefs));
        Self::new(registry)
    }

    pub fn registry(&self) -> &DirectiveRegistry {
        &self.registry
    }

    /// 解释整段文本，返回按出现顺序排列的事件与产物
    pub async fn interpret(
        &self,
        text: &str,
        workspace: &Workspace,
        state: &mut WorkspaceState,
    ) -> InterpretReport {
        let mut report = InterpretReport::default();
        for candidate in scan_candidates(text) {
            // 带点的调用名按最后一段判断是否像指令，解析阶段再以「非裸名」报错
            let last_segment = candidate.name.rsplit('.').next().unwrap_or(candidate.name);
            let Some(handler) = self.registry.get(last_segment) else {
                report.events.push(DirectiveEvent::status(format!(
                    "Ignored `{}`: not a supported directive",
                    candidate.name
                )));
                continue;
            };
            let name = canonical_name(last_segment);

            let start = Instant::now();
            let result = match parse_call(candidate.source) {
                Ok(directive) => {
                    let args = Args::new(&name, &directive.args);
                    let mut ctx = DirectiveContext {
                        workspace,
                        state: &mut *state,
                        artifacts: &mut report.artifacts,
                    };
                    handler.execute(&args, &mut ctx).await
                }
                Err(e) => Err(e),
            };
            audit(&name, candidate.source, &result, start.elapsed());

            match result {
                Ok(events) => {
                    report.executed += 1;
                    report.events.extend(events);
                }
                Err(e) => {
                    tracing::warn!(directive = %name, error = %e, "directive failed");
                    report.events.push(DirectiveEvent::Error {
                        directive: name,
                        message: e.to_string(),
                    });
                }
            }
        }
        report
    }
}

fn audit(
    name: &str,
    source: &str,
    result: &Result<Vec<DirectiveEvent>, DirectiveError>,
    elapsed: Duration,
) {
    let (ok, outcome) = match result {
        Ok(events) if events.iter().any(|e| matches!(e, DirectiveEvent::Replan { .. })) => {
            (false, "replan")
        }
        Ok(_) => (true, "ok"),
        Err(_) => (false, "error"),
    };
    let audit = serde_json::json!({
        "event": "directive_audit",
        "directive": name,
        "ok": ok,
        "outcome": outcome,
        "duration_ms": elapsed.as_millis() as u64,
        "args_preview": args_preview(source),
    });
    tracing::info!(audit = %audit.to_string(), "directive");
}

fn args_preview(source: &str) -> String {
    if source.chars().count() > 200 {
        format!("{}...", source.chars().take(200).collect::<String>())
    } else {
        source.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agents::{ProcessFailure, ProcessOutput};
    use async_trait::async_trait;
    use std::path::Path;
    use tempfile::TempDir;

    struct FakeRunner {
        result: Result<ProcessOutput, ProcessFailure>,
    }

    #[async_trait]
    impl ProcessRunner for FakeRunner {
        async fn run(
            &self,
            command: &str,
            _cwd: &Path,
            _timeout: Duration,
        ) -> Result<ProcessOutput, ProcessFailure> {
            assert!(!command.is_empty());
            self.result.clone()
        }
    }

    struct FakeImages(Vec<u8>);

    #[async_trait]
    impl ImageGenerator for FakeImages {
        async fn generate(&self, _prompt: &str) -> Result<Vec<u8>, String> {
            Ok(self.0.clone())
        }
    }

    fn exit_with(code: i32, stderr: &str) -> Result<ProcessOutput, ProcessFailure> {
        Ok(ProcessOutput {
            stdout: String::new(),
            stderr: stderr.to_string(),
            exit_code: Some(code),
        })
    }

    fn setup(
        run: Result<ProcessOutput, ProcessFailure>,
        image: Vec<u8>,
    ) -> (TempDir, Workspace, WorkspaceState, DirectiveInterpreter) {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let runner = Arc::new(FakeRunner { result: run });
        let interp = DirectiveInterpreter::standard(
            &ws,
            runner,
            Arc::new(FakeImages(image)),
            Duration::from_secs(5),
        );
        (dir, ws, WorkspaceState::default(), interp)
    }

    #[tokio::test]
    async fn test_mutations_record_changes_and_events() {
        let (_dir, ws, mut state, interp) = setup(exit_with(0, ""), vec![1]);
        let text = "Plan:\n`create(\"src/a.txt\", \"one\\ntwo\\n\")`\n\
                    `write('b.txt', 'x')`\n`rename(\"b.txt\", \"c.txt\")`\n`delete(\"c.txt\")`";
        let report = interp.interpret(text, &ws, &mut state).await;
        assert_eq!(report.executed, 4);
        assert_eq!(report.errors(), 0);
        assert_eq!(
            report.changed_paths(),
            vec!["src/a.txt", "b.txt", "b.txt", "c.txt", "c.txt"]
        );
        assert_eq!(ws.read_text("src/a.txt").unwrap(), "one\ntwo\n");
        assert!(!ws.exists("c.txt"));
        assert_eq!(state.recent_changes().count(), 4);
        assert!(state.listing_is_stale());
    }

    #[tokio::test]
    async fn test_unterminated_string_reports_error_and_continues() {
        let (_dir, ws, mut state, interp) = setup(exit_with(0, ""), vec![1]);
        ws.write_file("x.txt", "old").unwrap();
        let text = "`write(\"notes.txt, oops)` then `delete(\"x.txt\")`";
        let report = interp.interpret(text, &ws, &mut state).await;
        assert_eq!(report.errors(), 1);
        assert_eq!(report.executed, 1);
        assert!(matches!(
            &report.events[0],
            DirectiveEvent::Error { directive, .. } if directive == "write"
        ));
        assert!(!ws.exists("notes.txt"));
        assert!(!ws.exists("x.txt"));
    }

    #[tokio::test]
    async fn test_fault_isolation_between_directives() {
        let (_dir, ws, mut state, interp) = setup(exit_with(0, ""), vec![1]);
        ws.write_file("exists.txt", "x").unwrap();
        let text = "`create(\"exists.txt\", \"y\")` `write(name, \"z\")` \
                    `os.delete(\"q\")` `print(\"hello\")` `write(\"ok.txt\", \"fine\")`";
        let report = interp.interpret(text, &ws, &mut state).await;
        assert_eq!(report.errors(), 3);
        assert_eq!(report.executed, 1);
        assert!(report
            .events
            .iter()
            .any(|e| matches!(e, DirectiveEvent::Status { message } if message.contains("Ignored `print`"))));
        assert_eq!(ws.read_text("ok.txt").unwrap(), "fine");
        assert_eq!(ws.read_text("exists.txt").unwrap(), "x");
    }

    #[tokio::test]
    async fn test_hyphenated_names_and_path_escape() {
        let (_dir, ws, mut state, interp) = setup(exit_with(0, ""), vec![1]);
        let text = "`write(\"../outside.txt\", \"x\")` `list-directory()`";
        let report = interp.interpret(text, &ws, &mut state).await;
        assert!(matches!(&report.events[0], DirectiveEvent::Error { directive, message }
            if directive == "write" && message.contains("escape")));
        assert!(matches!(&report.events[1], DirectiveEvent::Status { message } if message.contains("(empty)")));
    }

    #[tokio::test]
    async fn test_failed_run_requests_replan_with_exit_code() {
        let (_dir, ws, mut state, interp) = setup(exit_with(2, "tests failed"), vec![1]);
        let report = interp.interpret("`run(\"make test\")`", &ws, &mut state).await;
        assert_eq!(report.errors(), 0);
        let reason = report.replan_reason().unwrap();
        assert!(reason.contains("exit code 2"));
        assert!(reason.contains("tests failed"));
    }

    #[tokio::test]
    async fn test_timeout_is_treated_like_failed_exit() {
        let (_dir, ws, mut state, interp) = setup(Err(ProcessFailure::Timeout(5)), vec![1]);
        let report = interp.interpret("`run(\"sleep 100\")`", &ws, &mut state).await;
        assert_eq!(report.errors(), 0);
        assert!(report.replan_reason().unwrap().contains("timed out"));
    }

    #[tokio::test]
    async fn test_successful_run_is_status() {
        let ok = Ok(ProcessOutput {
            stdout: "all good\n".into(),
            stderr: String::new(),
            exit_code: Some(0),
        });
        let (_dir, ws, mut state, interp) = setup(ok, vec![1]);
        let report = interp.interpret("`run(\"true\")`", &ws, &mut state).await;
        assert!(report.replan_reason().is_none());
        assert!(matches!(&report.events[0], DirectiveEvent::Status { message } if message.contains("all good")));
    }

    #[tokio::test]
    async fn test_generate_image_records_artifact() {
        let (_dir, ws, mut state, interp) = setup(exit_with(0, ""), vec![0x89, 0x50]);
        let report = interp
            .interpret("`generate_image(\"art/hero.png\", \"a bee\")`", &ws, &mut state)
            .await;
        assert_eq!(report.artifacts, vec!["art/hero.png".to_string()]);
        assert_eq!(ws.read_bytes("art/hero.png").unwrap(), vec![0x89, 0x50]);
    }

    #[tokio::test]
    async fn test_generate_image_without_data_is_error() {
        let (_dir, ws, mut state, interp) = setup(exit_with(0, ""), Vec::new());
        let report = interp
            .interpret("`generate_image(\"x.png\", \"nothing\")`", &ws, &mut state)
            .await;
        assert_eq!(report.errors(), 1);
        assert!(report.artifacts.is_empty());
        assert!(!ws.exists("x.png"));
    }

    #[tokio::test]
    async fn test_preferences_and_type_validation() {
        let (_dir, ws, mut state, interp) = setup(exit_with(0, ""), vec![1]);
        let text = "`set_preference(\"theme\", \"dark\")` `set_preference(\"size\", 12)` `get_preference(\"theme\")`";
        let report = interp.interpret(text, &ws, &mut state).await;
        assert_eq!(report.errors(), 1);
        assert!(matches!(&report.events[2], DirectiveEvent::Status { message } if message.contains("dark")));
    }

    #[tokio::test]
    async fn test_snippet_and_line_edits() {
        let (_dir, ws, mut state, interp) = setup(exit_with(0, ""), vec![1]);
        ws.write_file("f.txt", "a\nb\nc\n").unwrap();
        let text = "`replace_snippet(\"f.txt\", \"zzz\", \"y\")` `edit_lines(\"f.txt\", 2, 2, \"B\")` \
                    `edit_lines(\"f.txt\", 9, 9, \"oops\")`";
        let report = interp.interpret(text, &ws, &mut state).await;
        assert!(matches!(&report.events[0], DirectiveEvent::Status { message } if message.contains("not found")));
        assert_eq!(report.errors(), 1);
        assert_eq!(ws.read_text("f.txt").unwrap(), "a\nB\nc\n");
    }
}
