//! Maestro 演示入口
//!
//! 初始化日志、加载配置，用脚本化的 Mock LLM 驱动一次完整运行，并把事件逐行打印为 JSON。
//! 用法：`maestro [请求] [--config <path>]`

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use maestro::agents::{LlmAgent, LlmPlanner};
use maestro::config::load_config;
use maestro::core::{EventKind, OrchestratorBuilder};
use maestro::llm::MockLlmClient;
use maestro::plan::AgentRole;

const DEMO_PLAN: &str = r#"[
  {"agent_name": "coder", "instruction": "Create a hello world script"},
  {"agent_name": "code-reviewer", "instruction": "Review the script"},
  {"agent_name": "persona", "instruction": "Tell the user what was built", "is_final": true}
]"#;

fn parse_args() -> (String, Option<PathBuf>) {
    let mut request = Vec::new();
    let mut config = None;
    let mut args = std::env::args().skip(1);
    while let Some(arg) = args.next() {
        if arg == "--config" {
            config = args.next().map(PathBuf::from);
        } else {
            request.push(arg);
        }
    }
    let request = if request.is_empty() {
        "Write a hello world script".to_string()
    } else {
        request.join(" ")
    };
    (request, config)
}

fn main() -> anyhow::Result<()> {
    maestro::observability::init();
    let (request, config_path) = parse_args();

    let mut cfg = load_config(config_path).unwrap_or_else(|e| {
        tracing::warn!("Config load failed ({}), using defaults", e);
        Default::default()
    });
    // 演示不注册 prompt-refiner
    cfg.orchestrator.enhance_requests = false;

    let planner_llm = Arc::new(MockLlmClient::scripted([DEMO_PLAN]));
    let coder_llm = Arc::new(MockLlmClient::scripted([
        "Creating the script.\n`write(\"hello.py\", \"print('hello, world')\\n\")`\n`list_directory()`",
    ]));
    let reviewer_llm = Arc::new(MockLlmClient::scripted(["Clean and minimal.\nGRADE: 88/100"]));
    let persona_llm = Arc::new(MockLlmClient::scripted([
        "I created hello.py, which prints a greeting.",
    ]));

    let orchestrator = OrchestratorBuilder::from_config(cfg, Arc::new(LlmPlanner::new(planner_llm)))
        .with_agent(AgentRole::Coder, LlmAgent::new(coder_llm, AgentRole::Coder))
        .with_agent(
            AgentRole::CodeReviewer,
            LlmAgent::new(reviewer_llm, AgentRole::CodeReviewer),
        )
        .with_agent(
            AgentRole::Persona,
            LlmAgent::new(persona_llm, AgentRole::Persona).streaming(true),
        )
        .build()
        .context("Failed to build orchestrator")?;

    let mut handle = orchestrator.spawn(request).context("Failed to start run")?;
    let mut failed = false;
    loop {
        for event in handle.poll() {
            if let EventKind::Done { outcome } = &event.kind {
                failed = !matches!(outcome, maestro::core::RunOutcome::Completed);
            }
            println!("{}", serde_json::to_string(&event)?);
        }
        if handle.is_finished() {
            break;
        }
        std::thread::sleep(Duration::from_millis(50));
    }
    let (_orchestrator, rest) = handle.join().context("Orchestrator worker failed")?;
    for event in rest {
        if let EventKind::Done { outcome } = &event.kind {
            failed = !matches!(outcome, maestro::core::RunOutcome::Completed);
        }
        println!("{}", serde_json::to_string(&event)?);
    }
    if failed {
        anyhow::bail!("run failed");
    }
    Ok(())
}
