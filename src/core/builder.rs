//! 编排器构建器：统一的初始化逻辑
//!
//! 从 AppConfig 与工作区根目录出发，注入 Planner、各角色 Agent、图片生成与进程执行协作者。
//! 未提供的进程执行器默认使用 TokioProcessRunner；未提供图片生成器时 generate_image 报错。

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::agents::{Agent, AgentRoster, ImageGenerator, Planner, ProcessRunner, TokioProcessRunner};
use crate::config::AppConfig;
use crate::core::{Orchestrator, WorkspaceError};
use crate::directives::DirectiveInterpreter;
use crate::grading::GradingPolicy;
use crate::memory::{JournalPolicy, MemoryJournal};
use crate::plan::AgentRole;
use crate::workspace::{Workspace, WorkspaceState};

/// 未配置图片生成服务时的占位实现
#[derive(Debug, Default)]
pub struct NoImageGenerator;

#[async_trait]
impl ImageGenerator for NoImageGenerator {
    async fn generate(&self, _prompt: &str) -> Result<Vec<u8>, String> {
        Err("no image generator configured".to_string())
    }
}

pub struct OrchestratorBuilder {
    config: AppConfig,
    workspace_root: PathBuf,
    planner: Arc<dyn Planner>,
    agents: AgentRoster,
    runner: Arc<dyn ProcessRunner>,
    images: Arc<dyn ImageGenerator>,
}

impl OrchestratorBuilder {
    pub fn new(config: AppConfig, workspace_root: impl Into<PathBuf>, planner: Arc<dyn Planner>) -> Self {
        Self {
            config,
            workspace_root: workspace_root.into(),
            planner,
            agents: AgentRoster::new(),
            runner: Arc::new(TokioProcessRunner::new()),
            images: Arc::new(NoImageGenerator),
        }
    }

    /// 工作区根目录取配置中的 app.workspace_root，未设置时用 ./workspace
    pub fn from_config(config: AppConfig, planner: Arc<dyn Planner>) -> Self {
        let root = config
            .app
            .workspace_root
            .clone()
            .unwrap_or_else(|| PathBuf::from("workspace"));
        Self::new(config, root, planner)
    }

    pub fn with_agent(mut self, role: AgentRole, agent: impl Agent + 'static) -> Self {
        self.agents.register(role, agent);
        self
    }

    pub fn with_agent_arc(mut self, role: AgentRole, agent: Arc<dyn Agent>) -> Self {
        self.agents.register_arc(role, agent);
        self
    }

    pub fn with_roster(mut self, agents: AgentRoster) -> Self {
        self.agents = agents;
        self
    }

    pub fn with_process_runner(mut self, runner: Arc<dyn ProcessRunner>) -> Self {
        self.runner = runner;
        self
    }

    pub fn with_image_generator(mut self, images: Arc<dyn ImageGenerator>) -> Self {
        self.images = images;
        self
    }

    pub fn build(self) -> Result<Orchestrator, WorkspaceError> {
        let cfg = self.config;
        let workspace = Workspace::open(&self.workspace_root)?.with_state_dir(&cfg.app.state_dir)?;
        let journal = MemoryJournal::open(
            &workspace,
            &cfg.journal.file_name,
            JournalPolicy::from(&cfg.journal),
        )?;
        let interpreter = DirectiveInterpreter::standard(
            &workspace,
            self.runner,
            self.images,
            Duration::from_secs(cfg.directives.run_timeout_secs.max(1)),
        );
        tracing::info!(
            root = %workspace.root().display(),
            roles = ?self.agents.roles(),
            directives = ?interpreter.registry().names(),
            "orchestrator built"
        );
        Ok(Orchestrator::from_parts(
            workspace,
            WorkspaceState::new(cfg.directives.recent_changes_capacity),
            self.planner,
            self.agents,
            interpreter,
            journal,
            GradingPolicy::from(&cfg.grading),
            cfg.orchestrator,
        ))
    }
}
