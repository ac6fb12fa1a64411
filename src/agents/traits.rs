//! 协作者接口：Planner、Agent、ImageGenerator、ProcessRunner
//!
//! 编排器只依赖这些 trait；真实实现（LLM 适配、tokio 子进程）与测试脚本替身均可注入。

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_util::Stream;
use thiserror::Error;

use crate::core::AgentError;
use crate::directives::DirectiveEvent;
use crate::plan::{AgentRole, Plan, ReplanContext};
use crate::workspace::FileSnapshot;

/// 流式文本：每个元素是一段增量文本，Err 表示流中断
pub type TextStream = Pin<Box<dyn Stream<Item = Result<String, String>> + Send>>;

/// 结构化的 coder 回复：已自行执行过指令，编排器不再解释其文本
#[derive(Debug, Clone, Default)]
pub struct CoderReply {
    pub text: String,
    pub events: Vec<DirectiveEvent>,
    pub artifacts: Vec<String>,
}

/// Agent 的三种回复形态
pub enum AgentReply {
    Text(String),
    Stream(TextStream),
    Structured(CoderReply),
}

impl fmt::Debug for AgentReply {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentReply::Text(t) => f.debug_tuple("Text").field(t).finish(),
            AgentReply::Stream(_) => f.write_str("Stream(..)"),
            AgentReply::Structured(r) => f.debug_tuple("Structured").field(r).finish(),
        }
    }
}

/// 调用 Agent 时附带的上下文
#[derive(Debug, Clone, Default)]
pub struct AgentContext {
    /// 用户请求（可能已被 prompt-refiner 改写）
    pub request: String,
    pub step_index: usize,
    pub plan_len: usize,
    /// 上一步的输出；评审步骤之后为 critique
    pub previous_output: Option<String>,
    /// 近期变更摘要，旧的在前
    pub recent_changes: Vec<String>,
    /// 工作区递归文件列表
    pub project_files: Vec<String>,
    /// 上一步改动过的文本文件内容
    pub changed_files: Vec<FileSnapshot>,
    /// 当前评审对象（art-reviewer 的图片变体路径）
    pub artifact: Option<String>,
}

#[async_trait]
pub trait Planner: Send + Sync {
    /// 生成计划；replan 为 Some 时表示重规划，携带原因与近期动作摘要
    async fn get_plan(&self, request: &str, replan: Option<&ReplanContext>) -> Result<Plan, AgentError>;
}

#[async_trait]
pub trait Agent: Send + Sync {
    async fn invoke(&self, instruction: &str, context: &AgentContext) -> Result<AgentReply, AgentError>;
}

#[async_trait]
pub trait ImageGenerator: Send + Sync {
    /// 返回图片字节；Err 为生成服务的失败描述
    async fn generate(&self, prompt: &str) -> Result<Vec<u8>, String>;
}

/// 外部进程的完成结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessOutput {
    pub stdout: String,
    pub stderr: String,
    /// None 表示被信号终止
    pub exit_code: Option<i32>,
}

impl ProcessOutput {
    pub fn success(&self) -> bool {
        self.exit_code == Some(0)
    }
}

/// 外部进程未能正常完成
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ProcessFailure {
    #[error("timed out after {0}s")]
    Timeout(u64),

    #[error("failed to launch: {0}")]
    Launch(String),
}

#[async_trait]
pub trait ProcessRunner: Send + Sync {
    async fn run(&self, command: &str, cwd: &Path, timeout: Duration) -> Result<ProcessOutput, ProcessFailure>;
}

/// 角色 → Agent 的注册表
#[derive(Default, Clone)]
pub struct AgentRoster {
    agents: HashMap<AgentRole, Arc<dyn Agent>>,
}

impl AgentRoster {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, role: AgentRole, agent: impl Agent + 'static) {
        self.agents.insert(role, Arc::new(agent));
    }

    pub fn register_arc(&mut self, role: AgentRole, agent: Arc<dyn Agent>) {
        self.agents.insert(role, agent);
    }

    pub fn with(mut self, role: AgentRole, agent: impl Agent + 'static) -> Self {
        self.register(role, agent);
        self
    }

    pub fn get(&self, role: AgentRole) -> Option<Arc<dyn Agent>> {
        self.agents.get(&role).cloned()
    }

    pub fn contains(&self, role: AgentRole) -> bool {
        self.agents.contains_key(&role)
    }

    pub fn roles(&self) -> Vec<AgentRole> {
        let mut roles: Vec<AgentRole> = self.agents.keys().copied().collect();
        roles.sort_by_key(|r| r.as_str());
        roles
    }
}
