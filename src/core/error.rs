//! 错误分类
//!
//! - WorkspaceError：路径逃逸、源缺失、目标已存在、解码失败、行号越界等（逐操作报告）
//! - DirectiveError：指令结构错误与参数错误（逐指令报告，绝不中断同批其它指令）
//! - AgentError：协作者（Planner / Agent / 图片生成 / LLM）调用失败
//! - OrchestratorError：使本次运行终止的错误（规划失败、重规划次数超限等）

use std::path::PathBuf;

use thiserror::Error;

use crate::plan::AgentRole;

/// 工作区操作错误（PathError 及其 IO 相关错误）
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("Path escape attempt: {0}")]
    PathEscape(String),

    #[error("Path not found: {0}")]
    NotFound(String),

    #[error("Path already exists: {0}")]
    AlreadyExists(String),

    #[error("Not a directory: {0}")]
    NotADirectory(String),

    #[error("Invalid target: {0}")]
    InvalidTarget(String),

    #[error("File is not valid UTF-8 text: {0}")]
    Decode(String),

    #[error("Invalid line range {start}..{end} for {path} ({line_count} lines)")]
    LineRange {
        path: String,
        start: usize,
        end: usize,
        line_count: usize,
    },

    #[error("Empty snippet for {0}")]
    EmptySnippet(String),

    #[error("IO error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WorkspaceError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// 指令错误：结构错误（StructuralError）与参数/处理器错误
#[derive(Error, Debug)]
pub enum DirectiveError {
    #[error("Malformed directive: {0}")]
    Malformed(String),

    #[error("Not a call expression: {0}")]
    NotACall(String),

    #[error("Callee is not a bare name: {0}")]
    CalleeNotBareName(String),

    #[error("Argument {index} is not a literal: {source_text}")]
    NonLiteralArgument { index: usize, source_text: String },

    #[error("Keyword arguments are not supported: {0}")]
    KeywordArgument(String),

    #[error("{directive} expects {expected} argument(s), got {got}")]
    ArgumentCount {
        directive: String,
        expected: String,
        got: usize,
    },

    #[error("{directive}: argument {index} must be {expected}")]
    ArgumentType {
        directive: String,
        index: usize,
        expected: &'static str,
    },

    #[error("No image data returned for {0}")]
    NoImageData(String),

    #[error("Image generation failed: {0}")]
    ImageGeneration(String),

    #[error("Preference store error: {0}")]
    Preference(String),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

/// 协作者调用失败
#[derive(Error, Debug, Clone)]
pub enum AgentError {
    #[error("Planner returned an invalid plan: {0}")]
    InvalidPlan(String),

    #[error("Planner call failed: {0}")]
    PlannerFailed(String),

    #[error("Agent {role} failed: {reason}")]
    AgentFailed { role: AgentRole, reason: String },

    #[error("Agent stream for {role} broke: {reason}")]
    StreamBroken { role: AgentRole, reason: String },

    #[error("LLM error: {0}")]
    LlmError(String),
}

/// 单步执行中的失败（由 RecoveryEngine 决定升级为重规划还是终止）
#[derive(Error, Debug)]
pub enum StepError {
    #[error(transparent)]
    Agent(#[from] AgentError),

    #[error("No agent registered for role {0}")]
    AgentUnavailable(AgentRole),

    #[error(transparent)]
    Workspace(#[from] WorkspaceError),
}

/// 终止本次运行的错误
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Planning failed: {0}")]
    Planning(#[source] AgentError),

    #[error("Replan limit of {0} exceeded")]
    ReplanLimit(usize),

    #[error("Step {index} ({role}) aborted: {source}")]
    StepAborted {
        index: usize,
        role: AgentRole,
        #[source]
        source: StepError,
    },

    #[error("Orchestrator worker panicked")]
    WorkerPanicked,

    #[error("Failed to start orchestrator worker: {0}")]
    WorkerSpawn(String),
}

/// 单步失败后的恢复动作
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RecoveryAction {
    /// 当前计划不可行，带原因请求重规划
    Replan(String),
    /// 终止本次运行
    Abort,
}
