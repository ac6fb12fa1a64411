//! Maestro - 多智能体编排内核
//!
//! 模块划分：
//! - **agents**: 协作者接口（Planner / Agent / 图片生成 / 进程执行）、回复解码与默认实现
//! - **config**: 应用配置加载（TOML + 环境变量）
//! - **core**: 计划执行器、运行状态、事件流、错误与恢复
//! - **directives**: 从智能体输出中解析并执行 `name(args)` 指令
//! - **grading**: 评分提取、重试策略、图片变体整理
//! - **llm**: LLM 客户端抽象与 Mock 实现
//! - **memory**: 记忆日志（按 token 预算剪枝）与偏好设置
//! - **observability**: tracing 初始化
//! - **plan**: 计划模型与解析
//! - **workspace**: 沙箱工作区、回收站、行编辑与缓存

pub mod agents;
pub mod config;
pub mod core;
pub mod directives;
pub mod grading;
pub mod llm;
pub mod memory;
pub mod observability;
pub mod plan;
pub mod workspace;

pub use crate::core::{Orchestrator, OrchestratorBuilder, RunHandle};
