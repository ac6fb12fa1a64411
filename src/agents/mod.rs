//! 协作者层：Planner / Agent / 图片生成 / 进程执行的接口、回复解码与默认实现

pub mod llm_adapter;
pub mod process;
pub mod reply;
pub mod traits;

pub use llm_adapter::{default_role_prompt, render_context, LlmAgent, LlmPlanner};
pub use process::TokioProcessRunner;
pub use reply::{AgentText, REPLAN_SENTINEL};
pub use traits::{
    Agent, AgentContext, AgentReply, AgentRoster, CoderReply, ImageGenerator, Planner,
    ProcessFailure, ProcessOutput, ProcessRunner, TextStream,
};
