//! 计划层：步骤模型、规范化与 Planner 输出解析

pub mod parse;
pub mod types;

pub use parse::parse_plan_text;
pub use types::{AgentRole, Plan, ReplanContext, ReplanRequest, Step};
