//! 运行状态机
//!
//! `Idle → Running(step) → {Running(next), AwaitingReplan, Completed, Failed}`；
//! AwaitingReplan 在新计划到达后回到 Running(0)。

use serde::Serialize;

use crate::plan::ReplanRequest;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum RunState {
    Idle,
    Running { step_index: usize, plan_len: usize },
    AwaitingReplan { request: ReplanRequest },
    Completed,
    Failed { reason: String },
}

impl Default for RunState {
    fn default() -> Self {
        RunState::Idle
    }
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, RunState::Completed | RunState::Failed { .. })
    }

    pub fn label(&self) -> &'static str {
        match self {
            RunState::Idle => "idle",
            RunState::Running { .. } => "running",
            RunState::AwaitingReplan { .. } => "awaiting_replan",
            RunState::Completed => "completed",
            RunState::Failed { .. } => "failed",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plan::AgentRole;

    #[test]
    fn test_terminal_states_and_serialization() {
        assert!(!RunState::Idle.is_terminal());
        assert!(RunState::Completed.is_terminal());
        let awaiting = RunState::AwaitingReplan {
            request: ReplanRequest::new("tests failed", AgentRole::Coder),
        };
        assert_eq!(awaiting.label(), "awaiting_replan");
        let json = serde_json::to_value(&awaiting).unwrap();
        assert_eq!(json["state"], "awaiting_replan");
        assert_eq!(json["request"]["triggering_agent"], "coder");
    }
}
