//! 错误恢复引擎
//!
//! 根据 StepError 返回 RecoveryAction：协作者调用失败说明当前计划走不通，升级为重规划；
//! 工作区层面的意外错误终止本次运行。

use crate::core::{AgentError, RecoveryAction, StepError};

#[derive(Debug, Default)]
pub struct RecoveryEngine;

impl RecoveryEngine {
    pub fn new() -> Self {
        Self
    }

    pub fn handle(&self, err: &StepError) -> RecoveryAction {
        match err {
            StepError::Agent(AgentError::AgentFailed { role, reason }) => {
                RecoveryAction::Replan(format!("Agent {} failed: {}", role, reason))
            }
            StepError::Agent(AgentError::StreamBroken { role, reason }) => {
                RecoveryAction::Replan(format!("Output stream from {} broke: {}", role, reason))
            }
            StepError::Agent(AgentError::LlmError(msg)) => {
                RecoveryAction::Replan(format!("LLM call failed: {}", msg))
            }
            StepError::AgentUnavailable(role) => RecoveryAction::Replan(format!(
                "No agent is available for role {}; use a different role",
                role
            )),
            StepError::Agent(AgentError::InvalidPlan(_) | AgentError::PlannerFailed(_)) => {
                RecoveryAction::Abort
            }
            StepError::Workspace(_) => RecoveryAction::Abort,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::WorkspaceError;
    use crate::plan::AgentRole;

    #[test]
    fn test_agent_failures_escalate_to_replan() {
        let engine = RecoveryEngine::new();
        let err = StepError::Agent(AgentError::AgentFailed {
            role: AgentRole::Coder,
            reason: "timeout".into(),
        });
        match engine.handle(&err) {
            RecoveryAction::Replan(reason) => {
                assert!(reason.contains("coder"));
                assert!(reason.contains("timeout"));
            }
            other => panic!("Expected Replan, got {:?}", other),
        }
        assert!(matches!(
            engine.handle(&StepError::AgentUnavailable(AgentRole::ArtReviewer)),
            RecoveryAction::Replan(_)
        ));
    }

    #[test]
    fn test_workspace_failure_aborts() {
        let engine = RecoveryEngine::new();
        let err = StepError::Workspace(WorkspaceError::NotFound("x".into()));
        assert_eq!(engine.handle(&err), RecoveryAction::Abort);
    }
}
