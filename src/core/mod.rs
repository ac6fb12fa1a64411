//! 核心编排层：错误与恢复、运行状态、事件流、构建器、主控循环

pub mod builder;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod recovery;
pub mod state;

pub use builder::{NoImageGenerator, OrchestratorBuilder};
pub use error::{
    AgentError, DirectiveError, OrchestratorError, RecoveryAction, StepError, WorkspaceError,
};
pub use events::{EventKind, EventSink, OrchestratorEvent, RunOutcome};
pub use orchestrator::{inject_feedback, Orchestrator, RunHandle, CRITIQUE_PLACEHOLDER};
pub use recovery::RecoveryEngine;
pub use state::RunState;
