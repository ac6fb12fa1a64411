//! 编排器 → 调用方的事件流
//!
//! 事件通过无界通道送出，调用方按固定间隔轮询，每次可能收到零条或多条。

use chrono::{DateTime, Local};
use serde::Serialize;
use tokio::sync::mpsc;
use uuid::Uuid;

use crate::directives::DirectiveEvent;
use crate::plan::AgentRole;

/// 一次运行的结局
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum RunOutcome {
    Completed,
    Failed { reason: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum EventKind {
    Status { message: String },
    TextChunk { role: AgentRole, text: String },
    FileChanged { path: String },
    Error { message: String },
    ReplanRequested { reason: String, triggering_agent: AgentRole },
    Done { outcome: RunOutcome },
}

/// 带时间戳的事件记录
#[derive(Debug, Clone, Serialize)]
pub struct OrchestratorEvent {
    pub run_id: Uuid,
    pub at: DateTime<Local>,
    #[serde(flatten)]
    pub kind: EventKind,
}

/// 事件发送端；接收端已关闭时静默丢弃
#[derive(Debug, Clone)]
pub struct EventSink {
    run_id: Uuid,
    tx: mpsc::UnboundedSender<OrchestratorEvent>,
}

impl EventSink {
    pub fn new(run_id: Uuid, tx: mpsc::UnboundedSender<OrchestratorEvent>) -> Self {
        Self { run_id, tx }
    }

    /// 新建通道：返回发送端与接收端
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OrchestratorEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self::new(Uuid::new_v4(), tx), rx)
    }

    pub fn run_id(&self) -> Uuid {
        self.run_id
    }

    pub fn emit(&self, kind: EventKind) {
        let event = OrchestratorEvent {
            run_id: self.run_id,
            at: Local::now(),
            kind,
        };
        if self.tx.send(event).is_err() {
            tracing::debug!(run_id = %self.run_id, "event receiver dropped");
        }
    }

    pub fn status(&self, message: impl Into<String>) {
        self.emit(EventKind::Status {
            message: message.into(),
        });
    }

    pub fn error(&self, message: impl Into<String>) {
        self.emit(EventKind::Error {
            message: message.into(),
        });
    }

    /// 转发指令事件；Replan 由编排器统一处理，这里不转发
    pub fn forward(&self, event: &DirectiveEvent) {
        match event {
            DirectiveEvent::Status { message } => self.status(message.clone()),
            DirectiveEvent::FileChanged { path } => {
                self.emit(EventKind::FileChanged { path: path.clone() })
            }
            DirectiveEvent::Error { directive, message } => {
                self.error(format!("{}: {}", directive, message))
            }
            DirectiveEvent::Replan { .. } => {}
        }
    }
}
