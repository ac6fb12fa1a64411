//! 指令执行产生的事件

use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DirectiveEvent {
    /// 普通状态说明（含被忽略的候选、查询结果、命令输出）
    Status { message: String },
    /// 文件被创建/修改/删除/移动
    FileChanged { path: String },
    /// 单条指令失败，不影响同批其它指令
    Error { directive: String, message: String },
    /// 外部命令失败，请求重规划
    Replan { reason: String },
}

impl DirectiveEvent {
    pub fn status(message: impl Into<String>) -> Self {
        DirectiveEvent::Status {
            message: message.into(),
        }
    }

    pub fn file_changed(path: impl Into<String>) -> Self {
        DirectiveEvent::FileChanged { path: path.into() }
    }
}

/// 一段文本的解释结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InterpretReport {
    pub events: Vec<DirectiveEvent>,
    /// generate_image 产出的文件（工作区相对路径）
    pub artifacts: Vec<String>,
    /// 成功执行的指令数
    pub executed: usize,
}

impl InterpretReport {
    /// 第一条重规划请求的原因
    pub fn replan_reason(&self) -> Option<&str> {
        self.events.iter().find_map(|e| match e {
            DirectiveEvent::Replan { reason } => Some(reason.as_str()),
            _ => None,
        })
    }

    pub fn changed_paths(&self) -> Vec<&str> {
        self.events
            .iter()
            .filter_map(|e| match e {
                DirectiveEvent::FileChanged { path } => Some(path.as_str()),
                _ => None,
            })
            .collect()
    }

    pub fn errors(&self) -> usize {
        self.events
            .iter()
            .filter(|e| matches!(e, DirectiveEvent::Error { .. }))
            .count()
    }
}
