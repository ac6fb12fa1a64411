//! 编排器独占的工作区缓存
//!
//! - recent changes：最近的变更记录（用于重规划摘要与 Agent 上下文）
//! - 文件列表缓存：任何结构性变更后显式 mark_listing_stale
//! - 文件内容快照：按 (mtime, 长度) 失效
//!
//! 只在编排器工作线程上访问，显式传给 Workspace 调用方与指令解释器，不走全局变量。

use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::SystemTime;

use chrono::{DateTime, Local};

use crate::core::WorkspaceError;
use crate::workspace::Workspace;

/// 变更类型
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeAction {
    Created,
    Written,
    Deleted,
    Renamed,
    Edited,
}

impl ChangeAction {
    /// 是否改变了文件集合（需要让文件列表缓存失效）
    pub fn is_structural(&self) -> bool {
        !matches!(self, ChangeAction::Edited)
    }

    fn as_str(&self) -> &'static str {
        match self {
            ChangeAction::Created => "created",
            ChangeAction::Written => "wrote",
            ChangeAction::Deleted => "deleted",
            ChangeAction::Renamed => "renamed",
            ChangeAction::Edited => "edited",
        }
    }
}

/// 单条变更记录
#[derive(Debug, Clone)]
pub struct ChangeRecord {
    pub at: DateTime<Local>,
    pub action: ChangeAction,
    pub path: String,
    pub detail: Option<String>,
}

impl fmt::Display for ChangeRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.at.format("%H:%M:%S"), self.action.as_str(), self.path)?;
        if let Some(d) = &self.detail {
            write!(f, " ({})", d)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
struct Snapshot {
    modified: SystemTime,
    len: u64,
    content: Arc<str>,
}

/// 文本文件快照（供 Agent 上下文使用）
#[derive(Debug, Clone)]
pub struct FileSnapshot {
    pub path: String,
    pub content: Arc<str>,
}

#[derive(Debug)]
pub struct WorkspaceState {
    recent: VecDeque<ChangeRecord>,
    capacity: usize,
    listing: Option<Vec<String>>,
    snapshots: HashMap<PathBuf, Snapshot>,
}

impl Default for WorkspaceState {
    fn default() -> Self {
        Self::new(50)
    }
}

impl WorkspaceState {
    pub fn new(capacity: usize) -> Self {
        Self {
            recent: VecDeque::with_capacity(capacity.min(256)),
            capacity: capacity.max(1),
            listing: None,
            snapshots: HashMap::new(),
        }
    }

    /// 记录一次变更；结构性变更会让文件列表缓存失效
    pub fn record_change(&mut self, action: ChangeAction, path: impl Into<String>, detail: Option<String>) {
        if self.recent.len() == self.capacity {
            self.recent.pop_front();
        }
        self.recent.push_back(ChangeRecord {
            at: Local::now(),
            action,
            path: path.into(),
            detail,
        });
        if action.is_structural() {
            self.mark_listing_stale();
        }
    }

    pub fn mark_listing_stale(&mut self) {
        self.listing = None;
    }

    pub fn listing_is_stale(&self) -> bool {
        self.listing.is_none()
    }

    /// 整个工作区的递归文件列表；缓存失效时重建
    pub fn project_listing(&mut self, workspace: &Workspace) -> Result<&[String], WorkspaceError> {
        if self.listing.is_none() {
            self.listing = Some(workspace.list_directory(".", true)?);
        }
        Ok(self.listing.as_deref().unwrap_or_default())
    }

    pub fn recent_changes(&self) -> impl Iterator<Item = &ChangeRecord> {
        self.recent.iter()
    }

    /// 最近 n 条变更的文本形式，旧的在前
    pub fn digest(&self, n: usize) -> Vec<String> {
        let skip = self.recent.len().saturating_sub(n);
        self.recent.iter().skip(skip).map(|r| r.to_string()).collect()
    }

    /// 读取文本文件快照；mtime 或长度变化时重新读取
    pub fn snapshot(&mut self, workspace: &Workspace, path: &str) -> Result<FileSnapshot, WorkspaceError> {
        let abs = workspace.safe_path(path)?;
        let meta = std::fs::metadata(&abs).map_err(|_| WorkspaceError::NotFound(path.to_string()))?;
        let modified = meta.modified().map_err(|e| WorkspaceError::io(&abs, e))?;
        let len = meta.len();

        if let Some(s) = self.snapshots.get(&abs) {
            if s.modified == modified && s.len == len {
                return Ok(FileSnapshot {
                    path: path.to_string(),
                    content: s.content.clone(),
                });
            }
        }
        let content: Arc<str> = Arc::from(workspace.read_text(path)?);
        self.snapshots.insert(
            abs,
            Snapshot {
                modified,
                len,
                content: content.clone(),
            },
        );
        Ok(FileSnapshot {
            path: path.to_string(),
            content,
        })
    }

    pub fn cached_snapshots(&self) -> usize {
        self.snapshots.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_structural_change_marks_listing_stale() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let mut state = WorkspaceState::new(10);

        ws.write_file("a.txt", "x").unwrap();
        assert_eq!(state.project_listing(&ws).unwrap(), ["a.txt".to_string()]);
        assert!(!state.listing_is_stale());

        state.record_change(ChangeAction::Edited, "a.txt", None);
        assert!(!state.listing_is_stale());

        ws.write_file("b.txt", "y").unwrap();
        state.record_change(ChangeAction::Created, "b.txt", None);
        assert!(state.listing_is_stale());
        assert_eq!(state.project_listing(&ws).unwrap().len(), 2);
    }

    #[test]
    fn test_recent_changes_bounded() {
        let mut state = WorkspaceState::new(2);
        state.record_change(ChangeAction::Created, "a", None);
        state.record_change(ChangeAction::Created, "b", None);
        state.record_change(ChangeAction::Deleted, "c", Some("trashed".into()));
        let digest = state.digest(10);
        assert_eq!(digest.len(), 2);
        assert!(digest[0].contains(" b"));
        assert!(digest[1].ends_with("deleted c (trashed)"));
    }

    #[test]
    fn test_snapshot_refreshes_on_change() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let mut state = WorkspaceState::default();

        ws.write_file("s.txt", "one").unwrap();
        assert_eq!(&*state.snapshot(&ws, "s.txt").unwrap().content, "one");
        ws.write_file("s.txt", "three").unwrap();
        assert_eq!(&*state.snapshot(&ws, "s.txt").unwrap().content, "three");
        assert_eq!(state.cached_snapshots(), 1);
    }
}
