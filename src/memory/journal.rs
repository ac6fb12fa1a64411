//! 记忆日志：只追加、按优先级分类、按 token 预算剪枝
//!
//! 每行一条：`时间戳 \t 优先级 \t 分类 \t 内容`（内容中的换行/制表符转义）。
//! 每次 append 之后重算「高优先级」（priority <= 阈值）条目的估算 token 总量，
//! 超出预算则按文件顺序删除最旧的高优先级条目，直到回到预算内，
//! 再以高于阈值的优先级追加一条剪枝记录（本轮不会被再次剪掉）。

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};

use crate::config::JournalSection;
use crate::core::WorkspaceError;
use crate::workspace::Workspace;

/// 剪枝记录使用的分类
pub const PRUNE_CATEGORY: &str = "memory";

/// 单条记忆
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryEntry {
    pub timestamp: DateTime<Local>,
    pub priority: u8,
    pub category: String,
    pub content: String,
}

/// 一次剪枝的摘要
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PruneSummary {
    pub removed: usize,
    pub tokens_before: usize,
    pub tokens_after: usize,
}

/// 剪枝参数
#[derive(Debug, Clone)]
pub struct JournalPolicy {
    pub token_budget: usize,
    pub high_priority_threshold: u8,
    pub chars_per_token: usize,
}

impl Default for JournalPolicy {
    fn default() -> Self {
        Self {
            token_budget: 10_000,
            high_priority_threshold: 2,
            chars_per_token: 4,
        }
    }
}

impl From<&JournalSection> for JournalPolicy {
    fn from(cfg: &JournalSection) -> Self {
        Self {
            token_budget: cfg.token_budget,
            high_priority_threshold: cfg.high_priority_threshold,
            chars_per_token: cfg.chars_per_token.max(1),
        }
    }
}

impl JournalPolicy {
    pub fn estimate_tokens(&self, content: &str) -> usize {
        content.chars().count() / self.chars_per_token.max(1)
    }

    fn is_high_priority(&self, priority: u8) -> bool {
        priority <= self.high_priority_threshold
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(c),
        }
    }
    out
}

fn unescape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.next() {
            Some('n') => out.push('\n'),
            Some('r') => out.push('\r'),
            Some('t') => out.push('\t'),
            Some(other) => out.push(other),
            None => out.push('\\'),
        }
    }
    out
}

impl MemoryEntry {
    fn to_line(&self) -> String {
        format!(
            "{}\t{}\t{}\t{}",
            self.timestamp.to_rfc3339(),
            self.priority,
            escape(&self.category),
            escape(&self.content)
        )
    }

    fn parse(line: &str) -> Option<Self> {
        let mut parts = line.splitn(4, '\t');
        let timestamp = DateTime::parse_from_rfc3339(parts.next()?)
            .ok()?
            .with_timezone(&Local);
        let priority = parts.next()?.parse().ok()?;
        let category = unescape(parts.next()?);
        let content = unescape(parts.next()?);
        Some(Self {
            timestamp,
            priority,
            category,
            content,
        })
    }
}

/// 记忆日志文件，位于工作区状态目录下
#[derive(Debug, Clone)]
pub struct MemoryJournal {
    path: PathBuf,
    policy: JournalPolicy,
}

impl MemoryJournal {
    pub fn open(workspace: &Workspace, file_name: &str, policy: JournalPolicy) -> Result<Self, WorkspaceError> {
        let dir = workspace.state_dir();
        fs::create_dir_all(dir).map_err(|e| WorkspaceError::io(dir, e))?;
        Ok(Self {
            path: dir.join(file_name),
            policy,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn policy(&self) -> &JournalPolicy {
        &self.policy
    }

    /// 追加一条记忆；若触发剪枝，返回剪枝摘要
    pub fn append(
        &self,
        category: &str,
        content: &str,
        priority: u8,
    ) -> Result<Option<PruneSummary>, WorkspaceError> {
        let entry = MemoryEntry {
            timestamp: Local::now(),
            priority: priority.max(1),
            category: category.to_string(),
            content: content.to_string(),
        };
        self.write_line(&entry.to_line())?;
        self.enforce_budget()
    }

    fn write_line(&self, line: &str) -> Result<(), WorkspaceError> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| WorkspaceError::io(&self.path, e))?;
        writeln!(file, "{}", line).map_err(|e| WorkspaceError::io(&self.path, e))
    }

    fn read_lines(&self) -> Result<Vec<String>, WorkspaceError> {
        match fs::read_to_string(&self.path) {
            Ok(s) => Ok(s.lines().map(str::to_string).collect()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(WorkspaceError::io(&self.path, e)),
        }
    }

    /// 最近 n 行原始文本，最新的在最后
    pub fn tail(&self, n: usize) -> Result<Vec<String>, WorkspaceError> {
        let lines = self.read_lines()?;
        let skip = lines.len().saturating_sub(n);
        Ok(lines.into_iter().skip(skip).collect())
    }

    /// 全部可解析条目（按文件顺序）
    pub fn entries(&self) -> Result<Vec<MemoryEntry>, WorkspaceError> {
        Ok(self
            .read_lines()?
            .iter()
            .filter_map(|l| MemoryEntry::parse(l))
            .collect())
    }

    /// 高优先级条目的估算 token 总量
    pub fn high_priority_tokens(&self) -> Result<usize, WorkspaceError> {
        Ok(self
            .entries()?
            .iter()
            .filter(|e| self.policy.is_high_priority(e.priority))
            .map(|e| self.policy.estimate_tokens(&e.content))
            .sum())
    }

    fn enforce_budget(&self) -> Result<Option<PruneSummary>, WorkspaceError> {
        let lines = self.read_lines()?;
        let parsed: Vec<Option<MemoryEntry>> = lines.iter().map(|l| MemoryEntry::parse(l)).collect();
        let cost = |e: &MemoryEntry| {
            if self.policy.is_high_priority(e.priority) {
                self.policy.estimate_tokens(&e.content)
            } else {
                0
            }
        };
        let total: usize = parsed.iter().flatten().map(cost).sum();
        if total <= self.policy.token_budget {
            return Ok(None);
        }

        let mut remaining = total;
        let mut removed = 0usize;
        let mut keep = Vec::with_capacity(lines.len());
        for (line, entry) in lines.iter().zip(parsed.iter()) {
            if remaining > self.policy.token_budget {
                if let Some(e) = entry {
                    if self.policy.is_high_priority(e.priority) {
                        remaining -= cost(e);
                        removed += 1;
                        continue;
                    }
                }
            }
            keep.push(line.as_str());
        }

        let tmp = self.path.with_extension("tmp");
        let mut body = keep.join("\n");
        if !body.is_empty() {
            body.push('\n');
        }
        fs::write(&tmp, body).map_err(|e| WorkspaceError::io(&tmp, e))?;
        fs::rename(&tmp, &self.path).map_err(|e| WorkspaceError::io(&self.path, e))?;

        let summary = PruneSummary {
            removed,
            tokens_before: total,
            tokens_after: remaining,
        };
        tracing::info!(
            removed,
            tokens_before = total,
            tokens_after = remaining,
            budget = self.policy.token_budget,
            "memory journal pruned"
        );
        let notice = MemoryEntry {
            timestamp: Local::now(),
            priority: self.policy.high_priority_threshold.saturating_add(1),
            category: PRUNE_CATEGORY.to_string(),
            content: format!(
                "Pruned {} high-priority entries (~{} -> ~{} tokens, budget {})",
                removed, total, remaining, self.policy.token_budget
            ),
        };
        self.write_line(&notice.to_line())?;
        Ok(Some(summary))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn journal(budget: usize) -> (TempDir, MemoryJournal) {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        let j = MemoryJournal::open(
            &ws,
            "memory.log",
            JournalPolicy {
                token_budget: budget,
                high_priority_threshold: 2,
                chars_per_token: 4,
            },
        )
        .unwrap();
        (dir, j)
    }

    #[test]
    fn test_append_and_tail() {
        let (_dir, j) = journal(10_000);
        j.append("step", "first", 3).unwrap();
        j.append("step", "multi\nline\tcontent", 3).unwrap();
        let tail = j.tail(1).unwrap();
        assert_eq!(tail.len(), 1);
        assert!(tail[0].ends_with("multi\\nline\\tcontent"));
        let entries = j.entries().unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[1].content, "multi\nline\tcontent");
        assert_eq!(j.tail(10).unwrap().len(), 2);
    }

    #[test]
    fn test_prunes_oldest_high_priority_entries() {
        let (_dir, j) = journal(100);
        let body = "x".repeat(100); // 25 tokens
        j.append("note", "low priority survives", 5).unwrap();
        for i in 0..4 {
            assert!(j.append("replan", &format!("{}{}", i, &body[1..]), 1).unwrap().is_none());
        }
        let summary = j.append("replan", &format!("4{}", &body[1..]), 1).unwrap().unwrap();
        assert_eq!(summary.removed, 1);
        assert_eq!(summary.tokens_before, 125);
        assert_eq!(summary.tokens_after, 100);

        let entries = j.entries().unwrap();
        let high: Vec<_> = entries.iter().filter(|e| e.priority <= 2).collect();
        assert_eq!(high.len(), 4);
        assert!(high[0].content.starts_with('1'));
        assert_eq!(entries[0].content, "low priority survives");

        let notices: Vec<_> = entries.iter().filter(|e| e.category == PRUNE_CATEGORY).collect();
        assert_eq!(notices.len(), 1);
        assert!(notices[0].priority > 2);
        assert_eq!(entries.last().unwrap().category, PRUNE_CATEGORY);
        assert!(j.high_priority_tokens().unwrap() <= 100);
    }

    #[test]
    fn test_priority_above_threshold_never_counts() {
        let (_dir, j) = journal(10);
        j.append("status", &"y".repeat(400), 3).unwrap();
        assert_eq!(j.entries().unwrap().len(), 1);
        assert_eq!(j.high_priority_tokens().unwrap(), 0);
    }
}
