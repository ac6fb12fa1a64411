//! 行级编辑（纯函数，不触碰文件系统）
//!
//! 行号从 1 开始、闭区间。edit_lines 的三种模式由参数关系决定：
//! - new_text 为空 ⇒ 删除 start..=end
//! - end < start ⇒ 在第 start 行之前插入（end 被忽略）
//! - 其它 ⇒ 用 new_text 的各行替换 start..=end
//!
//! 保留原文件是否以换行结尾的约定。

use serde::{Deserialize, Serialize};

/// 行编辑模式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineEditKind {
    Replace,
    Insert,
    Delete,
}

/// 一次行编辑的结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineEdit {
    pub kind: LineEditKind,
    pub lines_before: usize,
    pub lines_after: usize,
}

/// 批量编辑中的单条建议（kind 显式给出，而非由 start/end 推断）
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EditSuggestion {
    pub start: usize,
    pub end: usize,
    #[serde(default)]
    pub text: String,
    pub kind: LineEditKind,
}

/// 批量编辑结果：已应用与被跳过（越界）的条数
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
    pub applied: usize,
    pub skipped: Vec<(usize, usize)>,
    pub lines_after: usize,
}

/// 越界：(start, end, 当前行数)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RangeError {
    pub start: usize,
    pub end: usize,
    pub line_count: usize,
}

/// 拆分文件内容：返回 (行, 是否以换行结尾)；空文件为零行
pub(crate) fn split_lines(content: &str) -> (Vec<String>, bool) {
    if content.is_empty() {
        return (Vec::new(), false);
    }
    let trailing = content.ends_with('\n');
    let body = if trailing {
        &content[..content.len() - 1]
    } else {
        content
    };
    (body.split('\n').map(str::to_string).collect(), trailing)
}

/// 拆分待插入文本：去掉一个结尾换行，避免多出空行
fn split_new_text(text: &str) -> Vec<String> {
    let body = text.strip_suffix('\n').unwrap_or(text);
    body.split('\n').map(str::to_string).collect()
}

pub(crate) fn join_lines(lines: &[String], trailing: bool) -> String {
    if lines.is_empty() {
        return String::new();
    }
    let mut out = lines.join("\n");
    if trailing {
        out.push('\n');
    }
    out
}

fn check_span(lines: &[String], start: usize, end: usize) -> Result<(), RangeError> {
    let n = lines.len();
    if start >= 1 && start <= end && end <= n {
        Ok(())
    } else {
        Err(RangeError {
            start,
            end,
            line_count: n,
        })
    }
}

fn apply(
    lines: &mut Vec<String>,
    kind: LineEditKind,
    start: usize,
    end: usize,
    text: &str,
) -> Result<(), RangeError> {
    match kind {
        LineEditKind::Delete => {
            check_span(lines, start, end)?;
            lines.drain(start - 1..end);
        }
        LineEditKind::Insert => {
            if start < 1 || start > lines.len() + 1 {
                return Err(RangeError {
                    start,
                    end,
                    line_count: lines.len(),
                });
            }
            let at = start - 1;
            lines.splice(at..at, split_new_text(text));
        }
        LineEditKind::Replace => {
            // 零行文件：允许替换隐含的那一个空行
            if lines.is_empty() && start == 1 && end == 1 {
                *lines = split_new_text(text);
                return Ok(());
            }
            check_span(lines, start, end)?;
            lines.splice(start - 1..end, split_new_text(text));
        }
    }
    Ok(())
}

/// 按 (start, end, new_text) 的关系选择模式
pub fn select_kind(start: usize, end: usize, new_text: &str) -> LineEditKind {
    if new_text.is_empty() {
        LineEditKind::Delete
    } else if end < start {
        LineEditKind::Insert
    } else {
        LineEditKind::Replace
    }
}

/// 对文本执行一次 edit_lines，返回新文本与编辑摘要
pub fn edit_text_lines(
    content: &str,
    start: usize,
    end: usize,
    new_text: &str,
) -> Result<(String, LineEdit), RangeError> {
    let (mut lines, trailing) = split_lines(content);
    let before = lines.len();
    let kind = select_kind(start, end, new_text);
    apply(&mut lines, kind, start, end, new_text)?;
    Ok((
        join_lines(&lines, trailing),
        LineEdit {
            kind,
            lines_before: before,
            lines_after: lines.len(),
        },
    ))
}

/// 批量应用编辑建议：按 start 降序应用，保证靠前的行号不受影响；越界的条目跳过并记录
pub fn apply_edit_batch(content: &str, edits: &[EditSuggestion]) -> (String, BatchReport) {
    let (mut lines, trailing) = split_lines(content);
    let mut ordered: Vec<&EditSuggestion> = edits.iter().collect();
    ordered.sort_by(|a, b| b.start.cmp(&a.start));

    let mut report = BatchReport::default();
    for edit in ordered {
        match apply(&mut lines, edit.kind, edit.start, edit.end, &edit.text) {
            Ok(()) => report.applied += 1,
            Err(e) => {
                tracing::warn!(start = e.start, end = e.end, lines = e.line_count, "skipping out-of-range edit");
                report.skipped.push((edit.start, edit.end));
            }
        }
    }
    report.lines_after = lines.len();
    (join_lines(&lines, trailing), report)
}

#[cfg(test)]
mod tests {
    use super::*;

    const FIVE: &str = "1\n2\n3\n4\n5\n";

    #[test]
    fn test_delete_single_line() {
        let (out, edit) = edit_text_lines(FIVE, 3, 3, "").unwrap();
        assert_eq!(out, "1\n2\n4\n5\n");
        assert_eq!(edit.kind, LineEditKind::Delete);
        assert_eq!(edit.lines_after, 4);
    }

    #[test]
    fn test_insert_before_when_end_precedes_start() {
        let (out, edit) = edit_text_lines(FIVE, 3, 2, "X").unwrap();
        assert_eq!(out, "1\n2\nX\n3\n4\n5\n");
        assert_eq!(edit.kind, LineEditKind::Insert);
        assert_eq!(edit.lines_after, 6);
    }

    #[test]
    fn test_insert_at_end_and_out_of_range() {
        let (out, _) = edit_text_lines(FIVE, 6, 0, "6").unwrap();
        assert_eq!(out, "1\n2\n3\n4\n5\n6\n");
        assert!(edit_text_lines(FIVE, 7, 0, "x").is_err());
        assert!(edit_text_lines(FIVE, 0, 0, "x").is_err());
    }

    #[test]
    fn test_replace_range_with_more_lines() {
        let (out, edit) = edit_text_lines(FIVE, 2, 3, "a\nb\nc").unwrap();
        assert_eq!(out, "1\na\nb\nc\n4\n5\n");
        assert_eq!(edit.kind, LineEditKind::Replace);
    }

    #[test]
    fn test_trailing_newline_preserved_when_absent() {
        let (out, _) = edit_text_lines("a\nb", 2, 2, "B").unwrap();
        assert_eq!(out, "a\nB");
    }

    #[test]
    fn test_replace_empty_file_allowance() {
        let (out, edit) = edit_text_lines("", 1, 1, "hello").unwrap();
        assert_eq!(out, "hello");
        assert_eq!(edit.lines_before, 0);
        assert!(edit_text_lines("", 1, 1, "").is_err());
    }

    #[test]
    fn test_delete_range_validation() {
        assert!(edit_text_lines(FIVE, 4, 6, "").is_err());
        assert!(edit_text_lines(FIVE, 3, 2, "").is_err());
        assert!(edit_text_lines(FIVE, 0, 1, "").is_err());
    }

    #[test]
    fn test_batch_applies_bottom_up_and_skips_invalid() {
        let edits = vec![
            EditSuggestion { start: 1, end: 1, text: "one".into(), kind: LineEditKind::Replace },
            EditSuggestion { start: 4, end: 4, text: String::new(), kind: LineEditKind::Delete },
            EditSuggestion { start: 2, end: 2, text: "1.5".into(), kind: LineEditKind::Insert },
            EditSuggestion { start: 9, end: 9, text: "x".into(), kind: LineEditKind::Replace },
        ];
        let (out, report) = apply_edit_batch(FIVE, &edits);
        assert_eq!(out, "one\n1.5\n2\n3\n5\n");
        assert_eq!(report.applied, 3);
        assert_eq!(report.skipped, vec![(9, 9)]);
        assert_eq!(report.lines_after, 5);
    }
}
