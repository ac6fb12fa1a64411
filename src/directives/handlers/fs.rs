//! 文件类指令：create / write / delete / rename / list_directory / replace_snippet / edit_lines

use async_trait::async_trait;

use crate::core::DirectiveError;
use crate::directives::registry::{Args, DirectiveContext, DirectiveHandler};
use crate::directives::DirectiveEvent;
use crate::workspace::ChangeAction;

/// `create(path, content)`：新建文件，已存在则失败
pub struct CreateFile;

#[async_trait]
impl DirectiveHandler for CreateFile {
    fn name(&self) -> &str {
        "create"
    }

    fn description(&self) -> &str {
        "create(path, content): create a new file; fails if it already exists"
    }

    async fn execute(
        &self,
        args: &Args<'_>,
        ctx: &mut DirectiveContext<'_>,
    ) -> Result<Vec<DirectiveEvent>, DirectiveError> {
        args.expect_count(2, 2)?;
        let abs = ctx.workspace.create_file(args.text(0)?, args.text(1)?)?;
        let rel = ctx.workspace.relative(&abs);
        ctx.state.record_change(ChangeAction::Created, rel.clone(), None);
        Ok(vec![DirectiveEvent::file_changed(rel)])
    }
}

/// `write(path, content)`：新建或覆盖
pub struct WriteFile;

#[async_trait]
impl DirectiveHandler for WriteFile {
    fn name(&self) -> &str {
        "write"
    }

    fn description(&self) -> &str {
        "write(path, content): create or overwrite a file"
    }

    async fn execute(
        &self,
        args: &Args<'_>,
        ctx: &mut DirectiveContext<'_>,
    ) -> Result<Vec<DirectiveEvent>, DirectiveError> {
        args.expect_count(2, 2)?;
        let path = args.text(0)?;
        let existed = ctx.workspace.exists(path);
        let abs = ctx.workspace.write_file(path, args.text(1)?)?;
        let rel = ctx.workspace.relative(&abs);
        let action = if existed {
            ChangeAction::Written
        } else {
            ChangeAction::Created
        };
        ctx.state.record_change(action, rel.clone(), None);
        Ok(vec![DirectiveEvent::file_changed(rel)])
    }
}

/// `delete(path)`：移入回收站
pub struct DeletePath;

#[async_trait]
impl DirectiveHandler for DeletePath {
    fn name(&self) -> &str {
        "delete"
    }

    fn description(&self) -> &str {
        "delete(path): move a file or directory to the trash"
    }

    async fn execute(
        &self,
        args: &Args<'_>,
        ctx: &mut DirectiveContext<'_>,
    ) -> Result<Vec<DirectiveEvent>, DirectiveError> {
        args.expect_count(1, 1)?;
        let path = args.text(0)?;
        let rel = ctx.workspace.relative(&ctx.workspace.safe_path(path)?);
        let trashed = ctx.workspace.delete(path)?;
        let detail = format!("trashed as {}", ctx.workspace.relative(&trashed));
        ctx.state.record_change(ChangeAction::Deleted, rel.clone(), Some(detail));
        Ok(vec![DirectiveEvent::file_changed(rel)])
    }
}

/// `rename(from, to)`
pub struct RenamePath;

#[async_trait]
impl DirectiveHandler for RenamePath {
    fn name(&self) -> &str {
        "rename"
    }

    fn description(&self) -> &str {
        "rename(from, to): move or rename within the workspace"
    }

    async fn execute(
        &self,
        args: &Args<'_>,
        ctx: &mut DirectiveContext<'_>,
    ) -> Result<Vec<DirectiveEvent>, DirectiveError> {
        args.expect_count(2, 2)?;
        let from = args.text(0)?;
        let from_rel = ctx.workspace.relative(&ctx.workspace.safe_path(from)?);
        let dst = ctx.workspace.rename(from, args.text(1)?)?;
        let to_rel = ctx.workspace.relative(&dst);
        ctx.state.record_change(
            ChangeAction::Renamed,
            from_rel.clone(),
            Some(format!("to {}", to_rel)),
        );
        Ok(vec![
            DirectiveEvent::file_changed(from_rel),
            DirectiveEvent::file_changed(to_rel),
        ])
    }
}

/// `list_directory(path=".", recursive=false)`
pub struct ListDirectory;

#[async_trait]
impl DirectiveHandler for ListDirectory {
    fn name(&self) -> &str {
        "list_directory"
    }

    fn description(&self) -> &str {
        "list_directory(path=\".\", recursive=false): list entries, directories end with '/'"
    }

    async fn execute(
        &self,
        args: &Args<'_>,
        ctx: &mut DirectiveContext<'_>,
    ) -> Result<Vec<DirectiveEvent>, DirectiveError> {
        args.expect_count(0, 2)?;
        let path = args.text_or(0, ".")?;
        let recursive = args.flag_or(1, false)?;
        let entries = ctx.workspace.list_directory(path, recursive)?;
        let body = if entries.is_empty() {
            "(empty)".to_string()
        } else {
            entries.join("\n")
        };
        Ok(vec![DirectiveEvent::status(format!("Contents of {}:\n{}", path, body))])
    }
}

/// `replace_snippet(path, old, new)`：替换全部出现；找不到不算错误
pub struct ReplaceSnippet;

#[async_trait]
impl DirectiveHandler for ReplaceSnippet {
    fn name(&self) -> &str {
        "replace_snippet"
    }

    fn description(&self) -> &str {
        "replace_snippet(path, old, new): replace every occurrence of old with new"
    }

    async fn execute(
        &self,
        args: &Args<'_>,
        ctx: &mut DirectiveContext<'_>,
    ) -> Result<Vec<DirectiveEvent>, DirectiveError> {
        args.expect_count(3, 3)?;
        let path = args.text(0)?;
        let count = ctx
            .workspace
            .replace_snippet(path, args.text(1)?, args.text(2)?)?;
        if count == 0 {
            return Ok(vec![DirectiveEvent::status(format!(
                "Snippet not found in {}; nothing replaced",
                path
            ))]);
        }
        let rel = ctx.workspace.relative(&ctx.workspace.safe_path(path)?);
        ctx.state.record_change(
            ChangeAction::Edited,
            rel.clone(),
            Some(format!("{} replacement(s)", count)),
        );
        Ok(vec![
            DirectiveEvent::status(format!("Replaced {} occurrence(s) in {}", count, rel)),
            DirectiveEvent::file_changed(rel),
        ])
    }
}

/// `edit_lines(path, start, end, new_text)`：1 起始闭区间
pub struct EditLines;

#[async_trait]
impl DirectiveHandler for EditLines {
    fn name(&self) -> &str {
        "edit_lines"
    }

    fn description(&self) -> &str {
        "edit_lines(path, start, end, new_text): replace, insert (end < start) or delete (empty text) lines, 1-based inclusive"
    }

    async fn execute(
        &self,
        args: &Args<'_>,
        ctx: &mut DirectiveContext<'_>,
    ) -> Result<Vec<DirectiveEvent>, DirectiveError> {
        args.expect_count(4, 4)?;
        let path = args.text(0)?;
        let start = args.index(1)?;
        let end = args.index(2)?;
        let edit = ctx.workspace.edit_lines(path, start, end, args.text(3)?)?;
        let rel = ctx.workspace.relative(&ctx.workspace.safe_path(path)?);
        ctx.state.record_change(
            ChangeAction::Edited,
            rel.clone(),
            Some(format!(
                "{:?} lines {}-{} ({} -> {} lines)",
                edit.kind, start, end, edit.lines_before, edit.lines_after
            )),
        );
        Ok(vec![DirectiveEvent::file_changed(rel)])
    }
}
