//! 产物整理：把落选的图片变体移入回收站

use crate::workspace::{ChangeAction, Workspace, WorkspaceState};

/// 整理结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CurationReport {
    pub trashed: Vec<String>,
    /// 已不存在、无需处理的路径
    pub missing: Vec<String>,
}

/// 逐个移入回收站；单个失败只记日志，不影响其它
pub fn trash_artifacts(
    workspace: &Workspace,
    state: &mut WorkspaceState,
    paths: &[String],
) -> CurationReport {
    let mut report = CurationReport::default();
    for path in paths {
        if !workspace.exists(path) {
            report.missing.push(path.clone());
            continue;
        }
        match workspace.delete(path) {
            Ok(dest) => {
                state.record_change(
                    ChangeAction::Deleted,
                    path.clone(),
                    Some(format!("rejected variant, trashed as {}", workspace.relative(&dest))),
                );
                report.trashed.push(path.clone());
            }
            Err(e) => {
                tracing::warn!(path = %path, error = %e, "failed to trash artifact");
                report.missing.push(path.clone());
            }
        }
    }
    report
}
