//! 沙箱工作区
//!
//! Workspace 绑定唯一根目录，所有操作先经 safe_path 校验（禁止 ../、绝对路径、符号链接逃逸）；
//! 删除不销毁文件，而是移入 `.trash/`，重名时追加时间戳与计数器，绝不覆盖已有回收项。

use std::fs;
use std::path::{Component, Path, PathBuf};

use walkdir::WalkDir;

use crate::core::WorkspaceError;
use crate::workspace::edit::{self, BatchReport, EditSuggestion, LineEdit};

/// 回收站目录名（位于工作区根下）
pub const TRASH_DIR: &str = ".trash";
/// 默认状态目录名（记忆日志、偏好设置）
pub const DEFAULT_STATE_DIR: &str = ".maestro";

/// 沙箱工作区：无内部锁，只允许编排器工作线程修改
#[derive(Debug, Clone)]
pub struct Workspace {
    root: PathBuf,
    state_dir: PathBuf,
}

impl Workspace {
    /// 打开（必要时创建）工作区根目录，并规范化为绝对路径
    pub fn open(root: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        let root = root.as_ref();
        fs::create_dir_all(root).map_err(|e| WorkspaceError::io(root, e))?;
        let root = root.canonicalize().map_err(|e| WorkspaceError::io(root, e))?;
        let state_dir = root.join(DEFAULT_STATE_DIR);
        Ok(Self { root, state_dir })
    }

    /// 自定义状态目录（相对根目录）；必须位于根目录之下，且不能是根或回收站本身
    pub fn with_state_dir(mut self, name: &str) -> Result<Self, WorkspaceError> {
        let dir = self.safe_path(name)?;
        if dir == self.root || dir == self.trash_dir() {
            return Err(WorkspaceError::InvalidTarget(name.to_string()));
        }
        self.state_dir = dir;
        Ok(self)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn trash_dir(&self) -> PathBuf {
        self.root.join(TRASH_DIR)
    }

    pub fn state_dir(&self) -> &Path {
        &self.state_dir
    }

    /// 解析候选路径：逐段折叠 `.`/`..` 并解析符号链接，结果必须位于根目录之下（含根本身）
    pub fn safe_path(&self, candidate: &str) -> Result<PathBuf, WorkspaceError> {
        let raw = Path::new(candidate.trim());
        let mut resolved = if raw.is_absolute() {
            PathBuf::new()
        } else {
            self.root.clone()
        };
        for comp in raw.components() {
            match comp {
                Component::Prefix(_) | Component::RootDir => resolved.push(comp.as_os_str()),
                Component::CurDir => {}
                Component::ParentDir => {
                    resolved.pop();
                }
                Component::Normal(part) => {
                    resolved.push(part);
                    let is_link = fs::symlink_metadata(&resolved)
                        .map(|m| m.file_type().is_symlink())
                        .unwrap_or(false);
                    if is_link {
                        // 断链也按逃逸处理
                        resolved = resolved
                            .canonicalize()
                            .map_err(|_| WorkspaceError::PathEscape(candidate.to_string()))?;
                    }
                }
            }
        }
        if resolved.starts_with(&self.root) {
            Ok(resolved)
        } else {
            Err(WorkspaceError::PathEscape(candidate.to_string()))
        }
    }

    /// 绝对路径转为相对根目录的展示形式（`/` 分隔）
    pub fn relative(&self, path: &Path) -> String {
        let rel = path.strip_prefix(&self.root).unwrap_or(path);
        let parts: Vec<String> = rel
            .components()
            .map(|c| c.as_os_str().to_string_lossy().to_string())
            .collect();
        if parts.is_empty() {
            ".".to_string()
        } else {
            parts.join("/")
        }
    }

    fn is_internal(&self, path: &Path) -> bool {
        path == self.trash_dir() || path == self.state_dir
    }

    fn ensure_parent(&self, target: &Path) -> Result<(), WorkspaceError> {
        if let Some(parent) = target.parent() {
            fs::create_dir_all(parent).map_err(|e| WorkspaceError::io(parent, e))?;
        }
        Ok(())
    }

    /// 目标不能是根目录或已存在的目录
    fn file_target(&self, path: &str) -> Result<PathBuf, WorkspaceError> {
        let target = self.safe_path(path)?;
        if target == self.root || target.is_dir() {
            return Err(WorkspaceError::InvalidTarget(path.to_string()));
        }
        Ok(target)
    }

    pub fn exists(&self, path: &str) -> bool {
        self.safe_path(path)
            .map(|p| fs::symlink_metadata(p).is_ok())
            .unwrap_or(false)
    }

    pub fn read_bytes(&self, path: &str) -> Result<Vec<u8>, WorkspaceError> {
        let target = self.safe_path(path)?;
        if !target.is_file() {
            return Err(WorkspaceError::NotFound(path.to_string()));
        }
        fs::read(&target).map_err(|e| WorkspaceError::io(target, e))
    }

    pub fn read_text(&self, path: &str) -> Result<String, WorkspaceError> {
        let bytes = self.read_bytes(path)?;
        String::from_utf8(bytes).map_err(|_| WorkspaceError::Decode(path.to_string()))
    }

    /// 新建文件；已存在则报错
    pub fn create_file(&self, path: &str, content: &str) -> Result<PathBuf, WorkspaceError> {
        let target = self.file_target(path)?;
        if fs::symlink_metadata(&target).is_ok() {
            return Err(WorkspaceError::AlreadyExists(path.to_string()));
        }
        self.ensure_parent(&target)?;
        fs::write(&target, content).map_err(|e| WorkspaceError::io(&target, e))?;
        Ok(target)
    }

    /// 新建或覆盖文件
    pub fn write_file(&self, path: &str, content: &str) -> Result<PathBuf, WorkspaceError> {
        self.write_bytes(path, content.as_bytes())
    }

    pub fn write_bytes(&self, path: &str, bytes: &[u8]) -> Result<PathBuf, WorkspaceError> {
        let target = self.file_target(path)?;
        self.ensure_parent(&target)?;
        fs::write(&target, bytes).map_err(|e| WorkspaceError::io(&target, e))?;
        Ok(target)
    }

    /// 移入回收站，返回回收站中的最终路径
    pub fn delete(&self, path: &str) -> Result<PathBuf, WorkspaceError> {
        let target = self.safe_path(path)?;
        let trash = self.trash_dir();
        if target == self.root || target == trash {
            return Err(WorkspaceError::InvalidTarget(path.to_string()));
        }
        if fs::symlink_metadata(&target).is_err() {
            return Err(WorkspaceError::NotFound(path.to_string()));
        }
        fs::create_dir_all(&trash).map_err(|e| WorkspaceError::io(&trash, e))?;

        let name = target
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .ok_or_else(|| WorkspaceError::InvalidTarget(path.to_string()))?;
        let dest = unique_trash_name(&trash, &name);
        fs::rename(&target, &dest).map_err(|e| WorkspaceError::io(&target, e))?;
        tracing::info!(path = %path, trashed = %dest.display(), "moved to trash");
        Ok(dest)
    }

    /// 工作区内移动/重命名
    pub fn rename(&self, from: &str, to: &str) -> Result<PathBuf, WorkspaceError> {
        let src = self.safe_path(from)?;
        if src == self.root || fs::symlink_metadata(&src).is_err() {
            return Err(WorkspaceError::NotFound(from.to_string()));
        }
        let dst = self
            .safe_path(to)
            .map_err(|_| WorkspaceError::InvalidTarget(to.to_string()))?;
        if dst == self.root || dst.starts_with(&src) || fs::symlink_metadata(&dst).is_ok() {
            return Err(WorkspaceError::InvalidTarget(to.to_string()));
        }
        self.ensure_parent(&dst)?;
        fs::rename(&src, &dst).map_err(|e| WorkspaceError::io(&src, e))?;
        Ok(dst)
    }

    /// 列出目录：相对 path 的路径，目录以 `/` 结尾，字典序排序；recursive 时遍历整棵子树
    pub fn list_directory(&self, path: &str, recursive: bool) -> Result<Vec<String>, WorkspaceError> {
        let base = self.safe_path(path)?;
        let meta = fs::metadata(&base).map_err(|_| WorkspaceError::NotFound(path.to_string()))?;
        if !meta.is_dir() {
            return Err(WorkspaceError::NotADirectory(path.to_string()));
        }

        let mut entries = Vec::new();
        let max_depth = if recursive { usize::MAX } else { 1 };
        let walker = WalkDir::new(&base)
            .min_depth(1)
            .max_depth(max_depth)
            .into_iter()
            .filter_entry(|e| !self.is_internal(e.path()));
        for entry in walker {
            let entry = entry.map_err(|e| {
                let p = e.path().map(Path::to_path_buf).unwrap_or_else(|| base.clone());
                WorkspaceError::io(p, std::io::Error::other(e.to_string()))
            })?;
            let rel = entry.path().strip_prefix(&base).unwrap_or(entry.path());
            let mut name = rel
                .components()
                .map(|c| c.as_os_str().to_string_lossy().to_string())
                .collect::<Vec<_>>()
                .join("/");
            if entry.file_type().is_dir() {
                name.push('/');
            }
            entries.push(name);
        }
        entries.sort();
        Ok(entries)
    }

    /// 精确子串全部替换，返回出现次数；未出现时不写文件、返回 0
    pub fn replace_snippet(&self, path: &str, old: &str, new: &str) -> Result<usize, WorkspaceError> {
        if old.is_empty() {
            return Err(WorkspaceError::EmptySnippet(path.to_string()));
        }
        let content = self.read_text(path)?;
        let count = content.matches(old).count();
        if count == 0 {
            return Ok(0);
        }
        self.write_file(path, &content.replace(old, new))?;
        Ok(count)
    }

    /// 行级编辑，语义见 `workspace::edit`
    pub fn edit_lines(
        &self,
        path: &str,
        start: usize,
        end: usize,
        new_text: &str,
    ) -> Result<LineEdit, WorkspaceError> {
        let content = self.read_text(path)?;
        let (updated, edit) =
            edit::edit_text_lines(&content, start, end, new_text).map_err(|e| {
                WorkspaceError::LineRange {
                    path: path.to_string(),
                    start: e.start,
                    end: e.end,
                    line_count: e.line_count,
                }
            })?;
        self.write_file(path, &updated)?;
        Ok(edit)
    }

    /// 一次性应用一组编辑建议（自底向上），只写一次文件
    pub fn apply_edit_batch(
        &self,
        path: &str,
        edits: &[EditSuggestion],
    ) -> Result<BatchReport, WorkspaceError> {
        let content = self.read_text(path)?;
        let (updated, report) = edit::apply_edit_batch(&content, edits);
        if report.applied > 0 {
            self.write_file(path, &updated)?;
        }
        Ok(report)
    }
}

/// 在回收站中为 name 找一个不冲突的名字：name、stem_时间戳_1.ext、stem_时间戳_2.ext ...
fn unique_trash_name(trash: &Path, name: &str) -> PathBuf {
    let first = trash.join(name);
    if fs::symlink_metadata(&first).is_err() {
        return first;
    }
    let as_path = Path::new(name);
    let stem = as_path
        .file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| name.to_string());
    let ext = as_path
        .extension()
        .map(|e| format!(".{}", e.to_string_lossy()))
        .unwrap_or_default();
    let stamp = chrono::Local::now().format("%Y%m%d%H%M%S");
    let mut counter = 1u32;
    loop {
        let candidate = trash.join(format!("{}_{}_{}{}", stem, stamp, counter, ext));
        if fs::symlink_metadata(&candidate).is_err() {
            return candidate;
        }
        counter += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn workspace() -> (TempDir, Workspace) {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::open(dir.path()).unwrap();
        (dir, ws)
    }

    #[test]
    fn test_safe_path_rejects_escape() {
        let (_dir, ws) = workspace();
        assert!(matches!(ws.safe_path("../outside.txt"), Err(WorkspaceError::PathEscape(_))));
        assert!(matches!(ws.safe_path("a/../../x"), Err(WorkspaceError::PathEscape(_))));
        assert!(ws.safe_path("/etc/passwd").is_err());
    }

    #[test]
    fn test_state_dir_must_stay_inside_root() {
        let (_dir, ws) = workspace();
        assert!(matches!(
            ws.clone().with_state_dir("../x"),
            Err(WorkspaceError::PathEscape(_))
        ));
        assert!(matches!(ws.clone().with_state_dir("."), Err(WorkspaceError::InvalidTarget(_))));
        assert!(matches!(
            ws.clone().with_state_dir(".trash"),
            Err(WorkspaceError::InvalidTarget(_))
        ));
        let ws = ws.with_state_dir("meta/state").unwrap();
        assert_eq!(ws.state_dir(), ws.root().join("meta").join("state"));
    }

    #[test]
    fn test_safe_path_accepts_descendants() {
        let (_dir, ws) = workspace();
        let p = ws.safe_path("src/deep/nested/file.rs").unwrap();
        assert!(p.starts_with(ws.root()));
        assert_eq!(ws.safe_path("a/./b/../c.txt").unwrap(), ws.root().join("a").join("c.txt"));
        let abs = ws.root().join("inside.txt");
        assert_eq!(ws.safe_path(abs.to_str().unwrap()).unwrap(), abs);
        assert_eq!(ws.safe_path("").unwrap(), ws.root());
    }

    #[cfg(unix)]
    #[test]
    fn test_safe_path_rejects_symlink_escape() {
        let (_dir, ws) = workspace();
        let outside = TempDir::new().unwrap();
        std::os::unix::fs::symlink(outside.path(), ws.root().join("link")).unwrap();
        assert!(matches!(ws.safe_path("link/secret.txt"), Err(WorkspaceError::PathEscape(_))));
    }

    #[test]
    fn test_create_fails_when_exists() {
        let (_dir, ws) = workspace();
        ws.create_file("a.txt", "one").unwrap();
        assert!(matches!(ws.create_file("a.txt", "two"), Err(WorkspaceError::AlreadyExists(_))));
        ws.write_file("a.txt", "two").unwrap();
        assert_eq!(ws.read_text("a.txt").unwrap(), "two");
    }

    #[test]
    fn test_delete_moves_to_trash_without_overwrite() {
        let (_dir, ws) = workspace();
        ws.write_file("a/notes.txt", "first").unwrap();
        let first = ws.delete("a/notes.txt").unwrap();
        ws.write_file("b/notes.txt", "second").unwrap();
        let second = ws.delete("b/notes.txt").unwrap();

        assert_ne!(first, second);
        assert_eq!(std::fs::read_to_string(&first).unwrap(), "first");
        assert_eq!(std::fs::read_to_string(&second).unwrap(), "second");
        assert!(!ws.list_directory("a", false).unwrap().contains(&"notes.txt".to_string()));
        assert!(matches!(ws.delete("a/notes.txt"), Err(WorkspaceError::NotFound(_))));
    }

    #[test]
    fn test_delete_refuses_root() {
        let (_dir, ws) = workspace();
        assert!(matches!(ws.delete("."), Err(WorkspaceError::InvalidTarget(_))));
    }

    #[test]
    fn test_rename_errors() {
        let (_dir, ws) = workspace();
        assert!(matches!(ws.rename("missing.txt", "b.txt"), Err(WorkspaceError::NotFound(_))));
        ws.write_file("a.txt", "x").unwrap();
        assert!(matches!(ws.rename("a.txt", "../b.txt"), Err(WorkspaceError::InvalidTarget(_))));
        ws.rename("a.txt", "dir/b.txt").unwrap();
        assert_eq!(ws.read_text("dir/b.txt").unwrap(), "x");
    }

    #[test]
    fn test_list_directory_sorted_and_hides_trash() {
        let (_dir, ws) = workspace();
        ws.write_file("b.txt", "").unwrap();
        ws.write_file("a/inner.txt", "").unwrap();
        ws.write_file("gone.txt", "").unwrap();
        ws.delete("gone.txt").unwrap();

        assert_eq!(ws.list_directory(".", false).unwrap(), vec!["a/", "b.txt"]);
        assert_eq!(
            ws.list_directory("", true).unwrap(),
            vec!["a/", "a/inner.txt", "b.txt"]
        );
        assert!(matches!(ws.list_directory("b.txt", false), Err(WorkspaceError::NotADirectory(_))));
    }

    #[test]
    fn test_replace_snippet_counts_and_noop() {
        let (_dir, ws) = workspace();
        ws.write_file("f.txt", "aaa foo bar foo").unwrap();
        assert_eq!(ws.replace_snippet("f.txt", "foo", "baz").unwrap(), 2);
        assert_eq!(ws.read_text("f.txt").unwrap(), "aaa baz bar baz");
        assert_eq!(ws.replace_snippet("f.txt", "aa", "b").unwrap(), 1);
        assert_eq!(ws.read_text("f.txt").unwrap(), "ba baz bar baz");

        let before = std::fs::metadata(ws.root().join("f.txt")).unwrap().modified().unwrap();
        assert_eq!(ws.replace_snippet("f.txt", "missing", "x").unwrap(), 0);
        let after = std::fs::metadata(ws.root().join("f.txt")).unwrap().modified().unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn test_replace_snippet_rejects_binary() {
        let (_dir, ws) = workspace();
        ws.write_bytes("img.bin", &[0xff, 0xfe, 0x00]).unwrap();
        assert!(matches!(ws.replace_snippet("img.bin", "a", "b"), Err(WorkspaceError::Decode(_))));
    }

    #[test]
    fn test_edit_lines_on_disk() {
        let (_dir, ws) = workspace();
        ws.write_file("five.txt", "1\n2\n3\n4\n5\n").unwrap();
        ws.edit_lines("five.txt", 3, 3, "").unwrap();
        assert_eq!(ws.read_text("five.txt").unwrap(), "1\n2\n4\n5\n");
        let err = ws.edit_lines("five.txt", 2, 9, "x").unwrap_err();
        assert!(matches!(err, WorkspaceError::LineRange { line_count: 4, .. }));
    }
}
