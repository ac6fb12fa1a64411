//! 工作区层：沙箱路径、文件读写、回收站、片段替换、行编辑，以及编排器独占的缓存

pub mod edit;
pub mod state;
pub mod store;

pub use edit::{BatchReport, EditSuggestion, LineEdit, LineEditKind};
pub use state::{ChangeAction, ChangeRecord, FileSnapshot, WorkspaceState};
pub use store::{Workspace, DEFAULT_STATE_DIR, TRASH_DIR};
