//! 偏好设置：key → text，持久化为状态目录下的 JSON 文件

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use crate::core::WorkspaceError;
use crate::workspace::Workspace;

pub const PREFERENCES_FILE: &str = "preferences.json";

#[derive(Debug, Clone)]
pub struct PreferenceStore {
    path: PathBuf,
}

impl PreferenceStore {
    pub fn open(workspace: &Workspace) -> Self {
        Self {
            path: workspace.state_dir().join(PREFERENCES_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> Result<BTreeMap<String, String>, WorkspaceError> {
        let data = match fs::read_to_string(&self.path) {
            Ok(d) => d,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
            Err(e) => return Err(WorkspaceError::io(&self.path, e)),
        };
        serde_json::from_str(&data)
            .map_err(|e| WorkspaceError::Decode(format!("{}: {}", self.path.display(), e)))
    }

    pub fn get(&self, key: &str) -> Result<Option<String>, WorkspaceError> {
        Ok(self.load()?.remove(key))
    }

    pub fn set(&self, key: &str, value: &str) -> Result<(), WorkspaceError> {
        let mut all = self.load()?;
        all.insert(key.to_string(), value.to_string());
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).map_err(|e| WorkspaceError::io(parent, e))?;
        }
        let body = serde_json::to_string_pretty(&all)
            .map_err(|e| WorkspaceError::Decode(e.to_string()))?;
        fs::write(&self.path, body).map_err(|e| WorkspaceError::io(&self.path, e))
    }
}
