//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `MAESTRO__*` 覆盖（双下划线表示嵌套，如 `MAESTRO__GRADING__THRESHOLD=80`）。
//! 所有字段都有默认值，空配置也合法。

use std::path::PathBuf;

use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub orchestrator: OrchestratorSection,
    pub directives: DirectivesSection,
    pub grading: GradingSection,
    pub journal: JournalSection,
}

/// [app] 段：工作区根目录与状态目录
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    /// 沙箱根目录，未设置时用 ./workspace
    pub workspace_root: Option<PathBuf>,
    /// 记忆日志与偏好设置所在目录（相对工作区根）
    pub state_dir: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            workspace_root: None,
            state_dir: crate::workspace::DEFAULT_STATE_DIR.to_string(),
        }
    }
}

/// [orchestrator] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// 单次运行允许的最大重规划次数，超出即 Failed
    pub max_replans: usize,
    /// 规划前是否先让 prompt-refiner 改写请求（需注册该角色）
    pub enhance_requests: bool,
    /// 重规划摘要中携带的近期动作条数
    pub recent_actions_in_digest: usize,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            max_replans: 5,
            enhance_requests: true,
            recent_actions_in_digest: 10,
        }
    }
}

/// [directives] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DirectivesSection {
    /// run 指令的外部进程超时（秒）
    pub run_timeout_secs: u64,
    /// recent changes 保留条数
    pub recent_changes_capacity: usize,
}

impl Default for DirectivesSection {
    fn default() -> Self {
        Self {
            run_timeout_secs: 120,
            recent_changes_capacity: 50,
        }
    }
}

/// [grading] 段
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GradingSection {
    /// 低于该分数触发重试
    pub threshold: u8,
    /// 最多尝试次数（含首次）
    pub max_attempts: u32,
}

impl Default for GradingSection {
    fn default() -> Self {
        Self {
            threshold: 70,
            max_attempts: 3,
        }
    }
}

/// [journal] 段：记忆日志剪枝参数
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct JournalSection {
    pub file_name: String,
    pub token_budget: usize,
    /// priority <= 该值的条目计入预算
    pub high_priority_threshold: u8,
    pub chars_per_token: usize,
}

impl Default for JournalSection {
    fn default() -> Self {
        Self {
            file_name: "memory.log".to_string(),
            token_budget: 10_000,
            high_priority_threshold: 2,
            chars_per_token: 4,
        }
    }
}

/// 从 config 目录加载配置，环境变量 MAESTRO__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 MAESTRO__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("MAESTRO")
            .separator("__")
            .try_parsing(true),
    );

    builder.build()?.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.grading.threshold, 70);
        assert_eq!(cfg.grading.max_attempts, 3);
        assert_eq!(cfg.journal.token_budget, 10_000);
        assert_eq!(cfg.journal.high_priority_threshold, 2);
        assert_eq!(cfg.directives.run_timeout_secs, 120);
        assert_eq!(cfg.app.state_dir, ".maestro");
    }

    #[test]
    fn test_load_from_file_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("custom.toml");
        std::fs::write(&path, "[grading]\nthreshold = 85\n\n[journal]\ntoken_budget = 500\n").unwrap();
        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.grading.threshold, 85);
        assert_eq!(cfg.grading.max_attempts, 3);
        assert_eq!(cfg.journal.token_budget, 500);
    }
}
