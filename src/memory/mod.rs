//! 记忆层：只追加的优先级记忆日志、偏好设置

pub mod journal;
pub mod preferences;

pub use journal::{JournalPolicy, MemoryEntry, MemoryJournal, PruneSummary, PRUNE_CATEGORY};
pub use preferences::{PreferenceStore, PREFERENCES_FILE};
