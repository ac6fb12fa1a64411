//! 内置指令处理器

pub mod fs;
pub mod image;
pub mod preference;
pub mod process;

pub use fs::{CreateFile, DeletePath, EditLines, ListDirectory, RenamePath, ReplaceSnippet, WriteFile};
pub use image::GenerateImage;
pub use preference::{GetPreference, SetPreference};
pub use process::RunCommand;
