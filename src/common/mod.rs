//! Shared filesystem and terminal helpers.

pub mod files;
pub mod paths;
pub mod prompt;

pub use files::{touch, write_file_with_dirs};
pub use paths::{ensure_dir_exists, is_dir_empty, relative_path, replace_symlink, safe_symlink};
pub use prompt::ReusePolicy;
