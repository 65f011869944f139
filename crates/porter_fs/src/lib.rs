//! FilePorter File System Abstraction Layer
//!
//! Provides the file-system seam the transfer engine runs against:
//! - FileEntry/FileId: normalized-path identity and metadata
//! - FsProvider: async provider trait (resolve, copy, move, delete)
//! - LocalFs: local-disk implementation with byte-level progress reporting

mod entry;
mod local;
mod provider;

pub use entry::{is_same_or_descendant, normalize_path, FileEntry, FileId, FileKind};
pub use local::LocalFs;
pub use provider::{FsProvider, ProgressFn};

use std::path::PathBuf;
use thiserror::Error;

/// File system errors
#[derive(Error, Debug)]
pub enum FsError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Path not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("Already exists: {}", .0.display())]
    AlreadyExists(PathBuf),

    #[error("Invalid path: {0}")]
    InvalidPath(String),

    #[error("Trash error: {0}")]
    Trash(#[from] trash::Error),
}

pub type Result<T> = std::result::Result<T, FsError>;
