//! Async provider trait for file-system operations

use crate::{FileEntry, Result};
use async_trait::async_trait;
use std::path::Path;
use std::sync::Arc;

/// Byte-progress callback: invoked with an *incremental* byte count each
/// time the underlying operation advances. May be called from a blocking
/// worker thread.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// File-system provider seam
///
/// Every method is a suspension point; implementations run blocking disk
/// work off the async executor.
#[async_trait]
pub trait FsProvider: Send + Sync {
    /// Stat a single path.
    async fn resolve(&self, path: &Path) -> Result<FileEntry>;

    /// Stat a directory and list its direct children.
    async fn resolve_with_children(&self, path: &Path) -> Result<(FileEntry, Vec<FileEntry>)>;

    /// Copy a file or directory tree. Progress reports incremental bytes
    /// written.
    async fn copy(
        &self,
        src: &Path,
        dst: &Path,
        overwrite: bool,
        progress: ProgressFn,
    ) -> Result<()>;

    /// Move a file or directory tree. A same-device rename reports no byte
    /// progress (the caller tops up from the known subtree size); the
    /// cross-device copy+delete fallback reports like `copy`.
    async fn move_entry(
        &self,
        src: &Path,
        dst: &Path,
        overwrite: bool,
        progress: ProgressFn,
    ) -> Result<()>;

    /// Delete a file or directory, to the trash or permanently.
    async fn delete(&self, path: &Path, use_trash: bool, recursive: bool) -> Result<()>;

    /// Create a directory (and missing parents).
    async fn create_folder(&self, path: &Path) -> Result<FileEntry>;
}
