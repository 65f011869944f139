//! Recursive tree resolution
//!
//! Expands a file-system subtree into a flat map of leaf files, fanning out
//! concurrently over directory children. Used for total-size computation and
//! tag propagation.

use crate::error::{EngineError, Result};
use futures::future::BoxFuture;
use porter_fs::{FileEntry, FileId, FsProvider};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::task::JoinSet;

/// Flat map of leaf files; directories are expanded away and never appear
/// as keys.
pub type FileTreeMap = HashMap<FileId, FileEntry>;

/// Resolve a subtree into its leaf files.
///
/// Non-directories (including symbolic links, which are not followed into)
/// map to themselves. Any stat or listing failure inside the tree aborts the
/// whole call with [`EngineError::Resolution`]; sibling trees resolved by
/// other callers are unaffected.
pub async fn resolve_deep(provider: Arc<dyn FsProvider>, root: FileEntry) -> Result<FileTreeMap> {
    resolve_inner(provider, root).await
}

fn resolve_inner(
    provider: Arc<dyn FsProvider>,
    entry: FileEntry,
) -> BoxFuture<'static, Result<FileTreeMap>> {
    Box::pin(async move {
        if !entry.is_directory() {
            let mut map = FileTreeMap::new();
            map.insert(entry.id.clone(), entry);
            return Ok(map);
        }

        let (_, children) = provider
            .resolve_with_children(&entry.path)
            .await
            .map_err(|e| EngineError::Resolution(e.to_string()))?;

        let mut set = JoinSet::new();
        for child in children {
            set.spawn(resolve_inner(provider.clone(), child));
        }

        let mut merged = FileTreeMap::new();
        while let Some(joined) = set.join_next().await {
            // Dropping the set on the first error aborts still-running
            // siblings; their partial results are discarded.
            let sub = joined.map_err(|e| EngineError::Resolution(e.to_string()))??;
            merged.extend(sub);
        }
        Ok(merged)
    })
}

/// Sum of all leaf sizes in a resolved tree.
pub fn total_size(tree: &FileTreeMap) -> u64 {
    tree.values().filter_map(|e| e.size).sum()
}
