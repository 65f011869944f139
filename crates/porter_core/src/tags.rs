//! Tag store seam
//!
//! Tag persistence lives outside the engine; the engine only needs to read
//! a leaf's tags and mirror them across a transfer.

use dashmap::DashMap;
use porter_fs::FileId;

pub type TagId = String;

/// External tag store collaborator
pub trait TagStore: Send + Sync {
    /// Tags currently attached to a file.
    fn tags_of(&self, file: &FileId) -> Vec<TagId>;

    /// Attach tags to the given files.
    fn add_tags(&self, files: &[FileId], tags: &[TagId]);

    /// Detach tags from the given files.
    fn remove_tags(&self, files: &[FileId], tags: &[TagId]);
}

/// In-memory tag store; the default when no external store is wired, and
/// what the engine tests run against.
#[derive(Debug, Default)]
pub struct MemoryTagStore {
    tags: DashMap<FileId, Vec<TagId>>,
}

impl MemoryTagStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl TagStore for MemoryTagStore {
    fn tags_of(&self, file: &FileId) -> Vec<TagId> {
        self.tags.get(file).map(|v| v.clone()).unwrap_or_default()
    }

    fn add_tags(&self, files: &[FileId], tags: &[TagId]) {
        for file in files {
            let mut entry = self.tags.entry(file.clone()).or_default();
            for tag in tags {
                if !entry.contains(tag) {
                    entry.push(tag.clone());
                }
            }
        }
    }

    fn remove_tags(&self, files: &[FileId], tags: &[TagId]) {
        for file in files {
            if let Some(mut entry) = self.tags.get_mut(file) {
                entry.retain(|t| !tags.contains(t));
            }
        }
    }
}
