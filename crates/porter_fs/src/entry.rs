//! File entries and normalized-path identity

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;

use crate::{FsError, Result};

/// Opaque identifier for a file-system resource.
///
/// Derived from the normalized canonical path: stable across metadata-only
/// updates, changes when the resource is moved or renamed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct FileId(String);

impl FileId {
    /// Build an id from any path-like value, normalizing it first.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Self {
        Self(normalize_path(path.as_ref()).to_string_lossy().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The normalized path this id was derived from.
    pub fn to_path(&self) -> PathBuf {
        PathBuf::from(&self.0)
    }
}

impl std::fmt::Display for FileId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Kind of a file-system resource
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FileKind {
    File,
    Directory,
    SymbolicLink,
    Unknown,
}

impl FileKind {
    pub fn is_directory(self) -> bool {
        matches!(self, FileKind::Directory)
    }
}

/// File entry with metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileEntry {
    pub id: FileId,
    pub path: PathBuf,
    pub name: String,
    pub kind: FileKind,
    /// Byte size; always `None` for directories.
    pub size: Option<u64>,
    /// Creation time, seconds since the Unix epoch.
    pub created: Option<i64>,
    /// Modification time, seconds since the Unix epoch.
    pub modified: Option<i64>,
}

impl FileEntry {
    /// Stat a path into an entry. Symlinks are reported as such, not followed.
    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = normalize_path(path.as_ref());

        let metadata = fs::symlink_metadata(&path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FsError::NotFound(path.clone())
            } else {
                FsError::Io(e)
            }
        })?;

        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();

        let file_type = metadata.file_type();
        let kind = if file_type.is_symlink() {
            FileKind::SymbolicLink
        } else if file_type.is_dir() {
            FileKind::Directory
        } else if file_type.is_file() {
            FileKind::File
        } else {
            FileKind::Unknown
        };

        let size = match kind {
            FileKind::Directory => None,
            _ => Some(metadata.len()),
        };

        let created = metadata
            .created()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);

        let modified = metadata
            .modified()
            .ok()
            .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
            .map(|d| d.as_secs() as i64);

        Ok(Self {
            id: FileId::from_path(&path),
            path,
            name,
            kind,
            size,
            created,
            modified,
        })
    }

    pub fn is_directory(&self) -> bool {
        self.kind.is_directory()
    }
}

/// Normalize a path into its canonical form.
///
/// The parent is canonicalized but the final component is kept as written,
/// so a symbolic link keeps its own identity instead of its target's. Paths
/// whose parents do not exist fall back to lexical normalization.
pub fn normalize_path(path: &Path) -> PathBuf {
    if let (Some(parent), Some(name)) = (path.parent(), path.file_name()) {
        let parent = if parent.as_os_str().is_empty() {
            Path::new(".")
        } else {
            parent
        };
        if let Ok(canonical_parent) = parent.canonicalize() {
            return canonical_parent.join(name);
        }
    } else if let Ok(canonical) = path.canonicalize() {
        return canonical;
    }

    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        std::env::current_dir().unwrap_or_default().join(path)
    };

    let mut normalized = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::ParentDir => {
                normalized.pop();
            }
            Component::CurDir => {}
            _ => normalized.push(component),
        }
    }
    normalized
}

/// True if `candidate` equals `base` or lives anywhere below it.
///
/// Pure component comparison on normalized paths; touches no file system.
pub fn is_same_or_descendant(base: &Path, candidate: &Path) -> bool {
    let base = normalize_path(base);
    let candidate = normalize_path(candidate);
    candidate.starts_with(&base)
}
