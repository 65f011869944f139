//! Local-disk provider with chunked, progress-reporting transfers

use crate::{FileEntry, FsError, FsProvider, ProgressFn, Result};
use async_trait::async_trait;
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};

const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Local file system provider
#[derive(Debug, Clone)]
pub struct LocalFs {
    chunk_size: usize,
}

impl LocalFs {
    pub fn new() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
        }
    }

    pub fn with_chunk_size(chunk_size: usize) -> Self {
        Self {
            chunk_size: chunk_size.max(4096),
        }
    }
}

impl Default for LocalFs {
    fn default() -> Self {
        Self::new()
    }
}

async fn run_blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| FsError::Io(std::io::Error::other(e)))?
}

#[async_trait]
impl FsProvider for LocalFs {
    async fn resolve(&self, path: &Path) -> Result<FileEntry> {
        let path = path.to_path_buf();
        run_blocking(move || FileEntry::from_path(&path)).await
    }

    async fn resolve_with_children(&self, path: &Path) -> Result<(FileEntry, Vec<FileEntry>)> {
        let path = path.to_path_buf();
        run_blocking(move || {
            let entry = FileEntry::from_path(&path)?;
            if !entry.is_directory() {
                return Err(FsError::InvalidPath(format!(
                    "Not a directory: {}",
                    path.display()
                )));
            }

            let mut children = Vec::new();
            for child in fs::read_dir(&path)? {
                let child = child?;
                // A child vanishing between readdir and stat is an error the
                // caller decides how to handle, not something to paper over.
                children.push(FileEntry::from_path(child.path())?);
            }
            Ok((entry, children))
        })
        .await
    }

    async fn copy(
        &self,
        src: &Path,
        dst: &Path,
        overwrite: bool,
        progress: ProgressFn,
    ) -> Result<()> {
        let src = src.to_path_buf();
        let dst = dst.to_path_buf();
        let chunk_size = self.chunk_size;
        run_blocking(move || {
            if !src.exists() {
                return Err(FsError::NotFound(src));
            }
            if !overwrite && dst.exists() {
                return Err(FsError::AlreadyExists(dst));
            }

            if src.is_dir() {
                copy_dir_recursive(&src, &dst, chunk_size, &progress)?;
            } else {
                copy_file_chunked(&src, &dst, chunk_size, &progress)?;
            }
            tracing::debug!("Copied: {} -> {}", src.display(), dst.display());
            Ok(())
        })
        .await
    }

    async fn move_entry(
        &self,
        src: &Path,
        dst: &Path,
        overwrite: bool,
        progress: ProgressFn,
    ) -> Result<()> {
        let src = src.to_path_buf();
        let dst = dst.to_path_buf();
        let chunk_size = self.chunk_size;
        run_blocking(move || {
            if !src.exists() {
                return Err(FsError::NotFound(src));
            }
            if !overwrite && dst.exists() {
                return Err(FsError::AlreadyExists(dst));
            }

            // Try rename first (fast, same filesystem)
            match fs::rename(&src, &dst) {
                Ok(()) => {
                    tracing::debug!("Moved: {} -> {}", src.display(), dst.display());
                    Ok(())
                }
                Err(e) => {
                    // Unix: EXDEV = 18, Windows: ERROR_NOT_SAME_DEVICE = 17
                    let is_cross_device = match e.raw_os_error() {
                        Some(18) => cfg!(unix),
                        Some(17) => cfg!(windows),
                        _ => false,
                    };

                    if !is_cross_device {
                        return Err(e.into());
                    }

                    tracing::info!(
                        "Cross-filesystem move, using copy+delete: {} -> {}",
                        src.display(),
                        dst.display()
                    );
                    if src.is_dir() {
                        copy_dir_recursive(&src, &dst, chunk_size, &progress)?;
                        fs::remove_dir_all(&src)?;
                    } else {
                        copy_file_chunked(&src, &dst, chunk_size, &progress)?;
                        fs::remove_file(&src)?;
                    }
                    Ok(())
                }
            }
        })
        .await
    }

    async fn delete(&self, path: &Path, use_trash: bool, recursive: bool) -> Result<()> {
        let path = path.to_path_buf();
        run_blocking(move || {
            if !path.exists() {
                return Err(FsError::NotFound(path));
            }

            if use_trash {
                trash::delete(&path)?;
                tracing::info!("Moved to trash: {}", path.display());
            } else {
                if path.is_dir() {
                    if recursive {
                        fs::remove_dir_all(&path)?;
                    } else {
                        fs::remove_dir(&path)?;
                    }
                } else {
                    fs::remove_file(&path)?;
                }
                tracing::warn!("Permanently deleted: {}", path.display());
            }
            Ok(())
        })
        .await
    }

    async fn create_folder(&self, path: &Path) -> Result<FileEntry> {
        let path = path.to_path_buf();
        run_blocking(move || {
            if path.exists() {
                return Err(FsError::AlreadyExists(path));
            }
            fs::create_dir_all(&path)?;
            tracing::info!("Created directory: {}", path.display());
            FileEntry::from_path(&path)
        })
        .await
    }
}

/// Copy one file in chunks, reporting each chunk's byte count.
fn copy_file_chunked(
    src: &Path,
    dst: &Path,
    chunk_size: usize,
    progress: &ProgressFn,
) -> Result<()> {
    let mut reader = fs::File::open(src)?;
    let mut writer = fs::File::create(dst)?;
    let mut buf = vec![0u8; chunk_size];

    loop {
        let n = reader.read(&mut buf)?;
        if n == 0 {
            break;
        }
        writer.write_all(&buf[..n])?;
        progress(n as u64);
    }

    writer.flush()?;
    Ok(())
}

/// Recursively copy a directory, chunk-reporting every contained file.
fn copy_dir_recursive(
    src: &Path,
    dst: &Path,
    chunk_size: usize,
    progress: &ProgressFn,
) -> Result<()> {
    if !dst.exists() {
        fs::create_dir_all(dst)?;
    }

    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let src_path = entry.path();
        let dst_path = dst.join(entry.file_name());

        if src_path.is_dir() {
            copy_dir_recursive(&src_path, &dst_path, chunk_size, progress)?;
        } else {
            copy_file_chunked(&src_path, &dst_path, chunk_size, progress)?;
        }
    }

    Ok(())
}
