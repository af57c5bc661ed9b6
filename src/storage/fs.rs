// VideoCache - Video Download Cache for Mobile Playback
// Copyright (C) 2025 Henning Berge
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.


//! Local file system storage
//!
//! # Key Operations
//! - Root creation (the only fatal error at initialization)
//! - Existence and size checks
//! - Delete (missing files are not an error)
//! - Buffered writers for partial files
//! - Atomic rename of completed downloads and atomic writes of small files

use super::{CacheWriter, OpenMode, StorageBackend, PARTIAL_SUFFIX};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncWriteExt, BufWriter};
use tracing::{debug, warn};

/// Buffer size for partial-file writers
const WRITE_BUFFER_SIZE: usize = 64 * 1024;

/// File system storage rooted at a cache directory
#[derive(Debug, Clone)]
pub struct FsStorage {
    root: PathBuf,
}

impl FsStorage {
    /// Create the storage, creating the root directory if needed
    pub fn new<P: Into<PathBuf>>(root: P) -> Result<Self> {
        let root = root.into();

        std::fs::create_dir_all(&root).map_err(|e| CacheError::StorageRootUnavailable {
            path: root.display().to_string(),
            message: e.to_string(),
        })?;

        if !root.is_dir() {
            return Err(CacheError::StorageRootUnavailable {
                path: root.display().to_string(),
                message: "not a directory".to_string(),
            });
        }

        Ok(Self { root })
    }
}

#[async_trait]
impl StorageBackend for FsStorage {
    fn root(&self) -> &Path {
        &self.root
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn delete(&self, path: &Path) -> bool {
        match std::fs::remove_file(path) {
            Ok(()) => {
                debug!(path = %path.display(), "deleted cache file");
                true
            }
            Err(e) if e.kind() == ErrorKind::NotFound => false,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to delete cache file");
                false
            }
        }
    }

    fn size_of(&self, path: &Path) -> Option<u64> {
        std::fs::metadata(path)
            .ok()
            .filter(|metadata| metadata.is_file())
            .map(|metadata| metadata.len())
    }

    async fn open(&self, path: &Path, mode: OpenMode) -> Result<CacheWriter> {
        let mut options = fs::OpenOptions::new();
        match mode {
            OpenMode::Create => options.write(true).create(true).truncate(true),
            OpenMode::Append => options.create(true).append(true),
        };

        let file = options
            .open(path)
            .await
            .map_err(|e| CacheError::file_io("Failed to open", path, e))?;

        Ok(Box::new(BufWriter::with_capacity(WRITE_BUFFER_SIZE, file)))
    }

    fn finalize(&self, partial: &Path, target: &Path) -> Result<()> {
        std::fs::rename(partial, target).map_err(|e| {
            CacheError::FileIoError(format!(
                "Failed to move {} to {}: {}",
                partial.display(),
                target.display(),
                e
            ))
        })
    }

    fn list_partials(&self) -> Vec<PathBuf> {
        let entries = match std::fs::read_dir(&self.root) {
            Ok(entries) => entries,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "failed to list cache directory");
                return Vec::new();
            }
        };

        entries
            .filter_map(|entry| entry.ok())
            .map(|entry| entry.path())
            .filter(|path| {
                path.is_file()
                    && path.extension().and_then(|ext| ext.to_str()) == Some(PARTIAL_SUFFIX)
            })
            .collect()
    }
}

/// Atomic write: write to temp file, sync, then rename
pub async fn atomic_write(path: &Path, contents: &[u8]) -> Result<()> {
    let file_name = path
        .file_name()
        .and_then(|s| s.to_str())
        .unwrap_or("file");
    let temp_path = path.with_file_name(format!(".{}.tmp", file_name));

    let mut file = fs::File::create(&temp_path)
        .await
        .map_err(|e| CacheError::file_io("Failed to create temp file", &temp_path, e))?;

    file.write_all(contents)
        .await
        .map_err(|e| CacheError::file_io("Failed to write temp file", &temp_path, e))?;

    file.sync_all()
        .await
        .map_err(|e| CacheError::file_io("Failed to sync temp file", &temp_path, e))?;

    drop(file);

    fs::rename(&temp_path, path).await.map_err(|e| {
        CacheError::FileIoError(format!(
            "Failed to rename temp file {} to {}: {}",
            temp_path.display(),
            path.display(),
            e
        ))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::UrlKey;
    use tempfile::TempDir;

    #[test]
    fn test_new_creates_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("nested").join("video_cache");

        let storage = FsStorage::new(&root).unwrap();
        assert!(root.is_dir());
        assert_eq!(storage.root(), root.as_path());
    }

    #[test]
    fn test_new_fails_on_file_root() {
        let temp_dir = TempDir::new().unwrap();
        let root = temp_dir.path().join("occupied");
        std::fs::write(&root, b"not a directory").unwrap();

        let result = FsStorage::new(&root);
        assert!(matches!(result, Err(CacheError::StorageRootUnavailable { .. })));
    }

    #[test]
    fn test_paths_are_deterministic() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FsStorage::new(temp_dir.path()).unwrap();
        let key = UrlKey::normalize("http://x/a.mp4").unwrap();

        assert_eq!(storage.path_for(&key), storage.path_for(&key.clone()));
        assert_ne!(storage.partial_path_for(&key, 1), storage.partial_path_for(&key, 2));
        assert_ne!(storage.path_for(&key), storage.partial_path_for(&key, 1));
    }

    #[tokio::test]
    async fn test_write_finalize_delete() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FsStorage::new(temp_dir.path()).unwrap();
        let key = UrlKey::normalize("http://x/a.mp4").unwrap();
        let partial = storage.partial_path_for(&key, 7);
        let target = storage.path_for(&key);

        let mut writer = storage.open(&partial, OpenMode::Create).await.unwrap();
        writer.write_all(b"hello ").await.unwrap();
        writer.write_all(b"video").await.unwrap();
        writer.shutdown().await.unwrap();
        drop(writer);

        assert_eq!(storage.list_partials(), vec![partial.clone()]);
        storage.finalize(&partial, &target).unwrap();

        assert!(!storage.exists(&partial));
        assert!(storage.exists(&target));
        assert_eq!(storage.size_of(&target), Some(11));
        assert!(storage.list_partials().is_empty());

        assert!(storage.delete(&target));
        assert!(!storage.exists(&target));
        // Delete non-existent file should not error
        assert!(!storage.delete(&target));
        assert_eq!(storage.size_of(&target), None);
    }

    #[tokio::test]
    async fn test_append_mode() {
        let temp_dir = TempDir::new().unwrap();
        let storage = FsStorage::new(temp_dir.path()).unwrap();
        let path = temp_dir.path().join("append.part");

        for chunk in [&b"abc"[..], &b"def"[..]] {
            let mut writer = storage.open(&path, OpenMode::Append).await.unwrap();
            writer.write_all(chunk).await.unwrap();
            writer.shutdown().await.unwrap();
        }

        assert_eq!(std::fs::read(&path).unwrap(), b"abcdef");
    }

    #[tokio::test]
    async fn test_atomic_write() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("download_index.json");

        atomic_write(&file, b"{}").await.unwrap();
        atomic_write(&file, b"{\"version\":1}").await.unwrap();

        assert_eq!(std::fs::read_to_string(&file).unwrap(), "{\"version\":1}");
        assert!(!temp_dir.path().join(".download_index.json.tmp").exists());
    }
}
