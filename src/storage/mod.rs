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


//! Storage backend for cached video bytes
//!
//! The cache only needs a handful of primitives from storage: existence,
//! size, delete, open-for-write and an atomic rename. Paths are derived from
//! the [`UrlKey`] so the same URL always lands on the same file.
//!
//! # File Layout
//! - `<root>/<sha256>.<ext>` - completed download, safe to hand to a player
//! - `<root>/<sha256>.<attempt>.part` - bytes of one in-flight attempt
//!
//! A task writes its own partial file and renames it onto the completed path
//! only after the last byte is flushed.

pub mod fs;

use crate::error::Result;
use crate::key::UrlKey;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWrite;

pub use fs::FsStorage;

/// Suffix of in-flight partial files
pub const PARTIAL_SUFFIX: &str = "part";

/// How to open a file for writing
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OpenMode {
    /// Create or truncate
    Create,
    /// Create if missing, then append
    Append,
}

/// Writer returned by [`StorageBackend::open`]
pub type CacheWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Byte persistence used by download tasks and the cache manager
///
/// Metadata operations are synchronous so facade queries can use them without
/// an executor; only opening a writer is async.
#[async_trait]
pub trait StorageBackend: Send + Sync + std::fmt::Debug {
    /// Root directory of the cache
    fn root(&self) -> &Path;

    /// Completed-file path for a key
    fn path_for(&self, key: &UrlKey) -> PathBuf {
        self.root().join(key.file_name())
    }

    /// Partial-file path for one download attempt
    fn partial_path_for(&self, key: &UrlKey, attempt: u64) -> PathBuf {
        self.root()
            .join(format!("{}.{}.{}", key.digest(), attempt, PARTIAL_SUFFIX))
    }

    fn exists(&self, path: &Path) -> bool;

    /// Delete a file; returns whether a file was removed
    fn delete(&self, path: &Path) -> bool;

    fn size_of(&self, path: &Path) -> Option<u64>;

    async fn open(&self, path: &Path, mode: OpenMode) -> Result<CacheWriter>;

    /// Atomically move a fully written partial file onto its final path
    fn finalize(&self, partial: &Path, target: &Path) -> Result<()>;

    /// Partial files currently present under the root
    fn list_partials(&self) -> Vec<PathBuf>;
}
