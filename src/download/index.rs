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


//! Download index persisted next to the cached files
//!
//! The index lets a restarted process recognise completed files and resume
//! downloads that were queued or running. Only the background [`IndexWriter`]
//! writes it during normal operation; facade calls just mark it dirty.

use crate::download::entry::EntrySnapshot;
use crate::download::progress::DownloadState;
use crate::download::registry::DownloadRegistry;
use crate::error::Result;
use crate::storage::fs::atomic_write;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub const INDEX_FILE_NAME: &str = "download_index.json";

const INDEX_VERSION: u32 = 1;

/// One persisted entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexRecord {
    /// Normalized URL
    pub url: String,

    pub file_name: String,

    pub state: DownloadState,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_bytes: Option<u64>,

    pub requested_at: DateTime<Utc>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    pub last_accessed: DateTime<Utc>,
}

impl IndexRecord {
    /// Record for an entry worth persisting (completed, queued or downloading)
    pub fn from_snapshot(snapshot: &EntrySnapshot) -> Option<Self> {
        match snapshot.state {
            DownloadState::Completed | DownloadState::Queued | DownloadState::Downloading => {
                Some(Self {
                    url: snapshot.key.as_str().to_string(),
                    file_name: snapshot.key.file_name(),
                    state: snapshot.state,
                    total_bytes: snapshot.total_bytes,
                    requested_at: snapshot.requested_at,
                    completed_at: snapshot.completed_at,
                    last_accessed: snapshot.last_accessed,
                })
            }
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadIndex {
    pub version: u32,
    pub records: Vec<IndexRecord>,
}

impl Default for DownloadIndex {
    fn default() -> Self {
        Self {
            version: INDEX_VERSION,
            records: Vec::new(),
        }
    }
}

impl DownloadIndex {
    pub fn path_in(root: &Path) -> PathBuf {
        root.join(INDEX_FILE_NAME)
    }

    /// Load the index from `root`
    ///
    /// A missing or unreadable index yields an empty one; the cache then
    /// starts cold instead of failing initialization.
    pub fn load(root: &Path) -> Self {
        let path = Self::path_in(root);
        let contents = match std::fs::read(&path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Self::default(),
            Err(e) => {
                warn!(path = %path.display(), error = %e, "failed to read download index");
                return Self::default();
            }
        };

        match serde_json::from_slice::<DownloadIndex>(&contents) {
            Ok(index) => {
                debug!(records = index.records.len(), "loaded download index");
                index
            }
            Err(e) => {
                warn!(path = %path.display(), error = %e, "ignoring corrupt download index");
                Self::default()
            }
        }
    }

    pub fn from_registry(registry: &DownloadRegistry) -> Self {
        let mut records: Vec<IndexRecord> = registry
            .entries()
            .iter()
            .filter_map(|entry| IndexRecord::from_snapshot(&entry.snapshot()))
            .collect();
        records.sort_by(|a, b| a.requested_at.cmp(&b.requested_at).then_with(|| a.url.cmp(&b.url)));

        Self {
            version: INDEX_VERSION,
            records,
        }
    }

    pub async fn save(&self, root: &Path) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        atomic_write(&Self::path_in(root), &json).await
    }
}

/// Background task that rewrites the index after changes
///
/// Bursts of changes are coalesced: after a notification the writer waits
/// `debounce` before taking a registry snapshot.
#[derive(Debug)]
pub struct IndexWriter {
    dirty: Arc<Notify>,
    shutdown: CancellationToken,
}

impl IndexWriter {
    pub fn spawn(
        runtime: &Handle,
        registry: Arc<DownloadRegistry>,
        root: PathBuf,
        debounce: Duration,
    ) -> Self {
        let dirty = Arc::new(Notify::new());
        let shutdown = CancellationToken::new();

        let notified = Arc::clone(&dirty);
        let stop = shutdown.clone();
        runtime.spawn(async move {
            loop {
                tokio::select! {
                    _ = stop.cancelled() => break,
                    _ = notified.notified() => {}
                }
                tokio::select! {
                    _ = stop.cancelled() => {}
                    _ = tokio::time::sleep(debounce) => {}
                }

                let index = DownloadIndex::from_registry(&registry);
                if let Err(e) = index.save(&root).await {
                    warn!(error = %e, "failed to write download index");
                }
                if stop.is_cancelled() {
                    break;
                }
            }
            debug!("index writer stopped");
        });

        Self { dirty, shutdown }
    }

    /// Schedule a rewrite
    pub fn mark_dirty(&self) {
        self.dirty.notify_one();
    }

    pub fn shutdown(&self) {
        self.shutdown.cancel();
    }
}

impl Drop for IndexWriter {
    fn drop(&mut self) {
        self.shutdown.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::key::UrlKey;
    use tempfile::TempDir;

    fn completed_registry() -> DownloadRegistry {
        let registry = DownloadRegistry::new();
        let (entry, _) = registry.get_or_create(&UrlKey::normalize("http://x/a.mp4").unwrap());
        let (attempt, _) = entry.begin_attempt();
        entry.mark_downloading(attempt).unwrap();
        entry
            .commit(attempt, Path::new("/tmp/a.mp4"), 5, || Ok(()))
            .unwrap();

        let (entry, _) = registry.get_or_create(&UrlKey::normalize("http://x/b.m3u8").unwrap());
        entry.begin_attempt();

        // Not persisted
        registry.get_or_create(&UrlKey::normalize("http://x/c.mp4").unwrap());
        registry
    }

    #[test]
    fn test_missing_index_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        assert_eq!(DownloadIndex::load(temp_dir.path()), DownloadIndex::default());
    }

    #[test]
    fn test_corrupt_index_is_empty() {
        let temp_dir = TempDir::new().unwrap();
        std::fs::write(DownloadIndex::path_in(temp_dir.path()), b"{ not json").unwrap();
        assert!(DownloadIndex::load(temp_dir.path()).records.is_empty());
    }

    #[test]
    fn test_from_registry_skips_idle_entries() {
        let index = DownloadIndex::from_registry(&completed_registry());
        let states: Vec<_> = index.records.iter().map(|r| r.state).collect();

        assert_eq!(index.records.len(), 2);
        assert!(states.contains(&DownloadState::Completed));
        assert!(states.contains(&DownloadState::Queued));
    }

    #[tokio::test]
    async fn test_save_and_load() {
        let temp_dir = TempDir::new().unwrap();
        let index = DownloadIndex::from_registry(&completed_registry());

        index.save(temp_dir.path()).await.unwrap();
        let loaded = DownloadIndex::load(temp_dir.path());

        assert_eq!(loaded, index);
        let completed = loaded
            .records
            .iter()
            .find(|r| r.state == DownloadState::Completed)
            .unwrap();
        assert_eq!(completed.total_bytes, Some(5));
        assert!(completed.file_name.ends_with(".mp4"));
    }

    #[tokio::test]
    async fn test_writer_persists_after_mark_dirty() {
        let temp_dir = TempDir::new().unwrap();
        let registry = Arc::new(completed_registry());
        let writer = IndexWriter::spawn(
            &Handle::current(),
            Arc::clone(&registry),
            temp_dir.path().to_path_buf(),
            Duration::from_millis(10),
        );

        writer.mark_dirty();
        let path = DownloadIndex::path_in(temp_dir.path());
        for _ in 0..100 {
            if path.exists() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }

        assert_eq!(DownloadIndex::load(temp_dir.path()).records.len(), 2);
        writer.shutdown();
    }
}
