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


//! Video cache manager
//!
//! # Download Queue Management
//! - One registry entry per normalized URL
//! - Configurable concurrent download limit (default: 3)
//! - Strict FIFO admission for queued downloads
//! - Cooperative cancellation checked before every write
//! - Failed and cancelled downloads restart from scratch on the next start
//!
//! # Cache Lifecycle
//! - Completed files are served straight from storage
//! - Files deleted behind the cache's back demote their entry on the next query
//! - Least recently accessed files are evicted when the size bound is exceeded
//! - A JSON index lets the next process restore completed files and resume
//!   interrupted downloads
//!
//! Every facade call returns without waiting on the network. Transfers run
//! as tokio tasks on the runtime that was current when the manager was built.
//!
//! Start, cancel, remove and slot promotion run under one operation lock so
//! that "cancel, delete bytes, drop entry" is never interleaved with a start
//! for the same key. Lock order: operation lock, registry, entry, scheduler.

use crate::asset::VideoAsset;
use crate::config::CacheConfig;
use crate::download::entry::{DownloadEntry, EntrySnapshot};
use crate::download::index::{DownloadIndex, IndexWriter};
use crate::download::progress::{DownloadProgress, DownloadState};
use crate::download::registry::DownloadRegistry;
use crate::download::scheduler::{Admission, Scheduler, SlotRequest};
use crate::download::task::{DownloadTask, TaskOutcome};
use crate::error::{CacheError, Result};
use crate::key::UrlKey;
use crate::storage::{FsStorage, StorageBackend};
use crate::transport::{HttpTransport, Transport};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Process-wide video download cache
///
/// Cheap to clone; clones share the same registry, scheduler and storage.
#[derive(Clone)]
pub struct VideoCacheManager {
    shared: Arc<Shared>,
}

struct Shared {
    config: CacheConfig,
    registry: Arc<DownloadRegistry>,
    scheduler: Scheduler,
    storage: Arc<dyn StorageBackend>,
    transport: Arc<dyn Transport>,
    index: IndexWriter,
    runtime: Handle,
    ops: Mutex<()>,
}

impl std::fmt::Debug for VideoCacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VideoCacheManager")
            .field("cache_directory", &self.shared.storage.root())
            .field("entries", &self.shared.registry.len())
            .field("max_concurrent", &self.shared.scheduler.max_concurrent())
            .finish()
    }
}

impl VideoCacheManager {
    /// Build a manager over the local file system and HTTP
    ///
    /// Must be called from within a tokio runtime. Failing to create the cache
    /// root is the only fatal error.
    pub fn initialize(config: CacheConfig) -> Result<Self> {
        config.validate()?;
        let storage = Arc::new(FsStorage::new(&config.cache_directory)?);
        let transport = Arc::new(HttpTransport::new(&config)?);
        Self::with_backends(config, storage, transport)
    }

    /// Build a manager over explicit backends, recovering from the index
    pub fn with_backends(
        config: CacheConfig,
        storage: Arc<dyn StorageBackend>,
        transport: Arc<dyn Transport>,
    ) -> Result<Self> {
        config.validate()?;
        let runtime = Handle::try_current()
            .map_err(|e| CacheError::internal(format!("No tokio runtime available: {}", e)))?;

        // Partial files belong to attempts of a previous process
        for partial in storage.list_partials() {
            storage.delete(&partial);
        }

        let registry = Arc::new(DownloadRegistry::new());
        let mut interrupted = Vec::new();
        let mut restored = 0usize;

        for record in DownloadIndex::load(storage.root()).records {
            let key = match UrlKey::normalize(&record.url) {
                Ok(key) => key,
                Err(e) => {
                    warn!(url = %record.url, error = %e, "skipping index record");
                    continue;
                }
            };

            match record.state {
                DownloadState::Completed => {
                    let path = storage.path_for(&key);
                    match storage.size_of(&path) {
                        Some(size) => {
                            registry.insert(Arc::new(DownloadEntry::restored(
                                key,
                                path,
                                size,
                                record.completed_at,
                                record.last_accessed,
                            )));
                            restored += 1;
                        }
                        None => debug!(url = %key, "cached file vanished, dropping index record"),
                    }
                }
                DownloadState::Queued | DownloadState::Downloading => {
                    interrupted.push((record.requested_at, key));
                }
                _ => {}
            }
        }

        let index = IndexWriter::spawn(
            &runtime,
            Arc::clone(&registry),
            storage.root().to_path_buf(),
            config.progress_interval(),
        );

        let scheduler = Scheduler::new(config.max_concurrent_downloads);
        let resume = config.resume_interrupted;
        let manager = Self {
            shared: Arc::new(Shared {
                config,
                registry,
                scheduler,
                storage,
                transport,
                index,
                runtime,
                ops: Mutex::new(()),
            }),
        };

        if resume {
            interrupted.sort();
            for (_, key) in &interrupted {
                manager.shared.start(key);
            }
        }

        info!(
            root = %manager.shared.storage.root().display(),
            restored,
            resumed = if resume { interrupted.len() } else { 0 },
            max_concurrent = manager.shared.scheduler.max_concurrent(),
            "video cache initialized"
        );
        manager.shared.index.mark_dirty();
        Ok(manager)
    }

    pub fn config(&self) -> &CacheConfig {
        &self.shared.config
    }

    pub fn cache_directory(&self) -> &Path {
        self.shared.storage.root()
    }

    /// Request a download and return its token immediately
    ///
    /// Starting a URL that is queued, downloading or cached does nothing new;
    /// the same token is returned. Failed, cancelled and idle entries restart.
    pub fn start_download(&self, url: &str) -> Result<String> {
        let key = UrlKey::normalize(url)?;
        self.shared.start(&key);
        Ok(key.token())
    }

    /// Request cancellation; true only if the download was queued or running
    pub fn cancel_download(&self, url: &str) -> bool {
        let Some(key) = normalize_quiet(url) else {
            return false;
        };

        let shared = &self.shared;
        let _ops = shared.ops.lock();
        let Some(entry) = shared.registry.get(&key) else {
            return false;
        };

        match entry.request_cancel() {
            Some((DownloadState::Queued, attempt)) => {
                shared.scheduler.cancel_queued(&SlotRequest::new(key.clone(), attempt));
                info!(url = %key, "queued download cancelled");
                shared.index.mark_dirty();
                true
            }
            Some(_) => {
                debug!(url = %key, "cancel requested");
                true
            }
            None => false,
        }
    }

    /// Cancel, delete cached bytes, then drop the entry
    pub fn remove_download(&self, url: &str) -> bool {
        let Some(key) = normalize_quiet(url) else {
            return false;
        };
        let _ops = self.shared.ops.lock();
        self.shared.remove_locked(&key)
    }

    /// Fraction complete, 1.0 when completed, 0.0 for unknown URLs
    pub fn get_download_progress(&self, url: &str) -> f64 {
        self.snapshot(url).map_or(0.0, |s| s.progress())
    }

    pub fn get_bytes_downloaded(&self, url: &str) -> u64 {
        self.snapshot(url).map_or(0, |s| s.bytes_downloaded)
    }

    /// Path of the completed file, if it still exists
    ///
    /// A completed entry whose file disappeared is demoted to `NotStarted`.
    pub fn get_cached_video_path(&self, url: &str) -> Option<PathBuf> {
        let key = normalize_quiet(url)?;
        self.shared.cached_path(&key)
    }

    pub fn is_video_cached(&self, url: &str) -> bool {
        self.get_cached_video_path(url).is_some()
    }

    /// Current state, `None` when the URL has no entry
    pub fn get_download_state(&self, url: &str) -> Option<DownloadState> {
        let key = normalize_quiet(url)?;
        self.shared.registry.get(&key).map(|entry| entry.state())
    }

    /// Integer state code, -1 when the URL has no entry
    pub fn get_download_state_code(&self, url: &str) -> i32 {
        DownloadState::code_of(self.get_download_state(url))
    }

    pub fn get_max_concurrent_downloads(&self) -> usize {
        self.shared.scheduler.max_concurrent()
    }

    /// Change the concurrency limit
    ///
    /// Active downloads are never interrupted by a lower limit. A higher
    /// limit admits queued downloads immediately.
    pub fn set_max_concurrent_downloads(&self, max_concurrent: usize) -> Result<()> {
        if max_concurrent == 0 {
            return Err(CacheError::InvalidConfiguration(
                "max_concurrent_downloads must be at least 1".to_string(),
            ));
        }

        let shared = &self.shared;
        let _ops = shared.ops.lock();
        let admitted = shared.scheduler.set_max_concurrent(max_concurrent);
        info!(max_concurrent, admitted = admitted.len(), "concurrency limit changed");
        shared.launch_admitted(admitted.into());
        Ok(())
    }

    /// Playable handle for a completed download
    pub fn get_asset_for_url(&self, url: &str) -> Option<VideoAsset> {
        let key = normalize_quiet(url)?;
        let path = self.shared.cached_path(&key)?;
        let size_bytes = self.shared.storage.size_of(&path).unwrap_or(0);

        Some(VideoAsset {
            url: key.as_str().to_string(),
            format: key.streaming_format(),
            mime_type: key.mime_type().map(str::to_string),
            path,
            size_bytes,
        })
    }

    /// Detailed progress snapshot
    pub fn get_download_progress_info(&self, url: &str) -> Option<DownloadProgress> {
        self.snapshot(url).map(|s| s.to_progress())
    }

    /// Progress of every entry, ordered by URL
    pub fn list_downloads(&self) -> Vec<DownloadProgress> {
        let mut downloads: Vec<DownloadProgress> = self
            .shared
            .registry
            .entries()
            .iter()
            .map(|entry| entry.snapshot().to_progress())
            .collect();
        downloads.sort_by(|a, b| a.url.cmp(&b.url));
        downloads
    }

    pub fn active_download_count(&self) -> usize {
        self.shared.scheduler.active_count()
    }

    pub fn queued_download_count(&self) -> usize {
        self.shared.scheduler.queued_count()
    }

    /// Remove every entry; returns the number removed
    pub fn clear_cache(&self) -> usize {
        let shared = &self.shared;
        let _ops = shared.ops.lock();
        let removed = shared
            .registry
            .keys()
            .iter()
            .filter(|key| shared.remove_locked(key))
            .count();
        info!(removed, "cache cleared");
        removed
    }

    /// Sum of the sizes of completed files
    pub fn total_cached_bytes(&self) -> u64 {
        self.shared
            .registry
            .entries()
            .iter()
            .filter_map(|entry| entry.completed_path())
            .filter_map(|path| self.shared.storage.size_of(&path))
            .sum()
    }

    /// Write the download index now instead of waiting for the writer
    pub async fn flush_index(&self) -> Result<()> {
        DownloadIndex::from_registry(&self.shared.registry)
            .save(self.shared.storage.root())
            .await
    }

    fn snapshot(&self, url: &str) -> Option<EntrySnapshot> {
        let key = normalize_quiet(url)?;
        self.shared.registry.get(&key).map(|entry| entry.snapshot())
    }
}

/// Query operations treat an unparsable URL like an unknown one
fn normalize_quiet(url: &str) -> Option<UrlKey> {
    match UrlKey::normalize(url) {
        Ok(key) => Some(key),
        Err(e) => {
            debug!(url, error = %e, "ignoring invalid URL");
            None
        }
    }
}

impl Shared {
    fn start(self: &Arc<Self>, key: &UrlKey) {
        let _ops = self.ops.lock();
        let (entry, created) = self.registry.get_or_create(key);

        let state = entry.state();
        if state.is_in_flight() {
            debug!(url = %key, "download already in flight");
            return;
        }
        if !state.can_restart() {
            let cached = entry
                .completed_path()
                .map_or(false, |path| self.storage.exists(&path));
            if cached {
                entry.touch();
                debug!(url = %key, "already cached");
                return;
            }
            warn!(url = %key, "cached file missing, downloading again");
            self.registry.set_state(key, DownloadState::NotStarted);
        }

        let (attempt, _) = entry.begin_attempt();
        let request = SlotRequest::new(key.clone(), attempt);
        match self.scheduler.request_slot(request.clone()) {
            Admission::Admitted => self.launch_admitted(VecDeque::from([request])),
            Admission::Queued => {
                info!(url = %key, queued = self.scheduler.queued_count(), "download queued")
            }
        }
        if created {
            debug!(url = %key, "registry entry created");
        }
        self.index.mark_dirty();
    }

    /// Spawn tasks for admitted requests
    ///
    /// A request whose entry was cancelled or superseded hands its slot to the
    /// next queued request instead.
    fn launch_admitted(self: &Arc<Self>, mut admitted: VecDeque<SlotRequest>) {
        while let Some(request) = admitted.pop_front() {
            let launch = self.registry.get(&request.key).and_then(|entry| {
                entry
                    .mark_downloading(request.attempt)
                    .map(|cancel| (entry, cancel))
            });

            match launch {
                Some((entry, cancel)) => self.spawn_task(entry, request, cancel),
                None => {
                    debug!(url = %request.key, attempt = request.attempt, "skipping stale slot");
                    if let Some(next) = self.scheduler.release_slot(&request) {
                        admitted.push_back(next);
                    }
                }
            }
        }
    }

    fn spawn_task(
        self: &Arc<Self>,
        entry: Arc<DownloadEntry>,
        request: SlotRequest,
        cancel: CancellationToken,
    ) {
        info!(url = %request.key, attempt = request.attempt, "download started");
        let task = DownloadTask {
            entry,
            registry: Arc::clone(&self.registry),
            storage: Arc::clone(&self.storage),
            transport: Arc::clone(&self.transport),
            attempt: request.attempt,
            cancel,
            log_interval: self.config.progress_interval(),
        };

        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            let outcome = task.run().await;
            shared.on_task_finished(request, outcome);
        });
    }

    fn on_task_finished(self: &Arc<Self>, request: SlotRequest, outcome: TaskOutcome) {
        {
            let _ops = self.ops.lock();
            if let Some(next) = self.scheduler.release_slot(&request) {
                self.launch_admitted(VecDeque::from([next]));
            }
        }

        if let TaskOutcome::Completed { .. } = outcome {
            self.enforce_cache_limit(&request.key);
        }
        self.index.mark_dirty();
    }

    fn cached_path(&self, key: &UrlKey) -> Option<PathBuf> {
        let entry = self.registry.get(key)?;
        let path = entry.completed_path()?;
        if self.storage.exists(&path) {
            entry.touch();
            return Some(path);
        }

        let _ops = self.ops.lock();
        // A restart may have completed again since the check above
        if let Some(path) = entry.completed_path() {
            if self.storage.exists(&path) {
                entry.touch();
                return Some(path);
            }
            warn!(url = %key, path = %path.display(), "cached file missing, demoting entry");
            self.registry.set_state(key, DownloadState::NotStarted);
            self.index.mark_dirty();
        }
        None
    }

    /// Caller holds the operation lock
    fn remove_locked(&self, key: &UrlKey) -> bool {
        let path = self.storage.path_for(key);
        let Some(entry) = self.registry.get(key) else {
            return self.storage.delete(&path);
        };

        if let Some((DownloadState::Queued, attempt)) = entry.request_cancel() {
            self.scheduler.cancel_queued(&SlotRequest::new(key.clone(), attempt));
        }
        self.storage.delete(&path);
        self.registry.remove(key);

        info!(url = %key, "download removed");
        self.index.mark_dirty();
        true
    }

    /// Evict least recently accessed files until the size bound holds
    fn enforce_cache_limit(&self, keep: &UrlKey) {
        let Some(limit) = self.config.max_cache_bytes else {
            return;
        };

        let _ops = self.ops.lock();
        let mut completed: Vec<_> = self
            .registry
            .entries()
            .iter()
            .filter_map(|entry| {
                let snapshot = entry.snapshot();
                let path = snapshot.cached_path.as_ref()?;
                if snapshot.state != DownloadState::Completed {
                    return None;
                }
                let size = self.storage.size_of(path)?;
                Some((snapshot.last_accessed, snapshot.key, size))
            })
            .collect();

        let mut total: u64 = completed.iter().map(|(_, _, size)| size).sum();
        if total <= limit {
            return;
        }

        completed.sort_by(|a, b| a.0.cmp(&b.0));
        for (_, key, size) in completed {
            if total <= limit {
                break;
            }
            if &key == keep {
                continue;
            }
            if self.remove_locked(&key) {
                total = total.saturating_sub(size);
                info!(url = %key, size, "evicted from cache");
            }
        }
    }
}
