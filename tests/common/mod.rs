//! Shared fixtures for the cache manager integration tests

#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use video_cache_core::storage::{CacheWriter, FsStorage, OpenMode, StorageBackend};
use video_cache_core::transport::{TransferResponse, Transport};
use video_cache_core::{CacheConfig, CacheError, DownloadState, UrlKey, VideoCacheManager};

/// Body served when nothing was scripted for a URL
pub const DEFAULT_BODY_LEN: usize = 1024;

enum Scripted {
    Body { data: Vec<u8>, total: Option<u64> },
    Gated { total: Option<u64>, rx: mpsc::UnboundedReceiver<video_cache_core::Result<Bytes>> },
    Status(u16),
}

/// In-memory transport with per-URL scripted responses
///
/// Each fetch consumes the next scripted response for its URL; unscripted
/// fetches get [`DEFAULT_BODY_LEN`] bytes in 256-byte chunks.
#[derive(Default)]
pub struct ScriptedTransport {
    scripts: Mutex<HashMap<String, VecDeque<Scripted>>>,
    fetches: Mutex<HashMap<String, usize>>,
}

/// Feeds a gated response chunk by chunk
pub struct GateHandle {
    tx: mpsc::UnboundedSender<video_cache_core::Result<Bytes>>,
}

impl GateHandle {
    pub fn send(&self, data: &[u8]) {
        // The task may already be gone after a cancel
        let _ = self.tx.send(Ok(Bytes::copy_from_slice(data)));
    }

    pub fn fail(&self, message: &str) {
        let _ = self
            .tx
            .send(Err(CacheError::network_error(message.to_string(), true)));
    }

    /// End of body
    pub fn finish(self) {}
}

fn key_of(url: &str) -> String {
    UrlKey::normalize(url).unwrap().as_str().to_string()
}

impl ScriptedTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn push(&self, url: &str, response: Scripted) {
        self.scripts
            .lock()
            .entry(key_of(url))
            .or_default()
            .push_back(response);
    }

    pub fn serve(&self, url: &str, data: Vec<u8>) {
        let total = Some(data.len() as u64);
        self.push(url, Scripted::Body { data, total });
    }

    /// Next fetch of `url` streams whatever the returned handle sends
    pub fn gate(&self, url: &str, total: Option<u64>) -> GateHandle {
        let (tx, rx) = mpsc::unbounded_channel();
        self.push(url, Scripted::Gated { total, rx });
        GateHandle { tx }
    }

    pub fn fail_with_status(&self, url: &str, status_code: u16) {
        self.push(url, Scripted::Status(status_code));
    }

    pub fn fetch_count(&self, url: &str) -> usize {
        self.fetches.lock().get(&key_of(url)).copied().unwrap_or(0)
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, url: &str) -> video_cache_core::Result<TransferResponse> {
        *self.fetches.lock().entry(url.to_string()).or_insert(0) += 1;

        let scripted = self
            .scripts
            .lock()
            .get_mut(url)
            .and_then(|queue| queue.pop_front());

        match scripted.unwrap_or(Scripted::Body {
            data: vec![7u8; DEFAULT_BODY_LEN],
            total: Some(DEFAULT_BODY_LEN as u64),
        }) {
            Scripted::Body { data, total } => {
                let chunks: Vec<video_cache_core::Result<Bytes>> = data
                    .chunks(256)
                    .map(|chunk| Ok(Bytes::copy_from_slice(chunk)))
                    .collect();
                Ok(TransferResponse {
                    total_bytes: total,
                    body: stream::iter(chunks).boxed(),
                })
            }
            Scripted::Gated { total, rx } => {
                let body = stream::unfold(rx, |mut rx| async move {
                    rx.recv().await.map(|item| (item, rx))
                });
                Ok(TransferResponse {
                    total_bytes: total,
                    body: body.boxed(),
                })
            }
            Scripted::Status(status_code) => Err(CacheError::UnexpectedStatusCode {
                status_code,
                url: url.to_string(),
            }),
        }
    }
}

/// File-system storage that can report one path as missing exactly once
#[derive(Debug)]
pub struct FlickerStorage {
    inner: FsStorage,
    hidden: Mutex<Option<PathBuf>>,
}

impl FlickerStorage {
    pub fn new(root: &Path) -> Arc<Self> {
        Arc::new(Self {
            inner: FsStorage::new(root).unwrap(),
            hidden: Mutex::new(None),
        })
    }

    /// The next `exists` check on `path` answers `false`
    pub fn hide_once(&self, path: &Path) {
        *self.hidden.lock() = Some(path.to_path_buf());
    }
}

#[async_trait]
impl StorageBackend for FlickerStorage {
    fn root(&self) -> &Path {
        self.inner.root()
    }

    fn exists(&self, path: &Path) -> bool {
        let mut hidden = self.hidden.lock();
        if hidden.as_deref() == Some(path) {
            *hidden = None;
            return false;
        }
        self.inner.exists(path)
    }

    fn delete(&self, path: &Path) -> bool {
        self.inner.delete(path)
    }

    fn size_of(&self, path: &Path) -> Option<u64> {
        self.inner.size_of(path)
    }

    async fn open(&self, path: &Path, mode: OpenMode) -> video_cache_core::Result<CacheWriter> {
        self.inner.open(path, mode).await
    }

    fn finalize(&self, partial: &Path, target: &Path) -> video_cache_core::Result<()> {
        self.inner.finalize(partial, target)
    }

    fn list_partials(&self) -> Vec<PathBuf> {
        self.inner.list_partials()
    }
}

pub fn test_config(dir: &Path, max_concurrent: usize) -> CacheConfig {
    let mut config = CacheConfig::with_directory(dir);
    config.max_concurrent_downloads = max_concurrent;
    config.max_cache_bytes = None;
    config.progress_interval_ms = 10;
    config
}

pub fn new_manager(config: CacheConfig, transport: &Arc<ScriptedTransport>) -> VideoCacheManager {
    let storage = Arc::new(FsStorage::new(&config.cache_directory).unwrap());
    VideoCacheManager::with_backends(config, storage, transport.clone()).unwrap()
}

/// Completed-file path the cache uses for `url`
pub fn cached_file_for(dir: &Path, url: &str) -> PathBuf {
    FsStorage::new(dir)
        .unwrap()
        .path_for(&UrlKey::normalize(url).unwrap())
}

/// Poll `condition` for up to five seconds
pub async fn wait_until<F: FnMut() -> bool>(mut condition: F) -> bool {
    for _ in 0..500 {
        if condition() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    condition()
}

pub async fn wait_for_state(manager: &VideoCacheManager, url: &str, state: DownloadState) -> bool {
    wait_until(|| manager.get_download_state(url) == Some(state)).await
}

/// Partial files left in the cache directory
pub fn partial_files(dir: &Path) -> Vec<std::path::PathBuf> {
    std::fs::read_dir(dir)
        .unwrap()
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| path.extension().and_then(|ext| ext.to_str()) == Some("part"))
        .collect()
}
