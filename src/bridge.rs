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


//! Invocation surface for the player plugins
//!
//! Plain scalar and string functions over one process-wide
//! [`VideoCacheManager`], exported through uniffi for Swift and Kotlin and
//! reused by the JNI bridge.
//!
//! # Architecture
//! Dart (video_player) → Swift / Kotlin plugin → uniffi or JNI → Rust
//!
//! # Lifecycle
//! `initialize_cache` builds the manager once; later calls are no-ops. Every
//! other function returns a neutral value (empty token, `false`, `0`, `None`,
//! state `-1`) until then, and the manager lives until the process exits.

use crate::asset::VideoAsset;
use crate::config::{CacheConfig, DEFAULT_MAX_CONCURRENT_DOWNLOADS};
use crate::download::{DownloadState, VideoCacheManager};
use crate::error::CacheError;
use once_cell::sync::OnceCell;
use tracing::{info, warn};

// Runtime that owns every download task started through the bridge
lazy_static::lazy_static! {
    static ref RUNTIME: tokio::runtime::Runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .thread_name("video-cache")
        .build()
        .expect("Failed to create Tokio runtime");
}

static MANAGER: OnceCell<VideoCacheManager> = OnceCell::new();

/// Errors surfaced synchronously from initialization
#[derive(Debug, thiserror::Error, uniffi::Error)]
#[uniffi(flat_error)]
pub enum BridgeError {
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    #[error("Cache directory unavailable: {0}")]
    StorageUnavailable(String),

    #[error("{0}")]
    Internal(String),
}

impl From<CacheError> for BridgeError {
    fn from(error: CacheError) -> Self {
        match error {
            CacheError::InvalidConfiguration(message) => BridgeError::InvalidConfiguration(message),
            e @ CacheError::StorageRootUnavailable { .. } => BridgeError::StorageUnavailable(e.to_string()),
            e => BridgeError::Internal(e.to_string()),
        }
    }
}

/// Completed download handed to the player
#[derive(Debug, Clone, PartialEq, uniffi::Record)]
pub struct CachedAsset {
    pub url: String,
    pub path: String,
    /// `file://` URI of `path`
    pub uri: Option<String>,
    pub mime_type: Option<String>,
    pub size_bytes: u64,
}

impl From<VideoAsset> for CachedAsset {
    fn from(asset: VideoAsset) -> Self {
        Self {
            uri: asset.file_uri(),
            url: asset.url,
            path: asset.path.display().to_string(),
            mime_type: asset.mime_type,
            size_bytes: asset.size_bytes,
        }
    }
}

/// The process-wide manager, once initialized
pub fn manager() -> Option<&'static VideoCacheManager> {
    MANAGER.get()
}

/// Build the manager from a full configuration (idempotent)
pub fn initialize_with_config(config: CacheConfig) -> Result<&'static VideoCacheManager, CacheError> {
    crate::logging::init_logging(None);

    MANAGER.get_or_try_init(|| {
        // Download tasks and the index writer are spawned on the bridge runtime
        let _guard = RUNTIME.enter();
        VideoCacheManager::initialize(config)
    })
}

/// Initialize the cache
///
/// An empty `cache_directory` selects the platform temp directory and a zero
/// limit selects the default of three downloads.
#[uniffi::export]
pub fn initialize_cache(cache_directory: String, max_concurrent_downloads: u32) -> Result<(), BridgeError> {
    if MANAGER.get().is_some() {
        return Ok(());
    }

    let mut config = CacheConfig::default();
    if !cache_directory.trim().is_empty() {
        config.cache_directory = cache_directory.into();
    }
    if max_concurrent_downloads > 0 {
        config.max_concurrent_downloads = max_concurrent_downloads as usize;
    }

    let manager = initialize_with_config(config)?;
    info!(root = %manager.cache_directory().display(), "cache initialized from bridge");
    Ok(())
}

/// Initialize from a JSON encoded configuration
#[uniffi::export]
pub fn initialize_cache_with_json(config_json: String) -> Result<(), BridgeError> {
    if MANAGER.get().is_some() {
        return Ok(());
    }
    let config = CacheConfig::from_json(&config_json)?;
    initialize_with_config(config)?;
    Ok(())
}

#[uniffi::export]
pub fn is_cache_initialized() -> bool {
    MANAGER.get().is_some()
}

/// Start a download; returns the download token, or "" on failure
#[uniffi::export]
pub fn start_download(url: String) -> String {
    let Some(manager) = manager() else {
        warn!(url, "start_download before initialize_cache");
        return String::new();
    };
    match manager.start_download(&url) {
        Ok(token) => token,
        Err(e) => {
            warn!(url, error = %e, "start_download rejected");
            String::new()
        }
    }
}

#[uniffi::export]
pub fn cancel_download(url: String) -> bool {
    manager().map_or(false, |m| m.cancel_download(&url))
}

#[uniffi::export]
pub fn remove_download(url: String) -> bool {
    manager().map_or(false, |m| m.remove_download(&url))
}

#[uniffi::export]
pub fn get_download_progress(url: String) -> f64 {
    manager().map_or(0.0, |m| m.get_download_progress(&url))
}

#[uniffi::export]
pub fn get_bytes_downloaded(url: String) -> i64 {
    manager().map_or(0, |m| i64::try_from(m.get_bytes_downloaded(&url)).unwrap_or(i64::MAX))
}

#[uniffi::export]
pub fn get_cached_video_path(url: String) -> Option<String> {
    manager()?
        .get_cached_video_path(&url)
        .map(|path| path.display().to_string())
}

#[uniffi::export]
pub fn is_video_cached(url: String) -> bool {
    manager().map_or(false, |m| m.is_video_cached(&url))
}

/// State code: -1 absent, 0 not started, 1 queued, 2 downloading,
/// 3 completed, 4 failed, 5 cancelled
#[uniffi::export]
pub fn get_download_state(url: String) -> i32 {
    DownloadState::code_of(manager().and_then(|m| m.get_download_state(&url)))
}

#[uniffi::export]
pub fn get_max_concurrent_downloads() -> u32 {
    let max = manager().map_or(DEFAULT_MAX_CONCURRENT_DOWNLOADS, |m| m.get_max_concurrent_downloads());
    u32::try_from(max).unwrap_or(u32::MAX)
}

#[uniffi::export]
pub fn set_max_concurrent_downloads(max_concurrent_downloads: u32) -> bool {
    let Some(manager) = manager() else {
        return false;
    };
    match manager.set_max_concurrent_downloads(max_concurrent_downloads as usize) {
        Ok(()) => true,
        Err(e) => {
            warn!(error = %e, "set_max_concurrent_downloads rejected");
            false
        }
    }
}

#[uniffi::export]
pub fn get_asset_for_url(url: String) -> Option<CachedAsset> {
    manager()?.get_asset_for_url(&url).map(CachedAsset::from)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    // The manager is process-wide, so the whole lifecycle lives in one test
    #[test]
    fn test_neutral_values_then_initialize() {
        let url = "http://127.0.0.1:9/never.mp4".to_string();

        if !is_cache_initialized() {
            assert_eq!(start_download(url.clone()), "");
            assert!(!cancel_download(url.clone()));
            assert!(!remove_download(url.clone()));
            assert_eq!(get_download_progress(url.clone()), 0.0);
            assert_eq!(get_bytes_downloaded(url.clone()), 0);
            assert_eq!(get_cached_video_path(url.clone()), None);
            assert_eq!(get_download_state(url.clone()), -1);
            assert_eq!(get_max_concurrent_downloads(), 3);
            assert!(!set_max_concurrent_downloads(2));
            assert!(get_asset_for_url(url.clone()).is_none());
        }

        let temp_dir = TempDir::new().unwrap();
        let dir = temp_dir.path().display().to_string();
        initialize_cache(dir.clone(), 2).unwrap();
        initialize_cache(dir, 5).unwrap();
        assert!(is_cache_initialized());
        assert_eq!(get_max_concurrent_downloads(), 2);

        assert_eq!(start_download("not a url".to_string()), "");
        assert!(!set_max_concurrent_downloads(0));
        assert!(set_max_concurrent_downloads(4));
        assert_eq!(get_max_concurrent_downloads(), 4);
        assert_eq!(get_download_state(url.clone()), -1);
        assert!(!is_video_cached(url));
    }

    #[test]
    fn test_bridge_error_mapping() {
        let error: BridgeError = CacheError::InvalidConfiguration("zero".to_string()).into();
        assert!(matches!(error, BridgeError::InvalidConfiguration(_)));

        let error: BridgeError = CacheError::StorageRootUnavailable {
            path: "/x".to_string(),
            message: "denied".to_string(),
        }
        .into();
        assert!(error.to_string().contains("/x"));
    }
}
