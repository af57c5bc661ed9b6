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


//! Cache configuration
//!
//! Everything here is fixed at initialization except the concurrency limit,
//! which the scheduler can change at run time.

use crate::error::{CacheError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Default number of simultaneous downloads
pub const DEFAULT_MAX_CONCURRENT_DOWNLOADS: usize = 3;

/// Default cache size bound (2 GiB)
pub const DEFAULT_MAX_CACHE_BYTES: u64 = 2 * 1024 * 1024 * 1024;

/// Name of the cache folder under the platform temp/files directory
pub const CACHE_DIRECTORY_NAME: &str = "video_cache";

/// Video cache configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Root directory for cached files and the download index
    pub cache_directory: PathBuf,

    /// Maximum concurrent downloads
    pub max_concurrent_downloads: usize,

    /// Upper bound on the size of completed files; `None` disables eviction
    pub max_cache_bytes: Option<u64>,

    /// Debounce interval for index persistence (milliseconds)
    pub progress_interval_ms: u64,

    /// Connection timeout for the HTTP transport (seconds)
    pub connect_timeout_secs: u64,

    /// User-Agent header sent with every request
    pub user_agent: String,

    /// Restart downloads that were queued or running when the process died
    pub resume_interrupted: bool,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            cache_directory: default_cache_directory(),
            max_concurrent_downloads: DEFAULT_MAX_CONCURRENT_DOWNLOADS,
            max_cache_bytes: Some(DEFAULT_MAX_CACHE_BYTES),
            progress_interval_ms: 500,
            connect_timeout_secs: 30,
            user_agent: "VideoCacheManager".to_string(),
            resume_interrupted: true,
        }
    }
}

impl CacheConfig {
    /// Default configuration rooted at `cache_directory`
    pub fn with_directory<P: Into<PathBuf>>(cache_directory: P) -> Self {
        Self {
            cache_directory: cache_directory.into(),
            ..Default::default()
        }
    }

    /// Parse a configuration passed by a host as JSON
    ///
    /// Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject configurations the cache cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_downloads == 0 {
            return Err(CacheError::InvalidConfiguration(
                "max_concurrent_downloads must be at least 1".to_string(),
            ));
        }
        if self.cache_directory.as_os_str().is_empty() {
            return Err(CacheError::InvalidConfiguration(
                "cache_directory must not be empty".to_string(),
            ));
        }
        if self.max_cache_bytes == Some(0) {
            return Err(CacheError::InvalidConfiguration(
                "max_cache_bytes must be positive (use null to disable eviction)".to_string(),
            ));
        }
        Ok(())
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_millis(self.progress_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

/// Default cache location: `<temp dir>/video_cache`
pub fn default_cache_directory() -> PathBuf {
    std::env::temp_dir().join(CACHE_DIRECTORY_NAME)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = CacheConfig::default();
        assert_eq!(config.max_concurrent_downloads, 3);
        assert_eq!(config.max_cache_bytes, Some(DEFAULT_MAX_CACHE_BYTES));
        assert!(config.cache_directory.ends_with(CACHE_DIRECTORY_NAME));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_from_json_partial() {
        let config = CacheConfig::from_json(
            r#"{"cache_directory": "/tmp/videos", "max_concurrent_downloads": 5, "max_cache_bytes": null}"#,
        )
        .unwrap();

        assert_eq!(config.cache_directory, PathBuf::from("/tmp/videos"));
        assert_eq!(config.max_concurrent_downloads, 5);
        assert_eq!(config.max_cache_bytes, None);
        assert!(config.resume_interrupted);
    }

    #[test]
    fn test_validate_rejects_zero_concurrency() {
        let config = CacheConfig {
            max_concurrent_downloads: 0,
            ..CacheConfig::with_directory("/tmp/videos")
        };
        assert!(matches!(
            config.validate(),
            Err(CacheError::InvalidConfiguration(_))
        ));

        assert!(CacheConfig::from_json(r#"{"max_concurrent_downloads": 0}"#).is_err());
    }
}
