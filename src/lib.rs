//! Video download cache for mobile playback
//!
//! Many playback requests share a bounded pool of concurrent downloads that
//! fill a local disk cache. Start with [`VideoCacheManager`], or with the
//! process-wide functions in [`bridge`] from a host app.

uniffi::setup_scaffolding!();

pub mod asset;
pub mod bridge;
pub mod config;
pub mod download;
pub mod error;
pub mod key;
pub mod logging;
pub mod storage;
pub mod transport;

// JNI bridge for Android
#[cfg(target_os = "android")]
mod jni_bridge;

pub use asset::{StreamingFormat, VideoAsset};
pub use config::CacheConfig;
pub use download::{DownloadProgress, DownloadState, VideoCacheManager};
pub use error::{CacheError, Result};
pub use key::UrlKey;
