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


//! JNI bridge for Android - Exposes the video cache to the video_player plugin
//!
//! # Architecture
//! Dart (video_player) → Kotlin (VideoCacheManager) → JNI → Rust
//!
//! Scalar operations return JNI scalars directly. Composite values (paths,
//! assets, progress records) and initialization results are returned as JSON:
//! ```json
//! { "success": true, "data": { ... } }
//! ```
//! Or on error:
//! ```json
//! { "success": false, "error": "Error message" }
//! ```
//!
//! Panics never cross the FFI boundary.

use crate::bridge;
use jni::objects::{JClass, JString};
use jni::sys::{jboolean, jdouble, jint, jlong, jstring, JNI_FALSE, JNI_TRUE};
use jni::JNIEnv;
use serde::Serialize;
use std::panic::{self, AssertUnwindSafe};

// ============================================================================
// HELPER FUNCTIONS
// ============================================================================

/// Convert JString to Rust String
fn jstring_to_string(env: &mut JNIEnv, jstr: &JString) -> crate::Result<String> {
    env.get_string(jstr)
        .map(|s| s.into())
        .map_err(|e| crate::CacheError::InvalidUrl(format!("JNI string conversion failed: {}", e)))
}

/// Create success response JSON
fn success_response<T: Serialize>(data: T) -> String {
    serde_json::json!({
        "success": true,
        "data": data
    })
    .to_string()
}

/// Create error response JSON
fn error_response(error: &str) -> String {
    serde_json::json!({
        "success": false,
        "error": error
    })
    .to_string()
}

/// Convert Rust result to JSON response string
fn result_to_json<T: Serialize>(result: crate::Result<T>) -> String {
    match result {
        Ok(data) => success_response(data),
        Err(e) => error_response(&e.to_string()),
    }
}

fn panic_message(panic_err: Box<dyn std::any::Any + Send>) -> String {
    if let Some(s) = panic_err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = panic_err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "Unknown panic occurred".to_string()
    }
}

/// Wrap a JSON-returning call with panic catching
fn catch_panic<F>(f: F) -> String
where
    F: FnOnce() -> String,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic_err) => error_response(&format!("Rust panic: {}", panic_message(panic_err))),
    }
}

/// Wrap a scalar-returning call, falling back to `neutral` on panic
fn catch_panic_or<T, F>(neutral: T, f: F) -> T
where
    F: FnOnce() -> T,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(panic_err) => {
            tracing::error!(panic = %panic_message(panic_err), "panic in JNI call");
            neutral
        }
    }
}

fn to_jboolean(value: bool) -> jboolean {
    if value {
        JNI_TRUE
    } else {
        JNI_FALSE
    }
}

/// Read a URL argument; an unreadable string behaves like an unknown URL
fn url_arg(env: &mut JNIEnv, url: &JString) -> String {
    jstring_to_string(env, url).unwrap_or_default()
}

fn into_jstring(env: &mut JNIEnv, value: String) -> jstring {
    match env.new_string(value) {
        Ok(s) => s.into_raw(),
        Err(e) => {
            tracing::error!(error = %e, "failed to create Java string");
            std::ptr::null_mut()
        }
    }
}

// ============================================================================
// LIFECYCLE
// ============================================================================

/// Initialize the cache
///
/// # Returns (JSON)
/// ```json
/// { "success": true, "data": { "cache_directory": "/data/.../video_cache" } }
/// ```
#[no_mangle]
pub extern "C" fn Java_io_flutter_plugins_videoplayer_VideoCacheManager_nativeInitializeCache(
    mut env: JNIEnv,
    _class: JClass,
    cache_directory: JString,
    max_concurrent_downloads: jint,
) -> jstring {
    let directory = jstring_to_string(&mut env, &cache_directory);

    let response = catch_panic(move || {
        let result = directory.and_then(|directory| {
            bridge::initialize_cache(directory, max_concurrent_downloads.max(0) as u32)
                .map_err(|e| crate::CacheError::internal(e.to_string()))?;
            let manager = bridge::manager().ok_or(crate::CacheError::NotInitialized)?;
            Ok(serde_json::json!({
                "cache_directory": manager.cache_directory().display().to_string(),
                "max_concurrent_downloads": manager.get_max_concurrent_downloads(),
            }))
        });
        result_to_json(result)
    });

    into_jstring(&mut env, response)
}

// ============================================================================
// DOWNLOAD OPERATIONS
// ============================================================================

/// Returns the download token, or "" if the URL was rejected
#[no_mangle]
pub extern "C" fn Java_io_flutter_plugins_videoplayer_VideoCacheManager_nativeStartDownload(
    mut env: JNIEnv,
    _class: JClass,
    url: JString,
) -> jstring {
    let url = url_arg(&mut env, &url);
    let token = catch_panic_or(String::new(), move || bridge::start_download(url));
    into_jstring(&mut env, token)
}

#[no_mangle]
pub extern "C" fn Java_io_flutter_plugins_videoplayer_VideoCacheManager_nativeCancelDownload(
    mut env: JNIEnv,
    _class: JClass,
    url: JString,
) -> jboolean {
    let url = url_arg(&mut env, &url);
    to_jboolean(catch_panic_or(false, move || bridge::cancel_download(url)))
}

#[no_mangle]
pub extern "C" fn Java_io_flutter_plugins_videoplayer_VideoCacheManager_nativeRemoveDownload(
    mut env: JNIEnv,
    _class: JClass,
    url: JString,
) -> jboolean {
    let url = url_arg(&mut env, &url);
    to_jboolean(catch_panic_or(false, move || bridge::remove_download(url)))
}

#[no_mangle]
pub extern "C" fn Java_io_flutter_plugins_videoplayer_VideoCacheManager_nativeSetMaxConcurrentDownloads(
    _env: JNIEnv,
    _class: JClass,
    max_concurrent_downloads: jint,
) -> jboolean {
    if max_concurrent_downloads <= 0 {
        return JNI_FALSE;
    }
    to_jboolean(catch_panic_or(false, move || {
        bridge::set_max_concurrent_downloads(max_concurrent_downloads as u32)
    }))
}

// ============================================================================
// QUERIES
// ============================================================================

#[no_mangle]
pub extern "C" fn Java_io_flutter_plugins_videoplayer_VideoCacheManager_nativeGetDownloadProgress(
    mut env: JNIEnv,
    _class: JClass,
    url: JString,
) -> jdouble {
    let url = url_arg(&mut env, &url);
    catch_panic_or(0.0, move || bridge::get_download_progress(url))
}

#[no_mangle]
pub extern "C" fn Java_io_flutter_plugins_videoplayer_VideoCacheManager_nativeGetBytesDownloaded(
    mut env: JNIEnv,
    _class: JClass,
    url: JString,
) -> jlong {
    let url = url_arg(&mut env, &url);
    catch_panic_or(0, move || bridge::get_bytes_downloaded(url))
}

#[no_mangle]
pub extern "C" fn Java_io_flutter_plugins_videoplayer_VideoCacheManager_nativeIsVideoCached(
    mut env: JNIEnv,
    _class: JClass,
    url: JString,
) -> jboolean {
    let url = url_arg(&mut env, &url);
    to_jboolean(catch_panic_or(false, move || bridge::is_video_cached(url)))
}

/// -1 absent, 0 not started, 1 queued, 2 downloading, 3 completed,
/// 4 failed, 5 cancelled
#[no_mangle]
pub extern "C" fn Java_io_flutter_plugins_videoplayer_VideoCacheManager_nativeGetDownloadState(
    mut env: JNIEnv,
    _class: JClass,
    url: JString,
) -> jint {
    let url = url_arg(&mut env, &url);
    catch_panic_or(crate::download::ABSENT_STATE_CODE, move || {
        bridge::get_download_state(url)
    })
}

#[no_mangle]
pub extern "C" fn Java_io_flutter_plugins_videoplayer_VideoCacheManager_nativeGetMaxConcurrentDownloads(
    _env: JNIEnv,
    _class: JClass,
) -> jint {
    let max = catch_panic_or(crate::config::DEFAULT_MAX_CONCURRENT_DOWNLOADS as u32, || {
        bridge::get_max_concurrent_downloads()
    });
    jint::try_from(max).unwrap_or(jint::MAX)
}

/// # Returns (JSON)
/// ```json
/// { "success": true, "data": "/data/.../video_cache/3f2a....mp4" }
/// ```
/// `data` is `null` when the URL is not cached.
#[no_mangle]
pub extern "C" fn Java_io_flutter_plugins_videoplayer_VideoCacheManager_nativeGetCachedVideoPath(
    mut env: JNIEnv,
    _class: JClass,
    url: JString,
) -> jstring {
    let url = url_arg(&mut env, &url);
    let response = catch_panic(move || success_response(bridge::get_cached_video_path(url)));
    into_jstring(&mut env, response)
}

/// # Returns (JSON)
/// ```json
/// {
///   "success": true,
///   "data": {
///     "url": "https://.../a.mp4",
///     "path": "/data/.../video_cache/3f2a....mp4",
///     "format": "progressive",
///     "mime_type": "video/mp4",
///     "size_bytes": 1048576
///   }
/// }
/// ```
#[no_mangle]
pub extern "C" fn Java_io_flutter_plugins_videoplayer_VideoCacheManager_nativeGetAssetForUrl(
    mut env: JNIEnv,
    _class: JClass,
    url: JString,
) -> jstring {
    let url = url_arg(&mut env, &url);
    let response = catch_panic(move || {
        let asset = bridge::manager().and_then(|m| m.get_asset_for_url(&url));
        success_response(asset)
    });
    into_jstring(&mut env, response)
}

/// Detailed progress record (`null` data for unknown URLs)
#[no_mangle]
pub extern "C" fn Java_io_flutter_plugins_videoplayer_VideoCacheManager_nativeGetDownloadProgressInfo(
    mut env: JNIEnv,
    _class: JClass,
    url: JString,
) -> jstring {
    let url = url_arg(&mut env, &url);
    let response = catch_panic(move || {
        let progress = bridge::manager().and_then(|m| m.get_download_progress_info(&url));
        success_response(progress)
    });
    into_jstring(&mut env, response)
}

#[no_mangle]
pub extern "C" fn Java_io_flutter_plugins_videoplayer_VideoCacheManager_nativeListDownloads(
    mut env: JNIEnv,
    _class: JClass,
) -> jstring {
    let response = catch_panic(|| {
        let result = bridge::manager()
            .map(|m| m.list_downloads())
            .ok_or(crate::CacheError::NotInitialized);
        result_to_json(result)
    });
    into_jstring(&mut env, response)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_response() {
        let response = success_response(serde_json::json!({"path": "/tmp/a.mp4"}));
        assert!(response.contains("\"success\":true"));
        assert!(response.contains("/tmp/a.mp4"));
    }

    #[test]
    fn test_error_response() {
        let response = error_response("Test error");
        assert!(response.contains("\"success\":false"));
        assert!(response.contains("Test error"));
    }

    #[test]
    fn test_result_to_json_error() {
        let result: crate::Result<String> = Err(crate::CacheError::NotInitialized);
        let json = result_to_json(result);
        assert!(json.contains("\"success\":false"));
    }

    #[test]
    fn test_catch_panic_with_panic() {
        let result = catch_panic(|| {
            panic!("test panic");
        });
        assert!(result.contains("\"success\":false"));
        assert!(result.contains("test panic"));

        assert_eq!(catch_panic_or(-1, || -> i32 { panic!("boom") }), -1);
    }
}
