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


//! Error types for the video cache
//!
//! # Error Taxonomy
//!
//! ### Lookup
//! - Queries on a URL with no registry entry are not faults. The facade
//!   reports them as `false`/`None`/`0`.
//!
//! ### Transfer (inside a download task)
//! - `NetworkError`, `UnexpectedStatusCode`, `DownloadIncomplete`, plus I/O
//!   while writing the partial file.
//! - A cancelled transfer is an outcome, not an error.
//! - Recorded on the entry as `Failed` with a message. Never returned from
//!   `start_download`, which only schedules work.
//!
//! ### Storage / Initialization
//! - `StorageRootUnavailable` is the one global fatal condition and is
//!   returned synchronously from cache initialization.
//!
//! ### Corruption
//! - A completed entry whose file disappeared is demoted lazily on lookup.
//!   No error type is raised for it.

use thiserror::Error;

/// Result type alias using our CacheError type
pub type Result<T> = std::result::Result<T, CacheError>;

/// Main error type for the video cache
#[derive(Error, Debug)]
pub enum CacheError {
    // ===== Transfer Errors =====

    /// Network connectivity error
    #[error("Network error: {message}")]
    NetworkError {
        message: String,
        /// Whether this error might be transient
        is_transient: bool,
    },

    /// Server returned a non-success status code
    #[error("Server responded with unexpected status code {status_code} for {url}")]
    UnexpectedStatusCode {
        status_code: u16,
        url: String,
    },

    /// Stream ended before the announced content length was received
    #[error("Download incomplete: expected {expected} bytes, got {actual} bytes")]
    DownloadIncomplete {
        expected: u64,
        actual: u64,
    },

    // ===== Storage Errors =====

    /// Cache root directory could not be created or used
    #[error("Cache directory unavailable: {path}: {message}")]
    StorageRootUnavailable {
        path: String,
        message: String,
    },

    /// Generic file I/O error with context
    #[error("File I/O error: {0}")]
    FileIoError(String),

    // ===== Input/State Errors =====

    /// URL is empty, unparsable or uses an unsupported scheme
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Configuration is invalid or incomplete
    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),

    /// The process-wide cache was used before `initialize_cache`
    #[error("Video cache has not been initialized")]
    NotInitialized,

    /// Internal error that should not normally occur
    #[error("Internal error: {0}")]
    InternalError(String),

    // ===== External Library Errors =====

    /// HTTP client error from reqwest
    #[error("HTTP client error: {0}")]
    ReqwestError(#[from] reqwest::Error),

    /// JSON serialization/deserialization error
    #[error("JSON serialization error: {0}")]
    SerdeJsonError(#[from] serde_json::Error),

    /// Standard I/O error
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CacheError {
    /// Create an InvalidUrl error
    pub fn invalid_url<S: Into<String>>(message: S) -> Self {
        CacheError::InvalidUrl(message.into())
    }

    /// Create a NetworkError
    pub fn network_error<S: Into<String>>(message: S, is_transient: bool) -> Self {
        CacheError::NetworkError {
            message: message.into(),
            is_transient,
        }
    }

    /// Create a FileIoError with path context
    pub fn file_io<P: AsRef<std::path::Path>>(action: &str, path: P, err: std::io::Error) -> Self {
        CacheError::FileIoError(format!("{} {}: {}", action, path.as_ref().display(), err))
    }

    /// Create an InternalError
    pub fn internal<S: Into<String>>(message: S) -> Self {
        CacheError::InternalError(message.into())
    }

    /// Check if error is retryable (transient network errors, 5xx)
    ///
    /// The cache never retries on its own; callers use this to decide whether
    /// calling `start_download` again is worthwhile.
    pub fn is_retryable(&self) -> bool {
        match self {
            CacheError::NetworkError { is_transient, .. } => *is_transient,
            CacheError::UnexpectedStatusCode { status_code, .. } => {
                *status_code == 408 || *status_code == 429 || (500..=599).contains(status_code)
            }
            CacheError::DownloadIncomplete { .. } => true,
            CacheError::ReqwestError(e) => e.is_timeout() || e.is_connect(),
            _ => false,
        }
    }

    /// Check if error belongs to a download task's transfer
    pub fn is_transfer_error(&self) -> bool {
        matches!(
            self,
            CacheError::NetworkError { .. }
                | CacheError::UnexpectedStatusCode { .. }
                | CacheError::DownloadIncomplete { .. }
                | CacheError::ReqwestError(_)
                | CacheError::FileIoError(_)
                | CacheError::IoError(_)
        )
    }

    /// Get user-friendly error message suitable for display
    pub fn user_message(&self) -> String {
        match self {
            CacheError::UnexpectedStatusCode { status_code: 404, .. } => {
                "The video could not be found on the server.".to_string()
            }
            CacheError::UnexpectedStatusCode { status_code: 401 | 403, .. } => {
                "Access to the video was denied by the server.".to_string()
            }
            CacheError::NetworkError { .. } | CacheError::ReqwestError(_) => {
                "Network connection problem while downloading the video. Please try again.".to_string()
            }
            CacheError::DownloadIncomplete { .. } => {
                "The download was interrupted before it finished. Please try again.".to_string()
            }
            CacheError::StorageRootUnavailable { path, .. } => {
                format!("The video cache folder '{}' could not be created.", path)
            }
            CacheError::InvalidUrl(_) => "The video URL is not valid.".to_string(),
            _ => self.to_string(),
        }
    }
}
