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


//! URL keys
//!
//! Every lookup in the registry, scheduler and storage goes through a
//! `UrlKey`. Two spellings of the same resource (case of scheme/host, default
//! port, fragment) produce the same key.
//!
//! # Derived identifiers
//! - Download token: URL-safe base64 of the normalized URL, handed back from
//!   `start_download` and reversible with [`UrlKey::from_token`]
//! - Storage file name: SHA-256 hex of the normalized URL plus the URL's
//!   extension (`.bin` when it has none)

use crate::asset::StreamingFormat;
use crate::error::{CacheError, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;
use url::Url;

/// Extension used when the URL path has none we can trust
const FALLBACK_EXTENSION: &str = "bin";

/// Longest extension carried over from the URL
const MAX_EXTENSION_LENGTH: usize = 5;

/// Normalized identifier of a remote video
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UrlKey(String);

impl UrlKey {
    /// Normalize a raw URL string into a key
    ///
    /// Only `http` and `https` are accepted; that is all the transport speaks.
    pub fn normalize(raw: &str) -> Result<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            return Err(CacheError::invalid_url("URL is empty"));
        }

        let mut url = Url::parse(trimmed)
            .map_err(|e| CacheError::invalid_url(format!("{}: {}", trimmed, e)))?;

        match url.scheme() {
            "http" | "https" => {}
            other => {
                return Err(CacheError::invalid_url(format!(
                    "unsupported scheme '{}' in {}",
                    other, trimmed
                )))
            }
        }

        if url.host_str().map_or(true, str::is_empty) {
            return Err(CacheError::invalid_url(format!("missing host in {}", trimmed)));
        }

        url.set_fragment(None);
        Ok(Self(url.to_string()))
    }

    /// Recover the key from a download token
    pub fn from_token(token: &str) -> Result<Self> {
        let bytes = URL_SAFE_NO_PAD
            .decode(token.trim())
            .map_err(|e| CacheError::invalid_url(format!("invalid download token: {}", e)))?;
        let url = String::from_utf8(bytes)
            .map_err(|e| CacheError::invalid_url(format!("invalid download token: {}", e)))?;
        Self::normalize(&url)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Download token returned to callers
    pub fn token(&self) -> String {
        URL_SAFE_NO_PAD.encode(self.0.as_bytes())
    }

    /// Lowercase hex SHA-256 of the normalized URL
    pub fn digest(&self) -> String {
        hex::encode(Sha256::digest(self.0.as_bytes()))
    }

    /// Extension of the last path segment, lowercased
    pub fn extension(&self) -> String {
        Url::parse(&self.0)
            .ok()
            .and_then(|url| {
                url.path_segments()
                    .and_then(|segments| segments.last())
                    .and_then(|segment| segment.rsplit_once('.'))
                    .map(|(_, ext)| ext.to_ascii_lowercase())
            })
            .filter(|ext| {
                !ext.is_empty()
                    && ext.len() <= MAX_EXTENSION_LENGTH
                    && ext.chars().all(|c| c.is_ascii_alphanumeric())
            })
            .unwrap_or_else(|| FALLBACK_EXTENSION.to_string())
    }

    /// File name of the completed download inside the cache root
    pub fn file_name(&self) -> String {
        format!("{}.{}", self.digest(), self.extension())
    }

    pub fn streaming_format(&self) -> StreamingFormat {
        StreamingFormat::from_extension(&self.extension())
    }

    pub fn mime_type(&self) -> Option<&'static str> {
        let extension = self.extension();
        StreamingFormat::from_extension(&extension).mime_type(&extension)
    }
}

impl fmt::Display for UrlKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}
