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


//! Playable handles for the playback engine
//!
//! A `VideoAsset` is only ever built from a completed entry whose file passed
//! an existence check, so the player never sees a partial download.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Container/streaming format hint derived from the URL extension
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamingFormat {
    /// Single progressive file (mp4, mov, webm, ...)
    Progressive,
    /// HTTP Live Streaming playlist
    Hls,
    /// MPEG-DASH manifest
    Dash,
    /// Smooth Streaming manifest
    Smooth,
    /// Unknown; the player sniffs the container itself
    Other,
}

impl StreamingFormat {
    pub fn from_extension(extension: &str) -> Self {
        match extension.to_ascii_lowercase().as_str() {
            "mp4" | "m4v" | "mov" | "webm" | "mkv" => StreamingFormat::Progressive,
            "m3u8" => StreamingFormat::Hls,
            "mpd" => StreamingFormat::Dash,
            "ism" | "isml" => StreamingFormat::Smooth,
            _ => StreamingFormat::Other,
        }
    }

    /// MIME type to hand to the player, if the format implies one
    pub fn mime_type(&self, extension: &str) -> Option<&'static str> {
        match self {
            StreamingFormat::Hls => Some("application/x-mpegURL"),
            StreamingFormat::Dash => Some("application/dash+xml"),
            StreamingFormat::Smooth => Some("application/vnd.ms-sstr+xml"),
            StreamingFormat::Progressive => match extension.to_ascii_lowercase().as_str() {
                "webm" => Some("video/webm"),
                "mov" => Some("video/quicktime"),
                "mkv" => Some("video/x-matroska"),
                _ => Some("video/mp4"),
            },
            StreamingFormat::Other => None,
        }
    }
}

/// Handle to a fully downloaded video on local storage
///
/// The cache stores exactly the bytes served at the URL. For
/// [`StreamingFormat::Progressive`] that is the whole video. For manifest
/// formats ([`StreamingFormat::Hls`], [`StreamingFormat::Dash`],
/// [`StreamingFormat::Smooth`]) only the playlist is cached; its segment
/// URIs still point at the network, so such an asset does not play offline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VideoAsset {
    /// Normalized remote URL the asset was downloaded from
    pub url: String,

    /// Local path of the completed file
    pub path: PathBuf,

    pub format: StreamingFormat,

    pub mime_type: Option<String>,

    /// Size of the file on disk
    pub size_bytes: u64,
}

impl VideoAsset {
    /// `file://` URI for players that only accept URIs
    pub fn file_uri(&self) -> Option<String> {
        url::Url::from_file_path(&self.path).ok().map(|u| u.to_string())
    }
}
