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


//! Download management
//!
//! Caller → [`VideoCacheManager`] → [`registry`] (lookup/create entry) →
//! [`scheduler`] (admit or queue) → [`task`] (transfer into storage, update the
//! entry) → caller polls state and progress.

pub mod entry;
pub mod index;
pub mod manager;
pub mod progress;
pub mod registry;
pub mod scheduler;
pub mod task;

// Re-export commonly used types
pub use manager::VideoCacheManager;
pub use progress::{DownloadProgress, DownloadState, ABSENT_STATE_CODE};
