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


//! Per-URL download entry
//!
//! Every mutation that comes from a download task carries the attempt number
//! it was started with. A task that outlives its attempt (cancelled, removed,
//! restarted) can therefore never overwrite the state of a newer attempt.

use crate::download::progress::{progress_fraction, DownloadProgress, DownloadState, SpeedTracker};
use crate::error::Result;
use crate::key::UrlKey;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tokio_util::sync::CancellationToken;

/// Attempt numbers are unique for the life of the process
static NEXT_ATTEMPT: AtomicU64 = AtomicU64::new(1);

fn next_attempt() -> u64 {
    NEXT_ATTEMPT.fetch_add(1, Ordering::Relaxed)
}

/// Registry record for one URL key
#[derive(Debug)]
pub struct DownloadEntry {
    key: UrlKey,
    inner: Mutex<EntryInner>,
}

#[derive(Debug)]
struct EntryInner {
    state: DownloadState,
    bytes_downloaded: u64,
    total_bytes: Option<u64>,
    cached_path: Option<PathBuf>,
    last_error: Option<String>,
    attempt: u64,
    cancel: CancellationToken,
    speed: SpeedTracker,
    requested_at: DateTime<Utc>,
    completed_at: Option<DateTime<Utc>>,
    last_accessed: DateTime<Utc>,
}

impl EntryInner {
    fn owns(&self, attempt: u64) -> bool {
        self.attempt == attempt && self.state.is_in_flight()
    }
}

/// Point-in-time copy of an entry
#[derive(Debug, Clone)]
pub struct EntrySnapshot {
    pub key: UrlKey,
    pub state: DownloadState,
    pub bytes_downloaded: u64,
    pub total_bytes: Option<u64>,
    pub cached_path: Option<PathBuf>,
    pub last_error: Option<String>,
    pub attempt: u64,
    pub download_speed: f64,
    pub eta_seconds: Option<u64>,
    pub requested_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_accessed: DateTime<Utc>,
}

impl EntrySnapshot {
    pub fn progress(&self) -> f64 {
        progress_fraction(self.state, self.bytes_downloaded, self.total_bytes)
    }

    pub fn to_progress(&self) -> DownloadProgress {
        DownloadProgress {
            url: self.key.as_str().to_string(),
            token: self.key.token(),
            state: self.state,
            bytes_downloaded: self.bytes_downloaded,
            total_bytes: self.total_bytes,
            progress: self.progress(),
            download_speed: self.download_speed,
            eta_seconds: self.eta_seconds,
            error_message: self.last_error.clone(),
        }
    }
}

impl DownloadEntry {
    /// New entry in `NotStarted`
    pub fn new(key: UrlKey) -> Self {
        let now = Utc::now();
        Self {
            key,
            inner: Mutex::new(EntryInner {
                state: DownloadState::NotStarted,
                bytes_downloaded: 0,
                total_bytes: None,
                cached_path: None,
                last_error: None,
                attempt: 0,
                cancel: CancellationToken::new(),
                speed: SpeedTracker::new(),
                requested_at: now,
                completed_at: None,
                last_accessed: now,
            }),
        }
    }

    /// Completed entry recovered from the download index
    pub fn restored(
        key: UrlKey,
        path: PathBuf,
        size: u64,
        completed_at: Option<DateTime<Utc>>,
        last_accessed: DateTime<Utc>,
    ) -> Self {
        let entry = Self::new(key);
        {
            let mut inner = entry.inner.lock();
            inner.state = DownloadState::Completed;
            inner.bytes_downloaded = size;
            inner.total_bytes = Some(size);
            inner.cached_path = Some(path);
            inner.completed_at = completed_at;
            inner.last_accessed = last_accessed;
        }
        entry
    }

    pub fn key(&self) -> &UrlKey {
        &self.key
    }

    pub fn state(&self) -> DownloadState {
        self.inner.lock().state
    }

    pub fn attempt(&self) -> u64 {
        self.inner.lock().attempt
    }

    /// Cached path, only while `Completed`
    pub fn completed_path(&self) -> Option<PathBuf> {
        let inner = self.inner.lock();
        match inner.state {
            DownloadState::Completed => inner.cached_path.clone(),
            _ => None,
        }
    }

    pub fn snapshot(&self) -> EntrySnapshot {
        let inner = self.inner.lock();
        let eta_seconds = match (inner.state, inner.total_bytes) {
            (DownloadState::Downloading, Some(total)) => inner
                .speed
                .estimate_time_remaining(total.saturating_sub(inner.bytes_downloaded))
                .map(|eta| eta.as_secs()),
            _ => None,
        };
        let download_speed = match inner.state {
            DownloadState::Downloading => inner.speed.average_speed(),
            _ => 0.0,
        };

        EntrySnapshot {
            key: self.key.clone(),
            state: inner.state,
            bytes_downloaded: inner.bytes_downloaded,
            total_bytes: inner.total_bytes,
            cached_path: inner.cached_path.clone(),
            last_error: inner.last_error.clone(),
            attempt: inner.attempt,
            download_speed,
            eta_seconds,
            requested_at: inner.requested_at,
            completed_at: inner.completed_at,
            last_accessed: inner.last_accessed,
        }
    }

    /// Start a new attempt in `Queued` with fresh counters and a fresh token
    pub fn begin_attempt(&self) -> (u64, CancellationToken) {
        let mut inner = self.inner.lock();
        let attempt = next_attempt();

        inner.state = DownloadState::Queued;
        inner.attempt = attempt;
        inner.cancel = CancellationToken::new();
        inner.bytes_downloaded = 0;
        inner.total_bytes = None;
        inner.cached_path = None;
        inner.last_error = None;
        inner.completed_at = None;
        inner.requested_at = Utc::now();
        inner.speed.reset();

        (attempt, inner.cancel.clone())
    }

    /// `Queued → Downloading` for the given attempt
    ///
    /// Returns the attempt's cancellation token, or `None` if the attempt is
    /// stale or was cancelled while it waited for a slot.
    pub fn mark_downloading(&self, attempt: u64) -> Option<CancellationToken> {
        let mut inner = self.inner.lock();
        if inner.attempt != attempt
            || inner.state != DownloadState::Queued
            || inner.cancel.is_cancelled()
        {
            return None;
        }
        inner.state = DownloadState::Downloading;
        Some(inner.cancel.clone())
    }

    /// Record progress; the byte counter never decreases
    pub fn update_progress(&self, attempt: u64, bytes: u64, total: Option<u64>) -> bool {
        let mut inner = self.inner.lock();
        if inner.attempt != attempt || inner.state != DownloadState::Downloading {
            return false;
        }
        if bytes > inner.bytes_downloaded {
            inner.bytes_downloaded = bytes;
        }
        if total.is_some() {
            inner.total_bytes = total;
        }
        let position = inner.bytes_downloaded;
        inner.speed.add_position(position);
        true
    }

    /// Publish a finished attempt
    ///
    /// `finalize` moves the partial file onto `target` and runs under the
    /// entry lock, so a concurrent cancel either happens before it (nothing is
    /// moved, `Ok(false)`) or after it (the entry is already `Completed`).
    pub fn commit<F>(&self, attempt: u64, target: &Path, bytes: u64, finalize: F) -> Result<bool>
    where
        F: FnOnce() -> Result<()>,
    {
        let mut inner = self.inner.lock();
        if inner.attempt != attempt
            || inner.state != DownloadState::Downloading
            || inner.cancel.is_cancelled()
        {
            return Ok(false);
        }

        finalize()?;

        let now = Utc::now();
        inner.state = DownloadState::Completed;
        inner.bytes_downloaded = inner.bytes_downloaded.max(bytes);
        inner.total_bytes = Some(inner.bytes_downloaded);
        inner.cached_path = Some(target.to_path_buf());
        inner.completed_at = Some(now);
        inner.last_accessed = now;
        Ok(true)
    }

    pub fn fail(&self, attempt: u64, message: String) -> bool {
        let mut inner = self.inner.lock();
        if !inner.owns(attempt) {
            return false;
        }
        inner.state = DownloadState::Failed;
        inner.last_error = Some(message);
        true
    }

    pub fn mark_cancelled(&self, attempt: u64) -> bool {
        let mut inner = self.inner.lock();
        if !inner.owns(attempt) {
            return false;
        }
        inner.state = DownloadState::Cancelled;
        true
    }

    /// Trip the cancellation token of an in-flight attempt
    ///
    /// A queued attempt has no task to observe the token, so it moves to
    /// `Cancelled` right away. A downloading attempt stays `Downloading` until
    /// its task reaches the next chunk boundary. Returns the state seen and the
    /// attempt number, or `None` when there was nothing to cancel.
    pub fn request_cancel(&self) -> Option<(DownloadState, u64)> {
        let mut inner = self.inner.lock();
        let previous = inner.state;
        if !previous.is_in_flight() {
            return None;
        }
        inner.cancel.cancel();
        if previous == DownloadState::Queued {
            inner.state = DownloadState::Cancelled;
        }
        Some((previous, inner.attempt))
    }

    /// Unconditional state change used by the registry
    ///
    /// Leaving `Completed` drops the cached path; moving to `NotStarted` also
    /// resets the counters.
    pub fn set_state(&self, state: DownloadState) {
        let mut inner = self.inner.lock();
        inner.state = state;
        if state != DownloadState::Completed {
            inner.cached_path = None;
        }
        if state == DownloadState::NotStarted {
            inner.bytes_downloaded = 0;
            inner.total_bytes = None;
            inner.completed_at = None;
            inner.speed.reset();
        }
    }

    /// Mark the cached file as used
    pub fn touch(&self) {
        self.inner.lock().last_accessed = Utc::now();
    }
}
