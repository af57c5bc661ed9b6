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


//! Download state and progress reporting
//!
//! # Progress Information
//! - URL and download token for identification
//! - Bytes downloaded / total bytes (total may be unknown)
//! - Fraction complete (0.0 - 1.0)
//! - Current speed with a moving average
//! - Estimated time remaining
//! - Download state and last error

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::time::{Duration, Instant};

/// State code reported for URLs with no registry entry
pub const ABSENT_STATE_CODE: i32 = -1;

/// Lifecycle of one URL
///
/// `NotStarted → Queued → Downloading → {Completed | Failed | Cancelled}`.
/// `NotStarted`, `Failed` and `Cancelled` can be restarted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DownloadState {
    /// Entry exists but no attempt is scheduled
    NotStarted,
    /// Waiting for a scheduler slot
    Queued,
    /// Transfer in progress
    Downloading,
    /// File fully written and available
    Completed,
    /// Transfer or storage failure
    Failed,
    /// Cancelled by a caller
    Cancelled,
}

impl DownloadState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DownloadState::NotStarted => "not_started",
            DownloadState::Queued => "queued",
            DownloadState::Downloading => "downloading",
            DownloadState::Completed => "completed",
            DownloadState::Failed => "failed",
            DownloadState::Cancelled => "cancelled",
        }
    }

    /// Integer code used across the invocation surface
    pub fn code(&self) -> i32 {
        match self {
            DownloadState::NotStarted => 0,
            DownloadState::Queued => 1,
            DownloadState::Downloading => 2,
            DownloadState::Completed => 3,
            DownloadState::Failed => 4,
            DownloadState::Cancelled => 5,
        }
    }

    pub fn from_code(code: i32) -> Option<Self> {
        match code {
            0 => Some(DownloadState::NotStarted),
            1 => Some(DownloadState::Queued),
            2 => Some(DownloadState::Downloading),
            3 => Some(DownloadState::Completed),
            4 => Some(DownloadState::Failed),
            5 => Some(DownloadState::Cancelled),
            _ => None,
        }
    }

    /// Code for an optional state, [`ABSENT_STATE_CODE`] when there is no entry
    pub fn code_of(state: Option<Self>) -> i32 {
        state.map_or(ABSENT_STATE_CODE, |s| s.code())
    }

    /// Check if state is terminal (completed, failed, or cancelled)
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            DownloadState::Completed | DownloadState::Failed | DownloadState::Cancelled
        )
    }

    /// Queued or downloading
    pub fn is_in_flight(&self) -> bool {
        matches!(self, DownloadState::Queued | DownloadState::Downloading)
    }

    /// Whether `start_download` begins a new attempt from this state
    pub fn can_restart(&self) -> bool {
        matches!(
            self,
            DownloadState::NotStarted | DownloadState::Failed | DownloadState::Cancelled
        )
    }
}

/// Fraction complete for the given counters
///
/// Completed is always 1.0; otherwise bytes over a known non-zero total,
/// else 0.0.
pub fn progress_fraction(state: DownloadState, bytes_downloaded: u64, total_bytes: Option<u64>) -> f64 {
    if state == DownloadState::Completed {
        return 1.0;
    }
    match total_bytes {
        Some(total) if total > 0 => (bytes_downloaded as f64 / total as f64).min(1.0),
        _ => 0.0,
    }
}

/// Progress snapshot for a single download
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DownloadProgress {
    /// Normalized URL
    pub url: String,

    /// Download token returned by `start_download`
    pub token: String,

    pub state: DownloadState,

    /// Bytes downloaded so far
    pub bytes_downloaded: u64,

    /// Total bytes to download, once known
    pub total_bytes: Option<u64>,

    /// Fraction complete (0.0 - 1.0)
    pub progress: f64,

    /// Current download speed in bytes per second
    pub download_speed: f64,

    /// Estimated time remaining in seconds
    pub eta_seconds: Option<u64>,

    /// Error message if state is Failed
    pub error_message: Option<String>,
}

impl DownloadProgress {
    /// Format download speed as human-readable string (e.g., "2.5 MB/s")
    pub fn speed_string(&self) -> String {
        let mb_per_sec = self.download_speed / 1_000_000.0;
        format!("{:.1} MB/s", mb_per_sec)
    }

    /// Format ETA as human-readable string (e.g., "5m 30s")
    pub fn eta_string(&self) -> String {
        let eta = match self.eta_seconds {
            Some(eta) if eta > 0 => eta,
            _ => return "calculating...".to_string(),
        };

        let hours = eta / 3600;
        let minutes = (eta % 3600) / 60;
        let seconds = eta % 60;

        if hours > 0 {
            format!("{}h {}m", hours, minutes)
        } else if minutes > 0 {
            format!("{}m {}s", minutes, seconds)
        } else {
            format!("{}s", seconds)
        }
    }

    /// Format bytes as human-readable string (e.g., "45.2 MB")
    pub fn bytes_string(bytes: u64) -> String {
        let mb = bytes as f64 / 1_000_000.0;
        format!("{:.1} MB", mb)
    }

    /// Format progress as display string
    pub fn display_string(&self) -> String {
        match self.state {
            DownloadState::NotStarted => format!("{}: Not started", self.url),
            DownloadState::Queued => format!("{}: Queued", self.url),
            DownloadState::Downloading => {
                let total = self
                    .total_bytes
                    .map(Self::bytes_string)
                    .unwrap_or_else(|| "?".to_string());
                format!(
                    "{}: {:.1}% ({} / {}) - {} - {}",
                    self.url,
                    self.progress * 100.0,
                    Self::bytes_string(self.bytes_downloaded),
                    total,
                    self.speed_string(),
                    self.eta_string()
                )
            }
            DownloadState::Completed => format!("{}: Completed", self.url),
            DownloadState::Failed => format!(
                "{}: Failed - {}",
                self.url,
                self.error_message.as_deref().unwrap_or("Unknown error")
            ),
            DownloadState::Cancelled => format!("{}: Cancelled", self.url),
        }
    }
}

/// Speed tracker with moving average
///
/// Uses a sliding window to smooth out network fluctuations.
#[derive(Debug, Clone)]
pub struct SpeedTracker {
    /// Samples within the time window
    samples: VecDeque<SpeedSample>,

    /// Time window for averaging (default 10 seconds)
    window_duration: Duration,
}

#[derive(Debug, Clone)]
struct SpeedSample {
    timestamp: Instant,
    /// Total bytes at this point in time
    position: u64,
}

impl SpeedTracker {
    /// Create new speed tracker with default 10-second window
    pub fn new() -> Self {
        Self::with_window(Duration::from_secs(10))
    }

    pub fn with_window(window_duration: Duration) -> Self {
        Self {
            samples: VecDeque::new(),
            window_duration,
        }
    }

    /// Add a position sample (total bytes downloaded so far)
    pub fn add_position(&mut self, position: u64) {
        let now = Instant::now();
        self.samples.push_back(SpeedSample {
            timestamp: now,
            position,
        });

        // Keep at least two samples so a stalled transfer still reports a rate
        while self.samples.len() > 2 {
            match self.samples.front() {
                Some(sample) if now.duration_since(sample.timestamp) > self.window_duration => {
                    self.samples.pop_front();
                }
                _ => break,
            }
        }
    }

    /// Get current average speed in bytes per second
    pub fn average_speed(&self) -> f64 {
        let (first, last) = match (self.samples.front(), self.samples.back()) {
            (Some(first), Some(last)) if self.samples.len() >= 2 => (first, last),
            _ => return 0.0,
        };

        let bytes_delta = last.position.saturating_sub(first.position);
        let time_delta = last.timestamp.duration_since(first.timestamp).as_secs_f64();

        if time_delta > 0.0 {
            bytes_delta as f64 / time_delta
        } else {
            0.0
        }
    }

    /// Estimate time remaining based on current speed
    ///
    /// `None` while there is no rate yet, or when the estimate does not fit a
    /// `Duration` (a huge announced length over a near-stalled link).
    pub fn estimate_time_remaining(&self, bytes_remaining: u64) -> Option<Duration> {
        let speed = self.average_speed();
        if speed > 0.0 {
            Duration::try_from_secs_f64(bytes_remaining as f64 / speed).ok()
        } else {
            None
        }
    }

    pub fn reset(&mut self) {
        self.samples.clear();
    }
}

impl Default for SpeedTracker {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_state_codes() {
        for code in 0..=5 {
            let state = DownloadState::from_code(code).unwrap();
            assert_eq!(state.code(), code);
        }
        assert_eq!(DownloadState::from_code(ABSENT_STATE_CODE), None);
        assert_eq!(DownloadState::code_of(None), ABSENT_STATE_CODE);
        assert_eq!(DownloadState::code_of(Some(DownloadState::Completed)), 3);
    }

    #[test]
    fn test_restartable_states() {
        assert!(DownloadState::Failed.can_restart());
        assert!(DownloadState::Cancelled.can_restart());
        assert!(DownloadState::NotStarted.can_restart());
        assert!(!DownloadState::Completed.can_restart());
        assert!(!DownloadState::Downloading.can_restart());
        assert!(DownloadState::Queued.is_in_flight());
        assert!(!DownloadState::Queued.is_terminal());
    }

    #[test]
    fn test_progress_fraction() {
        assert_eq!(progress_fraction(DownloadState::Downloading, 250, Some(1000)), 0.25);
        assert_eq!(progress_fraction(DownloadState::Downloading, 250, None), 0.0);
        assert_eq!(progress_fraction(DownloadState::Downloading, 250, Some(0)), 0.0);
        assert_eq!(progress_fraction(DownloadState::Completed, 0, None), 1.0);
        assert_eq!(progress_fraction(DownloadState::Downloading, 1200, Some(1000)), 1.0);
    }

    #[test]
    fn test_speed_tracker() {
        let mut tracker = SpeedTracker::new();

        // Simulate downloading 1MB per second
        tracker.add_position(0);
        thread::sleep(Duration::from_millis(100));
        tracker.add_position(100_000);

        let speed = tracker.average_speed();
        assert!(speed > 500_000.0 && speed < 1_100_000.0);
        assert!(tracker.estimate_time_remaining(1_000_000).is_some());

        tracker.reset();
        assert_eq!(tracker.average_speed(), 0.0);
        assert!(tracker.estimate_time_remaining(1_000_000).is_none());
    }

    #[test]
    fn test_eta_overflow_on_slow_link() {
        let mut tracker = SpeedTracker::new();
        tracker.add_position(0);
        thread::sleep(Duration::from_millis(1100));
        tracker.add_position(1);

        let speed = tracker.average_speed();
        assert!(speed > 0.0 && speed < 1.0);
        assert!(tracker.estimate_time_remaining(u64::MAX).is_none());
        assert!(tracker.estimate_time_remaining(10).is_some());
    }

    #[test]
    fn test_eta_string() {
        let mut progress = DownloadProgress {
            url: "http://x/a.mp4".to_string(),
            token: String::new(),
            state: DownloadState::Downloading,
            bytes_downloaded: 5_000_000,
            total_bytes: Some(10_000_000),
            progress: 0.5,
            download_speed: 1_000_000.0,
            eta_seconds: Some(330),
            error_message: None,
        };
        assert_eq!(progress.eta_string(), "5m 30s");
        assert!(progress.display_string().contains("50.0%"));

        progress.eta_seconds = None;
        assert_eq!(progress.eta_string(), "calculating...");
    }
}
