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


//! Download task: one attempt of one URL
//!
//! # Transfer Loop
//! - Open the transfer, racing it against cancellation
//! - Write each chunk to the attempt's partial file
//! - Check the cancellation token before every write
//! - Report the running byte count to the registry after every chunk
//! - Flush, verify the length, then rename onto the cached path
//!
//! Cancelled and failed attempts delete their partial file. The task never
//! retries; callers restart through `start_download`.

use crate::download::entry::DownloadEntry;
use crate::download::registry::DownloadRegistry;
use crate::error::{CacheError, Result};
use crate::storage::{OpenMode, StorageBackend};
use crate::transport::Transport;
use futures_util::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::io::AsyncWriteExt;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// How an attempt ended
#[derive(Debug)]
pub enum TaskOutcome {
    Completed { path: PathBuf, bytes: u64 },
    Failed(CacheError),
    Cancelled,
}

pub struct DownloadTask {
    pub entry: Arc<DownloadEntry>,
    pub registry: Arc<DownloadRegistry>,
    pub storage: Arc<dyn StorageBackend>,
    pub transport: Arc<dyn Transport>,
    pub attempt: u64,
    pub cancel: CancellationToken,
    /// Minimum spacing of progress log lines
    pub log_interval: Duration,
}

impl DownloadTask {
    pub async fn run(self) -> TaskOutcome {
        let key = self.entry.key().clone();
        let partial = self.storage.partial_path_for(&key, self.attempt);
        let target = self.storage.path_for(&key);

        match self.transfer(&partial, &target).await {
            Ok(Some(bytes)) => {
                info!(url = %key, bytes, path = %target.display(), "download completed");
                TaskOutcome::Completed { path: target, bytes }
            }
            Ok(None) => {
                self.storage.delete(&partial);
                self.entry.mark_cancelled(self.attempt);
                info!(url = %key, "download cancelled");
                TaskOutcome::Cancelled
            }
            Err(_) if self.cancel.is_cancelled() => {
                self.storage.delete(&partial);
                self.entry.mark_cancelled(self.attempt);
                info!(url = %key, "download cancelled");
                TaskOutcome::Cancelled
            }
            Err(e) => {
                self.storage.delete(&partial);
                self.entry.fail(self.attempt, e.to_string());
                warn!(url = %key, error = %e, retryable = e.is_retryable(), "download failed");
                TaskOutcome::Failed(e)
            }
        }
    }

    /// Returns the byte count on success, `None` when cancelled
    async fn transfer(&self, partial: &Path, target: &Path) -> Result<Option<u64>> {
        let key = self.entry.key();
        if self.cancel.is_cancelled() {
            return Ok(None);
        }

        let response = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => return Ok(None),
            response = self.transport.fetch(key.as_str()) => response?,
        };
        let total = response.total_bytes;
        self.registry.update_progress(key, self.attempt, 0, total);

        let mut writer = self.storage.open(partial, OpenMode::Create).await?;
        let mut body = response.body;
        let mut bytes = 0u64;
        let mut last_log = Instant::now();

        loop {
            let next = tokio::select! {
                biased;
                _ = self.cancel.cancelled() => return Ok(None),
                next = body.next() => next,
            };
            let chunk = match next {
                Some(chunk) => chunk?,
                None => break,
            };

            // Nothing may reach storage once cancel was requested
            if self.cancel.is_cancelled() {
                return Ok(None);
            }
            writer
                .write_all(&chunk)
                .await
                .map_err(|e| CacheError::file_io("Failed to write", partial, e))?;

            bytes += chunk.len() as u64;
            self.registry.update_progress(key, self.attempt, bytes, total);

            if last_log.elapsed() >= self.log_interval {
                debug!(url = %key, bytes, ?total, "download progress");
                last_log = Instant::now();
            }
        }

        writer
            .shutdown()
            .await
            .map_err(|e| CacheError::file_io("Failed to flush", partial, e))?;
        drop(writer);

        if let Some(expected) = total {
            if bytes < expected {
                return Err(CacheError::DownloadIncomplete {
                    expected,
                    actual: bytes,
                });
            }
        }

        let committed = self
            .entry
            .commit(self.attempt, target, bytes, || self.storage.finalize(partial, target))?;

        Ok(committed.then_some(bytes))
    }
}
