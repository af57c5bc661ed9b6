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


//! Download registry: URL key → entry
//!
//! The registry is pure in-memory bookkeeping and never touches storage.

use crate::download::entry::DownloadEntry;
use crate::download::progress::DownloadState;
use crate::key::UrlKey;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;

#[derive(Debug, Default)]
pub struct DownloadRegistry {
    entries: RwLock<HashMap<UrlKey, Arc<DownloadEntry>>>,
}

impl DownloadRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Existing entry for `key`, or a new `NotStarted` one
    ///
    /// The boolean is true when the entry was created by this call.
    pub fn get_or_create(&self, key: &UrlKey) -> (Arc<DownloadEntry>, bool) {
        if let Some(entry) = self.entries.read().get(key) {
            return (Arc::clone(entry), false);
        }

        let mut entries = self.entries.write();
        // Another caller may have created it between the two locks
        if let Some(entry) = entries.get(key) {
            return (Arc::clone(entry), false);
        }
        let entry = Arc::new(DownloadEntry::new(key.clone()));
        entries.insert(key.clone(), Arc::clone(&entry));
        (entry, true)
    }

    /// Insert a prepared entry, replacing any entry with the same key
    pub fn insert(&self, entry: Arc<DownloadEntry>) {
        self.entries.write().insert(entry.key().clone(), entry);
    }

    pub fn get(&self, key: &UrlKey) -> Option<Arc<DownloadEntry>> {
        self.entries.read().get(key).cloned()
    }

    /// Drop an entry; returns whether one existed
    pub fn remove(&self, key: &UrlKey) -> bool {
        self.entries.write().remove(key).is_some()
    }

    /// Progress update for one attempt of `key`
    pub fn update_progress(&self, key: &UrlKey, attempt: u64, bytes: u64, total: Option<u64>) -> bool {
        self.get(key)
            .map_or(false, |entry| entry.update_progress(attempt, bytes, total))
    }

    pub fn set_state(&self, key: &UrlKey, state: DownloadState) -> bool {
        match self.get(key) {
            Some(entry) => {
                entry.set_state(state);
                true
            }
            None => false,
        }
    }

    /// Snapshot of every entry
    pub fn entries(&self) -> Vec<Arc<DownloadEntry>> {
        self.entries.read().values().cloned().collect()
    }

    pub fn keys(&self) -> Vec<UrlKey> {
        self.entries.read().keys().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    fn key(raw: &str) -> UrlKey {
        UrlKey::normalize(raw).unwrap()
    }

    #[test]
    fn test_get_or_create_is_idempotent() {
        let registry = DownloadRegistry::new();
        let (first, created) = registry.get_or_create(&key("http://x/a.mp4"));
        assert!(created);
        let (second, created) = registry.get_or_create(&key("HTTP://X/a.mp4#t=10"));
        assert!(!created);
        assert!(Arc::ptr_eq(&first, &second));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_concurrent_get_or_create() {
        let registry = Arc::new(DownloadRegistry::new());
        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = Arc::clone(&registry);
                thread::spawn(move || registry.get_or_create(&key("http://x/race.mp4")).1)
            })
            .collect();

        let created: usize = handles
            .into_iter()
            .map(|h| h.join().unwrap() as usize)
            .sum();
        assert_eq!(created, 1);
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_remove() {
        let registry = DownloadRegistry::new();
        let k = key("http://x/a.mp4");
        assert!(!registry.remove(&k));

        registry.get_or_create(&k);
        assert!(registry.remove(&k));
        assert!(registry.get(&k).is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_updates_go_through_entry() {
        let registry = DownloadRegistry::new();
        let k = key("http://x/a.mp4");
        assert!(!registry.update_progress(&k, 1, 10, None));
        assert!(!registry.set_state(&k, DownloadState::Failed));

        let (entry, _) = registry.get_or_create(&k);
        let (attempt, _) = entry.begin_attempt();
        entry.mark_downloading(attempt).unwrap();

        assert!(registry.update_progress(&k, attempt, 10, Some(40)));
        assert_eq!(entry.snapshot().bytes_downloaded, 10);

        assert!(registry.set_state(&k, DownloadState::NotStarted));
        assert_eq!(entry.state(), DownloadState::NotStarted);
        assert_eq!(registry.keys(), vec![k]);
    }
}
