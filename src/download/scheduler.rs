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


//! Concurrency scheduler
//!
//! # Admission
//! - Up to `max_concurrent` slots are active at a time
//! - Excess requests wait in a strict FIFO queue
//! - Releasing a slot admits the head of the queue
//! - Lowering the limit never revokes an active slot; raising it admits
//!   queued requests right away
//!
//! Slots are keyed by URL key *and* attempt number, so a task left over from
//! an earlier attempt releases its own slot and nobody else's.

use crate::key::UrlKey;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};

/// One attempt's claim on a slot
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SlotRequest {
    pub key: UrlKey,
    pub attempt: u64,
}

impl SlotRequest {
    pub fn new(key: UrlKey, attempt: u64) -> Self {
        Self { key, attempt }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    Admitted,
    Queued,
}

#[derive(Debug)]
struct SchedulerState {
    max_concurrent: usize,
    active: HashSet<SlotRequest>,
    queue: VecDeque<SlotRequest>,
}

impl SchedulerState {
    fn admit_next(&mut self) -> Option<SlotRequest> {
        if self.active.len() >= self.max_concurrent {
            return None;
        }
        let next = self.queue.pop_front()?;
        self.active.insert(next.clone());
        Some(next)
    }
}

#[derive(Debug)]
pub struct Scheduler {
    state: Mutex<SchedulerState>,
}

impl Scheduler {
    pub fn new(max_concurrent: usize) -> Self {
        Self {
            state: Mutex::new(SchedulerState {
                max_concurrent: max_concurrent.max(1),
                active: HashSet::new(),
                queue: VecDeque::new(),
            }),
        }
    }

    /// Admit `request` or queue it behind earlier requests
    ///
    /// A request that is already active or queued keeps its position.
    pub fn request_slot(&self, request: SlotRequest) -> Admission {
        let mut state = self.state.lock();
        if state.active.contains(&request) {
            return Admission::Admitted;
        }
        if state.queue.contains(&request) {
            return Admission::Queued;
        }

        if state.active.len() < state.max_concurrent {
            state.active.insert(request);
            Admission::Admitted
        } else {
            state.queue.push_back(request);
            Admission::Queued
        }
    }

    /// Give back an active slot and admit the head of the queue, if any
    ///
    /// Releasing a request that does not hold a slot is a no-op.
    pub fn release_slot(&self, request: &SlotRequest) -> Option<SlotRequest> {
        let mut state = self.state.lock();
        if !state.active.remove(request) {
            return None;
        }
        state.admit_next()
    }

    /// Drop a queued request without touching the active set
    pub fn cancel_queued(&self, request: &SlotRequest) -> bool {
        let mut state = self.state.lock();
        match state.queue.iter().position(|queued| queued == request) {
            Some(index) => {
                state.queue.remove(index);
                true
            }
            None => false,
        }
    }

    /// Change the limit; returns the requests admitted by a raise
    pub fn set_max_concurrent(&self, max_concurrent: usize) -> Vec<SlotRequest> {
        let mut state = self.state.lock();
        state.max_concurrent = max_concurrent.max(1);

        let mut admitted = Vec::new();
        while let Some(next) = state.admit_next() {
            admitted.push(next);
        }
        admitted
    }

    pub fn max_concurrent(&self) -> usize {
        self.state.lock().max_concurrent
    }

    pub fn active_count(&self) -> usize {
        self.state.lock().active.len()
    }

    pub fn queued_count(&self) -> usize {
        self.state.lock().queue.len()
    }

    pub fn is_active(&self, request: &SlotRequest) -> bool {
        self.state.lock().active.contains(request)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(n: u64) -> SlotRequest {
        let key = UrlKey::normalize(&format!("http://x/{}.mp4", n)).unwrap();
        SlotRequest::new(key, n)
    }

    #[test]
    fn test_admits_up_to_limit_then_queues() {
        let scheduler = Scheduler::new(2);
        assert_eq!(scheduler.request_slot(request(1)), Admission::Admitted);
        assert_eq!(scheduler.request_slot(request(2)), Admission::Admitted);
        assert_eq!(scheduler.request_slot(request(3)), Admission::Queued);
        assert_eq!(scheduler.active_count(), 2);
        assert_eq!(scheduler.queued_count(), 1);
    }

    #[test]
    fn test_release_promotes_fifo() {
        let scheduler = Scheduler::new(1);
        scheduler.request_slot(request(1));
        scheduler.request_slot(request(2));
        scheduler.request_slot(request(3));

        assert_eq!(scheduler.release_slot(&request(1)), Some(request(2)));
        assert!(scheduler.is_active(&request(2)));
        assert_eq!(scheduler.release_slot(&request(2)), Some(request(3)));
        assert_eq!(scheduler.release_slot(&request(3)), None);
        assert_eq!(scheduler.active_count(), 0);
    }

    #[test]
    fn test_request_is_idempotent() {
        let scheduler = Scheduler::new(1);
        assert_eq!(scheduler.request_slot(request(1)), Admission::Admitted);
        assert_eq!(scheduler.request_slot(request(1)), Admission::Admitted);
        assert_eq!(scheduler.request_slot(request(2)), Admission::Queued);
        assert_eq!(scheduler.request_slot(request(2)), Admission::Queued);
        assert_eq!(scheduler.active_count(), 1);
        assert_eq!(scheduler.queued_count(), 1);
    }

    #[test]
    fn test_cancel_queued_leaves_active_count() {
        let scheduler = Scheduler::new(1);
        scheduler.request_slot(request(1));
        scheduler.request_slot(request(2));
        scheduler.request_slot(request(3));

        assert!(scheduler.cancel_queued(&request(2)));
        assert!(!scheduler.cancel_queued(&request(2)));
        assert!(!scheduler.cancel_queued(&request(1)));
        assert_eq!(scheduler.active_count(), 1);
        assert_eq!(scheduler.release_slot(&request(1)), Some(request(3)));
    }

    #[test]
    fn test_stale_release_is_noop() {
        let scheduler = Scheduler::new(1);
        scheduler.request_slot(request(1));
        scheduler.request_slot(request(2));

        // Same key, different attempt
        let stale = SlotRequest::new(request(1).key, 99);
        assert_eq!(scheduler.release_slot(&stale), None);
        assert_eq!(scheduler.active_count(), 1);
        assert_eq!(scheduler.queued_count(), 1);
    }

    #[test]
    fn test_lowering_limit_keeps_active() {
        let scheduler = Scheduler::new(3);
        for n in 1..=4 {
            scheduler.request_slot(request(n));
        }

        assert!(scheduler.set_max_concurrent(1).is_empty());
        assert_eq!(scheduler.active_count(), 3);

        // Releases do not admit until the active set drops below the new limit
        assert_eq!(scheduler.release_slot(&request(1)), None);
        assert_eq!(scheduler.release_slot(&request(2)), None);
        assert_eq!(scheduler.release_slot(&request(3)), Some(request(4)));
    }

    #[test]
    fn test_raising_limit_admits_queued() {
        let scheduler = Scheduler::new(1);
        for n in 1..=4 {
            scheduler.request_slot(request(n));
        }

        assert_eq!(scheduler.set_max_concurrent(3), vec![request(2), request(3)]);
        assert_eq!(scheduler.active_count(), 3);
        assert_eq!(scheduler.queued_count(), 1);
        assert_eq!(scheduler.max_concurrent(), 3);
    }
}
