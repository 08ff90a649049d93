//! Deduplicating table of URLs known to the current download run

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Where a tracked URL currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UrlState {
    /// Waiting in the work queue
    Queued,

    /// Taken by a worker and being downloaded
    InFlight,
}

impl UrlState {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::InFlight => "in_flight",
        }
    }
}

/// Membership table for every URL that is queued or in flight
///
/// This is the single source of truth for "is this URL already known". A URL
/// leaves the table when its download succeeds or is given up on, after which
/// it may be enqueued again.
#[derive(Debug, Default)]
pub struct UrlStateTable {
    entries: Mutex<HashMap<String, UrlState>>,
}

impl UrlStateTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn entries(&self) -> MutexGuard<'_, HashMap<String, UrlState>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Inserts `url` as queued; returns false if it was already tracked
    pub fn try_insert(&self, url: &str) -> bool {
        let mut entries = self.entries();
        if entries.contains_key(url) {
            return false;
        }
        entries.insert(url.to_string(), UrlState::Queued);
        true
    }

    /// Marks a queued URL as taken by a worker
    pub fn mark_in_flight(&self, url: &str) {
        if let Some(state) = self.entries().get_mut(url) {
            *state = UrlState::InFlight;
        }
    }

    /// Stops tracking `url`; returns the state it was in
    pub fn remove(&self, url: &str) -> Option<UrlState> {
        self.entries().remove(url)
    }

    pub fn get(&self, url: &str) -> Option<UrlState> {
        self.entries().get(url).copied()
    }

    pub fn len(&self) -> usize {
        self.entries().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries().is_empty()
    }

    /// Number of URLs currently held by workers
    pub fn in_flight(&self) -> usize {
        self.entries()
            .values()
            .filter(|s| **s == UrlState::InFlight)
            .count()
    }
}
