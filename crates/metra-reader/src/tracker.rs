//! Tag presence tracking.
//!
//! The tracker keeps every tag seen within the keep time and reports
//! arrivals and departures:
//!
//! ```text
//!            observed (new key)              now - last_seen > keep_time
//!  absent ────────────────────> present ──────────────────────────────> absent
//!   arrival reported once        │    ▲      departure reported once
//!                                └────┘
//!                           observed again: seen_count += 1
//! ```
//!
//! Staleness is measured on the monotonic clock, so wall-clock jumps never
//! evict tags. The `first_seen_at` / `last_seen_at` timestamps carried by
//! each [`Tag`] are wall-clock and only used for reporting.
//!
//! All access goes through one mutex; snapshots are consistent copies.

use chrono::Utc;
use metra_core::{Tag, TagIdentity, TagKey, TagObservation};
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use tokio::time::Instant;

/// Arrivals and departures caused by one inventory batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PresenceChange {
    /// Tags seen for the first time (since their last departure).
    pub arrived: Vec<Tag>,
    /// Tags evicted because they were not seen within the keep time.
    pub departed: Vec<Tag>,
    /// Every tag present after the batch.
    pub present: Vec<Tag>,
}

impl PresenceChange {
    pub fn is_empty(&self) -> bool {
        self.arrived.is_empty() && self.departed.is_empty()
    }
}

/// A tracked tag and its monotonic sighting times.
#[derive(Debug)]
struct Tracked {
    tag: Tag,
    first_seen: Instant,
    last_seen: Instant,
}

impl Tracked {
    fn new(observation: TagObservation, now: Instant) -> Self {
        Self {
            tag: Tag::first_seen(observation, Utc::now()),
            first_seen: now,
            last_seen: now,
        }
    }

    fn seen_again(&mut self, observation: TagObservation, now: Instant) {
        self.tag.seen_again(observation, Utc::now());
        self.last_seen = self.last_seen.max(now);
    }

    fn is_stale(&self, keep_time: Duration, now: Instant) -> bool {
        now.saturating_duration_since(self.last_seen) > keep_time
    }
}

/// Tracks which tags are currently in view.
#[derive(Debug)]
pub struct TagPresenceTracker {
    tags: Mutex<HashMap<TagKey, Tracked>>,
    keep_time: Duration,
    identity: TagIdentity,
}

impl TagPresenceTracker {
    pub fn new(keep_time: Duration, identity: TagIdentity) -> Self {
        Self {
            tags: Mutex::new(HashMap::new()),
            keep_time,
            identity,
        }
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<TagKey, Tracked>> {
        self.tags.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Apply one inventory result. See [`update_at`](Self::update_at).
    pub fn update(&self, observed: Vec<TagObservation>) -> PresenceChange {
        self.update_at(observed, Instant::now())
    }

    /// Apply one inventory result observed at `now`.
    ///
    /// New keys are reported in `arrived`, once per batch even if the
    /// batch lists a tag several times. Tracked tags missing from the batch
    /// are evicted when stale.
    pub fn update_at(&self, observed: Vec<TagObservation>, now: Instant) -> PresenceChange {
        let mut tags = self.lock();
        let mut change = PresenceChange::default();
        let mut seen = Vec::with_capacity(observed.len());

        for observation in observed {
            let key = self.identity.key(&observation);
            match tags.entry(key.clone()) {
                Entry::Occupied(mut entry) => entry.get_mut().seen_again(observation, now),
                Entry::Vacant(entry) => {
                    change
                        .arrived
                        .push(entry.insert(Tracked::new(observation, now)).tag.clone());
                }
            }
            seen.push(key);
        }

        let stale: Vec<TagKey> = tags
            .iter()
            .filter(|(key, tracked)| !seen.contains(key) && tracked.is_stale(self.keep_time, now))
            .map(|(key, _)| key.clone())
            .collect();
        change.departed = remove_sorted(&mut tags, stale);
        change.present = sorted(tags.values());
        change
    }

    /// Record a single sighting, e.g. from a continuous scan.
    pub fn observe(&self, observation: TagObservation) -> Option<Tag> {
        self.observe_at(observation, Instant::now())
    }

    /// Record a single sighting at `now`; returns the tag if it just arrived.
    pub fn observe_at(&self, observation: TagObservation, now: Instant) -> Option<Tag> {
        let key = self.identity.key(&observation);
        match self.lock().entry(key) {
            Entry::Occupied(mut entry) => {
                entry.get_mut().seen_again(observation, now);
                None
            }
            Entry::Vacant(entry) => Some(entry.insert(Tracked::new(observation, now)).tag.clone()),
        }
    }

    /// Evict all stale tags and return them.
    pub fn expire(&self) -> Vec<Tag> {
        self.expire_at(Instant::now())
    }

    pub fn expire_at(&self, now: Instant) -> Vec<Tag> {
        let mut tags = self.lock();
        let stale: Vec<TagKey> = tags
            .iter()
            .filter(|(_, tracked)| tracked.is_stale(self.keep_time, now))
            .map(|(key, _)| key.clone())
            .collect();
        remove_sorted(&mut tags, stale)
    }

    /// Point-in-time copy of all present tags, oldest first.
    pub fn snapshot(&self) -> Vec<Tag> {
        sorted(self.lock().values())
    }

    /// Present tag with this observation's identity.
    pub fn get(&self, observation: &TagObservation) -> Option<Tag> {
        self.lock()
            .get(&self.identity.key(observation))
            .map(|tracked| tracked.tag.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    /// Forget all tags without reporting departures.
    pub fn clear(&self) {
        self.lock().clear();
    }

    pub fn keep_time(&self) -> Duration {
        self.keep_time
    }
}

fn remove_sorted(tags: &mut HashMap<TagKey, Tracked>, mut keys: Vec<TagKey>) -> Vec<Tag> {
    keys.sort();
    keys.iter()
        .filter_map(|key| tags.remove(key))
        .map(|tracked| tracked.tag)
        .collect()
}

fn sorted<'a>(tracked: impl Iterator<Item = &'a Tracked>) -> Vec<Tag> {
    let mut tracked: Vec<&Tracked> = tracked.collect();
    tracked.sort_by(|a, b| {
        a.first_seen
            .cmp(&b.first_seen)
            .then_with(|| a.tag.id.cmp(&b.tag.id))
            .then_with(|| a.tag.antenna.cmp(&b.tag.antenna))
    });
    tracked.into_iter().map(|t| t.tag.clone()).collect()
}
