//! Track lifecycle management: birth, hit/miss accounting, eviction.
//!
//! # Track Management Policy
//! - **Birth**: each unmatched detection spawns a track with a fresh ID.
//!   The ID counter lives for the lifetime of the store and is never rewound,
//!   not even by [`TrackStore::clear`].
//! - **Hit**: a matched track takes the detection position and resets its
//!   miss counter.
//! - **Eviction**: a track whose consecutive miss count exceeds
//!   `max_missed_frames` is evicted. Its membership is discarded with it.

use crate::{
    track::{Track, TrackStatus},
    types::{PersonId, Point},
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Configuration for track lifecycle policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrackStoreConfig {
    /// Consecutive misses tolerated before eviction (evict when exceeded)
    pub max_missed_frames: u32,
}

impl Default for TrackStoreConfig {
    fn default() -> Self {
        Self {
            max_missed_frames: 30,
        }
    }
}

/// The pool of live tracks, kept ordered by ascending person ID.
#[derive(Clone, Debug)]
pub struct TrackStore {
    pub config: TrackStoreConfig,
    tracks: Vec<Track>,
    next_id: u64,
}

impl TrackStore {
    pub fn new(config: TrackStoreConfig) -> Self {
        Self {
            config,
            tracks: Vec::new(),
            next_id: 1,
        }
    }

    fn next_person_id(&mut self) -> PersonId {
        let id = PersonId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Live tracks, ordered by person ID.
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    pub fn tracks_mut(&mut self) -> &mut [Track] {
        &mut self.tracks
    }

    pub fn get(&self, id: PersonId) -> Option<&Track> {
        self.tracks
            .binary_search_by_key(&id, |t| t.id)
            .ok()
            .map(|i| &self.tracks[i])
    }

    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }

    /// Create a new track for an unmatched detection.
    pub fn birth(&mut self, position: Point, now: DateTime<Utc>) -> PersonId {
        let id = self.next_person_id();
        debug!(%id, x = position.x, y = position.y, "Track born");
        // IDs are monotonic, so pushing keeps the vector sorted
        self.tracks.push(Track::new(id, position, now));
        id
    }

    /// Call after the track at `idx` was matched to a detection.
    pub fn register_hit(&mut self, idx: usize, position: Point, now: DateTime<Utc>) {
        let track = &mut self.tracks[idx];
        track.position = position;
        track.missed_frames = 0;
        track.total_hits = track.total_hits.saturating_add(1);
        track.last_seen = now;
    }

    /// Call after the track at `idx` received no detection this frame.
    pub fn register_miss(&mut self, idx: usize) {
        let limit = self.config.max_missed_frames;
        let track = &mut self.tracks[idx];
        track.missed_frames = track.missed_frames.saturating_add(1);
        if track.missed_frames > limit {
            track.status = TrackStatus::Evicted;
        }
    }

    /// Remove evicted tracks. Returns their IDs in ascending order.
    pub fn prune_evicted(&mut self) -> Vec<PersonId> {
        let mut evicted = Vec::new();
        self.tracks.retain(|t| {
            if t.status == TrackStatus::Evicted {
                debug!(
                    id = %t.id,
                    missed = t.missed_frames,
                    hits = t.total_hits,
                    dwell_ms = (t.last_seen - t.born_at).num_milliseconds(),
                    "Track evicted"
                );
                evicted.push(t.id);
                false
            } else {
                true
            }
        });
        evicted
    }

    /// Drop every live track. The ID counter keeps running.
    pub fn clear(&mut self) {
        self.tracks.clear();
    }
}

impl Default for TrackStore {
    fn default() -> Self {
        Self::new(TrackStoreConfig::default())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
