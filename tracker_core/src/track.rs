//! Track: identity, last known position, miss counter, zone membership.

use crate::types::{PersonId, Point, PolygonIndex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Lifecycle status of a track.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackStatus {
    /// Live: matched this frame or still within the miss allowance
    Active,
    /// Exceeded the miss allowance; removed at the end of association
    Evicted,
}

/// A single tracked person.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Track {
    /// Unique identifier, never reused
    pub id: PersonId,
    /// Last matched detection
    pub position: Point,
    /// Consecutive frames without a matching detection
    pub missed_frames: u32,
    /// Per-zone "currently inside" flag; absent means outside
    pub membership: BTreeMap<PolygonIndex, bool>,
    /// Lifecycle status
    pub status: TrackStatus,
    /// Total number of matched detections, birth included
    pub total_hits: u32,
    /// Frame time of birth
    pub born_at: DateTime<Utc>,
    /// Frame time of the last matched detection
    pub last_seen: DateTime<Utc>,
}

impl Track {
    /// Create a fresh track with empty membership.
    pub fn new(id: PersonId, position: Point, born_at: DateTime<Utc>) -> Self {
        Self {
            id,
            position,
            missed_frames: 0,
            membership: BTreeMap::new(),
            status: TrackStatus::Active,
            total_hits: 1,
            born_at,
            last_seen: born_at,
        }
    }

    /// Membership flag for one zone.
    pub fn is_inside(&self, index: PolygonIndex) -> bool {
        self.membership.get(&index).copied().unwrap_or(false)
    }

    /// Zones this track is currently recorded inside.
    pub fn zones_inside(&self) -> impl Iterator<Item = PolygonIndex> + '_ {
        self.membership
            .iter()
            .filter_map(|(&idx, &inside)| inside.then_some(idx))
    }
}
