//! Data association: greedy nearest-neighbour matching of detections to tracks.
//!
//! # Algorithm
//! 1. Compute the Euclidean distance for every (track, detection) pair and
//!    keep the pairs within `distance_threshold` (inclusive).
//! 2. Sort the candidates by (distance, person ID, detection index) and walk
//!    the list, accepting a pair when neither side is taken yet. This is the
//!    same as repeatedly picking the global minimum remaining pair.
//! 3. Unmatched tracks accrue a miss and may be evicted.
//! 4. Unmatched detections are born as new tracks, in input order.
//!
//! This is not an optimal assignment. A min-cost bipartite solver would pick
//! different pairs on ambiguous frames and shift when crossings are reported.

use crate::{
    track_store::TrackStore,
    types::{PersonId, Point},
};
use chrono::{DateTime, Utc};
use rayon::prelude::*;
use std::cmp::Ordering;

/// A (track, detection) pair within the distance threshold.
#[derive(Clone, Debug, PartialEq)]
pub struct Candidate {
    pub track_idx: usize,
    pub det_idx: usize,
    pub person_id: PersonId,
    pub distance: f64,
}

/// Result of the greedy matching, in store / input indices.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Assignment {
    /// (track_idx, det_idx) pairs in selection order
    pub pairs: Vec<(usize, usize)>,
    /// Track indices that got no detection
    pub unmatched_tracks: Vec<usize>,
    /// Detection indices that matched no track
    pub unmatched_detections: Vec<usize>,
}

/// What one association pass did to the track store.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct AssociationOutcome {
    /// Detection index → identity, for every detection of the frame
    pub identities: Vec<PersonId>,
    /// Tracks created this frame
    pub born: Vec<PersonId>,
    /// Tracks removed this frame
    pub evicted: Vec<PersonId>,
}

/// All pairs within `threshold`, in (track, detection) order.
///
/// Distances are evaluated per track in parallel; the collected order does
/// not depend on scheduling.
pub fn candidate_pairs(
    tracks: &[(PersonId, Point)],
    detections: &[Point],
    threshold: f64,
) -> Vec<Candidate> {
    tracks
        .par_iter()
        .enumerate()
        .flat_map_iter(|(ti, &(person_id, pos))| {
            detections.iter().enumerate().filter_map(move |(di, det)| {
                let distance = nalgebra::distance(&pos, det);
                (distance <= threshold).then_some(Candidate {
                    track_idx: ti,
                    det_idx: di,
                    person_id,
                    distance,
                })
            })
        })
        .collect()
}

fn candidate_order(a: &Candidate, b: &Candidate) -> Ordering {
    a.distance
        .total_cmp(&b.distance)
        .then(a.person_id.cmp(&b.person_id))
        .then(a.det_idx.cmp(&b.det_idx))
}

/// Greedy global-minimum matching with a fixed tie-break.
pub(crate) fn greedy_assign(n_tracks: usize, n_dets: usize, mut candidates: Vec<Candidate>) -> Assignment {
    candidates.sort_by(candidate_order);

    let mut track_taken = vec![false; n_tracks];
    let mut det_taken = vec![false; n_dets];
    let mut pairs = Vec::new();

    for c in &candidates {
        if c.track_idx >= n_tracks || c.det_idx >= n_dets {
            continue;
        }
        if track_taken[c.track_idx] || det_taken[c.det_idx] {
            continue;
        }
        track_taken[c.track_idx] = true;
        det_taken[c.det_idx] = true;
        pairs.push((c.track_idx, c.det_idx));
    }

    Assignment {
        pairs,
        unmatched_tracks: (0..n_tracks).filter(|&i| !track_taken[i]).collect(),
        unmatched_detections: (0..n_dets).filter(|&j| !det_taken[j]).collect(),
    }
}

/// Run one association pass against the store: update matched tracks,
/// register misses (evicting where due), then birth new tracks.
pub fn associate(
    store: &mut TrackStore,
    detections: &[Point],
    distance_threshold: f64,
    now: DateTime<Utc>,
) -> AssociationOutcome {
    let keys: Vec<(PersonId, Point)> = store.tracks().iter().map(|t| (t.id, t.position)).collect();
    let candidates = candidate_pairs(&keys, detections, distance_threshold);
    let assignment = greedy_assign(keys.len(), detections.len(), candidates);

    let mut identities = vec![PersonId::default(); detections.len()];
    for &(ti, di) in &assignment.pairs {
        store.register_hit(ti, detections[di], now);
        identities[di] = keys[ti].0;
    }

    for &ti in &assignment.unmatched_tracks {
        store.register_miss(ti);
    }
    let evicted = store.prune_evicted();

    let mut born = Vec::with_capacity(assignment.unmatched_detections.len());
    for &di in &assignment.unmatched_detections {
        let id = store.birth(detections[di], now);
        identities[di] = id;
        born.push(id);
    }

    AssociationOutcome {
        identities,
        born,
        evicted,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
