//! Tracking engine: the full per-frame cycle.
//!
//! # Processing steps per frame (strictly ordered)
//! 1. Snapshot the active zones from the registry
//! 2. Drop detections with non-finite coordinates
//! 3. Associate detections with tracks (hits, misses, evictions, births)
//! 4. Evaluate zone membership of every live track, collect events
//! 5. Publish: release the store lock
//! 6. Hand the events to the sink, in emission order
//!
//! Steps 3-4 run under one exclusive lock on the track store, so readers
//! going through an [`EngineHandle`] see the state either before or after a
//! whole cycle. Frames are processed one at a time by the single owner of the
//! engine (`&mut self`).

use crate::{
    association::associate,
    events::{evaluate_membership, EventSink, ZoneEvent},
    track::Track,
    track_store::{TrackStore, TrackStoreConfig},
    types::{Frame, FrameBounds, PersonId, Point, PolygonIndex},
    zones::ZoneRegistry,
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Instant,
};
use tracing::{debug, info, warn};

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Configuration for the tracking engine.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum detection-to-track distance for a match (pixels, inclusive)
    pub distance_threshold: f64,
    /// Consecutive misses tolerated before a track is evicted
    pub max_missed_frames: u32,
    /// Frame extent. Zone registries handed to the engine are expected to
    /// use the same bounds; `with_empty_registry` builds one from it.
    pub bounds: FrameBounds,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            distance_threshold: 50.0,
            max_missed_frames: 30,
            bounds: FrameBounds::default(),
        }
    }
}

// ---------------------------------------------------------------------------
// Outputs
// ---------------------------------------------------------------------------

/// Outputs of one cycle.
#[derive(Clone, Debug, Default)]
pub struct FrameOutput {
    /// Producer sequence number of the frame
    pub frame_index: u64,
    /// Events emitted this cycle, in emission order
    pub events: Vec<ZoneEvent>,
    /// Identity of each accepted detection, in input order
    pub identities: Vec<PersonId>,
    /// Tracks born this cycle
    pub births: Vec<PersonId>,
    /// Tracks evicted this cycle
    pub evictions: Vec<PersonId>,
    /// Detections dropped for non-finite coordinates
    pub rejected_detections: usize,
    /// Live tracks after the cycle
    pub live_tracks: usize,
    /// Zones in the cycle's snapshot
    pub zones_evaluated: usize,
    /// Wall-clock time of processing
    pub total_time_us: u64,
}

/// Totals over a [`TrackingEngine::run`].
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSummary {
    pub frames: u64,
    pub events: u64,
    pub births: u64,
    pub evictions: u64,
    /// True if the run stopped on the shutdown signal rather than end of input
    pub interrupted: bool,
}

impl RunSummary {
    fn absorb(&mut self, out: &FrameOutput) {
        self.frames += 1;
        self.events += out.events.len() as u64;
        self.births += out.births.len() as u64;
        self.evictions += out.evictions.len() as u64;
    }
}

/// Lifetime counters of one live track.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct PersonSummary {
    pub born_at: DateTime<Utc>,
    pub last_seen: DateTime<Utc>,
    pub total_hits: u32,
    pub missed_frames: u32,
}

impl PersonSummary {
    /// Time between birth and the last matched detection.
    pub fn dwell(&self) -> chrono::Duration {
        self.last_seen - self.born_at
    }
}

/// Consistent view of the engine between two cycles.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct LiveSnapshot {
    /// Cycles completed so far
    pub frames_processed: u64,
    /// Last known position of every live track
    pub positions: BTreeMap<PersonId, Point>,
    /// Birth, last sighting and hit counts of every live track
    pub persons: BTreeMap<PersonId, PersonSummary>,
    /// Live tracks inside each zone of the last cycle's snapshot
    pub occupancy: BTreeMap<PolygonIndex, usize>,
}

impl LiveSnapshot {
    pub fn live_count(&self) -> usize {
        self.positions.len()
    }

    pub fn occupants(&self, index: PolygonIndex) -> usize {
        self.occupancy.get(&index).copied().unwrap_or(0)
    }
}

// ---------------------------------------------------------------------------
// Shared state
// ---------------------------------------------------------------------------

#[derive(Debug)]
struct EngineState {
    store: TrackStore,
    frames_processed: u64,
    /// Zone indices evaluated by the last cycle
    zone_indices: Vec<PolygonIndex>,
}

impl EngineState {
    fn snapshot(&self) -> LiveSnapshot {
        let tracks = self.store.tracks();
        LiveSnapshot {
            frames_processed: self.frames_processed,
            positions: tracks.iter().map(|t| (t.id, t.position)).collect(),
            persons: tracks
                .iter()
                .map(|t| {
                    let summary = PersonSummary {
                        born_at: t.born_at,
                        last_seen: t.last_seen,
                        total_hits: t.total_hits,
                        missed_frames: t.missed_frames,
                    };
                    (t.id, summary)
                })
                .collect(),
            occupancy: self
                .zone_indices
                .iter()
                .map(|&idx| (idx, tracks.iter().filter(|t| t.is_inside(idx)).count()))
                .collect(),
        }
    }
}

/// Cooperative stop request, checked between cycles only.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal(Arc<AtomicBool>);

impl ShutdownSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn trigger(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_triggered(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Read-only, cloneable access to the engine state for other threads.
#[derive(Clone, Debug)]
pub struct EngineHandle {
    state: Arc<RwLock<EngineState>>,
}

impl EngineHandle {
    pub fn live_snapshot(&self) -> LiveSnapshot {
        self.state.read().snapshot()
    }

    /// Copy of the live tracks, ordered by person ID.
    pub fn tracks(&self) -> Vec<Track> {
        self.state.read().store.tracks().to_vec()
    }

    pub fn live_count(&self) -> usize {
        self.state.read().store.len()
    }

    pub fn frames_processed(&self) -> u64 {
        self.state.read().frames_processed
    }
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Owns the track store and drives the per-frame cycle.
pub struct TrackingEngine {
    config: EngineConfig,
    zones: ZoneRegistry,
    state: Arc<RwLock<EngineState>>,
    shutdown: ShutdownSignal,
}

impl TrackingEngine {
    /// Create an engine reading zones from `zones`.
    pub fn new(config: EngineConfig, zones: ZoneRegistry) -> Self {
        let store = TrackStore::new(TrackStoreConfig {
            max_missed_frames: config.max_missed_frames,
        });
        info!(
            distance_threshold = config.distance_threshold,
            max_missed_frames = config.max_missed_frames,
            zones = zones.active_len(),
            "Tracking engine started"
        );
        if zones.bounds() != config.bounds {
            warn!(
                registry_width = zones.bounds().width,
                registry_height = zones.bounds().height,
                width = config.bounds.width,
                height = config.bounds.height,
                "Zone registry bounds differ from engine bounds"
            );
        }
        Self {
            config,
            zones,
            state: Arc::new(RwLock::new(EngineState {
                store,
                frames_processed: 0,
                zone_indices: Vec::new(),
            })),
            shutdown: ShutdownSignal::new(),
        }
    }

    /// Create an engine with an empty registry sized to `config.bounds`.
    pub fn with_empty_registry(config: EngineConfig) -> Self {
        let zones = ZoneRegistry::new(config.bounds);
        Self::new(config, zones)
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn zones(&self) -> &ZoneRegistry {
        &self.zones
    }

    pub fn handle(&self) -> EngineHandle {
        EngineHandle {
            state: Arc::clone(&self.state),
        }
    }

    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    pub fn live_snapshot(&self) -> LiveSnapshot {
        self.state.read().snapshot()
    }

    /// Run one cycle without delivering events anywhere but the output.
    pub fn process_frame(&mut self, frame: &Frame) -> FrameOutput {
        let start_total = Instant::now();

        // Step 1: zone snapshot, fixed for the whole cycle
        let zones = self.zones.active_zones();

        // Step 2: drop malformed detections
        let detections: Vec<Point> = frame
            .detections
            .iter()
            .filter(|p| p.x.is_finite() && p.y.is_finite())
            .copied()
            .collect();
        let rejected = frame.detections.len() - detections.len();
        if rejected > 0 {
            warn!(frame = frame.index, rejected, "Dropped non-finite detections");
        }

        // Steps 3-5 under the store lock
        let mut state = self.state.write();
        let assoc = associate(
            &mut state.store,
            &detections,
            self.config.distance_threshold,
            frame.timestamp,
        );
        let events = evaluate_membership(state.store.tracks_mut(), &zones, frame.timestamp);
        state.frames_processed += 1;
        state.zone_indices = zones.iter().map(|z| z.index).collect();
        let live_tracks = state.store.len();
        drop(state);

        debug!(
            frame = frame.index,
            detections = detections.len(),
            births = assoc.born.len(),
            evictions = assoc.evicted.len(),
            events = events.len(),
            live_tracks,
            "Frame processed"
        );

        FrameOutput {
            frame_index: frame.index,
            events,
            identities: assoc.identities,
            births: assoc.born,
            evictions: assoc.evicted,
            rejected_detections: rejected,
            live_tracks,
            zones_evaluated: zones.len(),
            total_time_us: start_total.elapsed().as_micros() as u64,
        }
    }

    /// Run one cycle and hand its events to `sink` (step 6).
    pub fn step<S: EventSink + ?Sized>(&mut self, frame: &Frame, sink: &mut S) -> FrameOutput {
        let out = self.process_frame(frame);
        for event in &out.events {
            sink.on_event(event);
        }
        out
    }

    /// Consume frames until the source is exhausted or shutdown is requested.
    pub fn run<I, S>(&mut self, frames: I, sink: &mut S) -> RunSummary
    where
        I: IntoIterator<Item = Frame>,
        S: EventSink + ?Sized,
    {
        let mut summary = RunSummary::default();
        let mut frames = frames.into_iter();
        loop {
            if self.shutdown.is_triggered() {
                summary.interrupted = true;
                info!(frames = summary.frames, "Shutdown requested, stopping between frames");
                break;
            }
            let Some(frame) = frames.next() else {
                break;
            };
            let out = self.step(&frame, sink);
            summary.absorb(&out);
        }
        info!(
            frames = summary.frames,
            events = summary.events,
            births = summary.births,
            evictions = summary.evictions,
            "Run finished"
        );
        summary
    }

    /// Drop all live tracks. Person IDs keep counting from where they were.
    pub fn reset(&mut self) {
        let mut state = self.state.write();
        let dropped = state.store.len();
        state.store.clear();
        info!(dropped, "Tracks cleared");
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn t(frame: u64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 23, 14, 30, 0).unwrap() + Duration::milliseconds(frame as i64 * 33)
    }

    fn frame(index: u64, points: &[(f64, f64)]) -> Frame {
        Frame::new(
            index,
            t(index),
            points.iter().map(|&(x, y)| Point::new(x, y)).collect(),
        )
    }

    fn square_zone_engine() -> TrackingEngine {
        let engine = TrackingEngine::with_empty_registry(EngineConfig::default());
        engine
            .zones()
            .upsert(
                0,
                vec![
                    Point::new(0.0, 0.0),
                    Point::new(10.0, 0.0),
                    Point::new(10.0, 10.0),
                    Point::new(0.0, 10.0),
                ],
                t(0),
            )
            .unwrap();
        engine
    }

    #[test]
    fn enter_leave_then_silent_eviction() {
        let mut engine = square_zone_engine();
        let mut sink: Vec<ZoneEvent> = Vec::new();

        let out = engine.step(&frame(1, &[(5.0, 5.0)]), &mut sink);
        assert_eq!(out.births, vec![PersonId(1)]);
        assert_eq!(sink.len(), 1);
        assert_eq!(sink[0].person_id, PersonId(1));
        assert_eq!(sink[0].polygon_index, 0);
        assert_eq!(sink[0].event_type, EventKind::Enter);

        engine.step(&frame(2, &[(20.0, 20.0)]), &mut sink);
        assert_eq!(sink.len(), 2);
        assert_eq!(sink[1].event_type, EventKind::Leave);
        assert_eq!(sink[1].person_id, PersonId(1));

        // 30 misses are tolerated
        for i in 3..33 {
            let out = engine.step(&frame(i, &[]), &mut sink);
            assert!(out.evictions.is_empty(), "evicted too early at frame {i}");
        }
        assert_eq!(engine.live_snapshot().live_count(), 1);

        // the 31st miss exceeds the limit
        let out = engine.step(&frame(33, &[]), &mut sink);
        assert_eq!(out.evictions, vec![PersonId(1)]);
        assert_eq!(engine.live_snapshot().live_count(), 0);
        assert_eq!(sink.len(), 2, "eviction emits nothing");
    }

    #[test]
    fn eviction_inside_zone_emits_no_leave() {
        let cfg = EngineConfig {
            max_missed_frames: 2,
            ..Default::default()
        };
        let mut engine = TrackingEngine::new(cfg, square_zone_engine().zones().clone());
        let mut sink: Vec<ZoneEvent> = Vec::new();
        engine.step(&frame(0, &[(5.0, 5.0)]), &mut sink);
        assert_eq!(engine.live_snapshot().occupants(0), 1);
        for i in 1..=3 {
            engine.step(&frame(i, &[]), &mut sink);
        }
        assert_eq!(sink.len(), 1);
        let snap = engine.live_snapshot();
        assert!(snap.positions.is_empty());
        assert_eq!(snap.occupants(0), 0);

        // a new person at the same place gets a new identity and a fresh enter
        engine.step(&frame(4, &[(5.0, 5.0)]), &mut sink);
        assert_eq!(sink.len(), 2);
        assert_eq!(sink[1].person_id, PersonId(2));
        assert_eq!(sink[1].event_type, EventKind::Enter);
    }

    #[test]
    fn steady_inside_emits_once() {
        let mut engine = square_zone_engine();
        let out = engine.process_frame(&frame(0, &[(4.0, 4.0)]));
        assert_eq!(out.events.len(), 1);
        for i in 1..20 {
            let out = engine.process_frame(&frame(i, &[(4.0 + (i % 3) as f64, 4.0)]));
            assert!(out.events.is_empty());
        }
    }

    #[test]
    fn two_close_detections_two_people() {
        let mut engine = square_zone_engine();
        let out = engine.process_frame(&frame(0, &[(5.0, 5.0), (6.0, 5.0)]));
        assert_eq!(out.births, vec![PersonId(1), PersonId(2)]);
        assert_eq!(out.events.len(), 2);
        assert_eq!(engine.live_snapshot().occupants(0), 2);
    }

    #[test]
    fn slow_walker_keeps_identity() {
        let mut engine = TrackingEngine::with_empty_registry(EngineConfig::default());
        for i in 0..500u64 {
            let x = 10.0 + (i as f64) * 1.2;
            let out = engine.process_frame(&frame(i, &[(x, 200.0)]));
            assert_eq!(out.identities, vec![PersonId(1)]);
        }
    }

    #[test]
    fn zone_added_later_applies_next_cycle() {
        let mut engine = TrackingEngine::with_empty_registry(EngineConfig::default());
        assert!(engine.process_frame(&frame(0, &[(5.0, 5.0)])).events.is_empty());

        engine
            .zones()
            .upsert(
                3,
                vec![
                    Point::new(0.0, 0.0),
                    Point::new(10.0, 0.0),
                    Point::new(0.0, 10.0),
                ],
                t(1),
            )
            .unwrap();
        let out = engine.process_frame(&frame(1, &[(4.0, 4.0)]));
        assert_eq!(out.zones_evaluated, 1);
        assert_eq!(out.events.len(), 1);
        assert_eq!(out.events[0].polygon_index, 3);
    }

    #[test]
    fn deleted_zone_gets_no_retroactive_leave() {
        let mut engine = square_zone_engine();
        engine.process_frame(&frame(0, &[(5.0, 5.0)]));
        engine.zones().soft_delete(0, t(1)).unwrap();

        let out = engine.process_frame(&frame(1, &[(30.0, 30.0)]));
        assert!(out.events.is_empty());
        assert_eq!(out.zones_evaluated, 0);
        assert!(engine.live_snapshot().occupancy.is_empty());
    }

    #[test]
    fn occupancy_lists_empty_zones() {
        let mut engine = square_zone_engine();
        engine.process_frame(&frame(0, &[(300.0, 300.0)]));
        let snap = engine.live_snapshot();
        assert_eq!(snap.occupancy.get(&0), Some(&0));
        assert_eq!(snap.frames_processed, 1);
    }

    #[test]
    fn non_finite_detections_are_dropped() {
        let mut engine = square_zone_engine();
        let out = engine.process_frame(&frame(0, &[(f64::NAN, 1.0), (5.0, 5.0), (1.0, f64::INFINITY)]));
        assert_eq!(out.rejected_detections, 2);
        assert_eq!(out.births.len(), 1);
        assert_eq!(out.identities.len(), 1);
    }

    #[test]
    fn run_stops_on_shutdown_between_frames() {
        let mut engine = square_zone_engine();
        let signal = engine.shutdown_signal();
        let frames = (0..100u64).map(|i| {
            if i == 10 {
                signal.trigger();
            }
            frame(i, &[(5.0, 5.0)])
        });
        let mut sink: Vec<ZoneEvent> = Vec::new();
        let summary = engine.run(frames, &mut sink);
        // frame 10 was already pulled when the signal fired; it completes
        assert_eq!(summary.frames, 11);
        assert!(summary.interrupted);
        assert_eq!(summary.events, 1);
        assert_eq!(engine.handle().frames_processed(), 11);
    }

    #[test]
    fn run_to_exhaustion() {
        let mut engine = square_zone_engine();
        let frames = vec![
            frame(0, &[(5.0, 5.0)]),
            frame(1, &[(25.0, 5.0)]),
            frame(2, &[(5.0, 5.0)]),
        ];
        let mut sink: Vec<ZoneEvent> = Vec::new();
        let summary = engine.run(frames, &mut sink);
        assert_eq!(
            summary,
            RunSummary {
                frames: 3,
                events: 3,
                births: 1,
                evictions: 0,
                interrupted: false,
            }
        );
        let kinds: Vec<EventKind> = sink.iter().map(|e| e.event_type).collect();
        assert_eq!(kinds, vec![EventKind::Enter, EventKind::Leave, EventKind::Enter]);
    }

    #[test]
    fn snapshot_reports_track_lifetimes() {
        let mut engine = square_zone_engine();
        engine.process_frame(&frame(0, &[(5.0, 5.0)]));
        engine.process_frame(&frame(1, &[(6.0, 5.0)]));
        engine.process_frame(&frame(2, &[]));

        let snap = engine.live_snapshot();
        let person = snap.persons[&PersonId(1)];
        assert_eq!(person.born_at, t(0));
        assert_eq!(person.last_seen, t(1));
        assert_eq!(person.total_hits, 2);
        assert_eq!(person.missed_frames, 1);
        assert_eq!(person.dwell(), Duration::milliseconds(33));
    }

    #[test]
    fn reset_clears_tracks_but_not_ids() {
        let mut engine = square_zone_engine();
        engine.process_frame(&frame(0, &[(5.0, 5.0), (100.0, 100.0)]));
        engine.reset();
        assert_eq!(engine.live_snapshot().live_count(), 0);
        let out = engine.process_frame(&frame(1, &[(5.0, 5.0)]));
        assert_eq!(out.births, vec![PersonId(3)]);
        assert_eq!(out.events.len(), 1, "fresh track enters again");
    }

    #[test]
    fn config_deserializes_with_defaults() {
        let cfg: EngineConfig = serde_json::from_str(r#"{"distance_threshold": 25.0}"#).unwrap();
        assert_eq!(cfg.distance_threshold, 25.0);
        assert_eq!(cfg.max_missed_frames, 30);
        assert_eq!(cfg.bounds, FrameBounds::default());
    }
}
