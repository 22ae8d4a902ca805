//! `tracker_core` — Person tracking and zone crossing events.
//!
//! # Module layout
//! - [`types`]        — Fundamental types (person IDs, points, frames, bounds)
//! - [`error`]        — Error type shared by the registry and event log
//! - [`geometry`]     — Point-in-polygon test, polygon validation
//! - [`zones`]        — Versioned, soft-deletable zone registry
//! - [`track`]        — Track struct and per-zone membership
//! - [`track_store`]  — Birth / miss accounting / eviction of tracks
//! - [`association`]  — Greedy nearest-neighbour detection-to-track matching
//! - [`events`]       — Enter/leave detection and event sinks
//! - [`engine`]       — Per-frame cycle orchestrator and live snapshots
//! - [`event_log`]    — Append-only event log with statistics queries

pub mod association;
pub mod engine;
pub mod error;
pub mod event_log;
pub mod events;
pub mod geometry;
pub mod track;
pub mod track_store;
pub mod types;
pub mod zones;

pub use engine::{
    EngineConfig, EngineHandle, FrameOutput, LiveSnapshot, PersonSummary, RunSummary,
    ShutdownSignal, TrackingEngine,
};
pub use error::{Result, TrackerError};
pub use event_log::{EventLog, EventPage, PolygonStats, TimeRange};
pub use events::{ChannelSink, EventKind, EventSink, ZoneEvent};
pub use track::Track;
pub use types::{Frame, FrameBounds, PersonId, Point, PolygonIndex};
pub use zones::{Polygon, ZoneRegistry};
