//! Zone enter/leave detection and event sinks.
//!
//! After association every live track is tested against every zone of the
//! cycle's snapshot. A flip of the membership flag produces one event:
//! outside → inside is `Enter`, inside → outside is `Leave`.
//!
//! Eviction never produces a `Leave`: the membership map is dropped with the
//! track. Deleting a zone does not either; its entries are simply no longer
//! visited.

use crate::{
    track::Track,
    types::{PersonId, PolygonIndex},
    zones::Polygon,
};
use chrono::{DateTime, Utc};
use crossbeam_channel::{Sender, TrySendError};
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{info, warn};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventKind {
    Enter,
    Leave,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            EventKind::Enter => "enter",
            EventKind::Leave => "leave",
        })
    }
}

/// A zone boundary crossing. Immutable once emitted.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneEvent {
    pub person_id: PersonId,
    pub polygon_index: PolygonIndex,
    pub event_type: EventKind,
    pub timestamp: DateTime<Utc>,
}

impl fmt::Display for ZoneEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self.event_type {
            EventKind::Enter => "entered",
            EventKind::Leave => "left",
        };
        write!(f, "{} {} Polygon-{}", self.person_id, verb, self.polygon_index)
    }
}

/// Compare each track's position with the zone snapshot, update membership
/// and return the resulting events ordered by (person ID, polygon index).
pub fn evaluate_membership(
    tracks: &mut [Track],
    zones: &[Polygon],
    timestamp: DateTime<Utc>,
) -> Vec<ZoneEvent> {
    let mut events = Vec::new();
    for track in tracks.iter_mut() {
        for zone in zones {
            let inside_now = zone.contains(&track.position);
            let was_inside = track.is_inside(zone.index);
            if inside_now == was_inside {
                continue;
            }
            track.membership.insert(zone.index, inside_now);
            let event = ZoneEvent {
                person_id: track.id,
                polygon_index: zone.index,
                event_type: if inside_now {
                    EventKind::Enter
                } else {
                    EventKind::Leave
                },
                timestamp,
            };
            info!(
                person = track.id.0,
                polygon = zone.index,
                kind = %event.event_type,
                "{event}"
            );
            events.push(event);
        }
    }
    events
}

// ---------------------------------------------------------------------------
// Sinks
// ---------------------------------------------------------------------------

/// Receiver of emitted events, called once per event in emission order.
///
/// Implementations must not block the tracking cycle; persistence retries and
/// backpressure are the sink's own business.
pub trait EventSink {
    fn on_event(&mut self, event: &ZoneEvent);
}

impl EventSink for Vec<ZoneEvent> {
    fn on_event(&mut self, event: &ZoneEvent) {
        self.push(event.clone());
    }
}

impl<S: EventSink + ?Sized> EventSink for &mut S {
    fn on_event(&mut self, event: &ZoneEvent) {
        (**self).on_event(event);
    }
}

impl<S: EventSink + ?Sized> EventSink for Box<S> {
    fn on_event(&mut self, event: &ZoneEvent) {
        (**self).on_event(event);
    }
}

/// Discards everything.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullSink;

impl EventSink for NullSink {
    fn on_event(&mut self, _event: &ZoneEvent) {}
}

/// Hands events to another thread over a crossbeam channel without blocking.
/// A full or disconnected channel drops the event.
#[derive(Debug)]
pub struct ChannelSink {
    tx: Sender<ZoneEvent>,
    dropped: u64,
}

impl ChannelSink {
    pub fn new(tx: Sender<ZoneEvent>) -> Self {
        Self { tx, dropped: 0 }
    }

    /// Events lost to a full or closed channel.
    pub fn dropped(&self) -> u64 {
        self.dropped
    }
}

impl EventSink for ChannelSink {
    fn on_event(&mut self, event: &ZoneEvent) {
        match self.tx.try_send(event.clone()) {
            Ok(()) => {}
            Err(TrySendError::Full(ev)) => {
                self.dropped += 1;
                warn!(dropped = self.dropped, "Event channel full, dropped: {ev}");
            }
            Err(TrySendError::Disconnected(ev)) => {
                self.dropped += 1;
                warn!(dropped = self.dropped, "Event channel closed, dropped: {ev}");
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
