//! Event log: append-only record of emitted events, with the statistics the
//! reporting side asks for (paged history, per-zone counts, recent activity).

use crate::{
    error::{Result, TrackerError},
    events::{EventKind, EventSink, ZoneEvent},
    types::PolygonIndex,
};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default look-back for "live" statistics.
pub const LIVE_WINDOW_SECS: i64 = 10;

/// Largest page size `query` accepts.
pub const MAX_PAGE_LIMIT: usize = 1000;

/// Optional inclusive time filter.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
}

impl TimeRange {
    pub fn new(start: Option<DateTime<Utc>>, end: Option<DateTime<Utc>>) -> Self {
        Self { start, end }
    }

    /// Unbounded on both sides.
    pub fn all() -> Self {
        Self::default()
    }

    fn validate(&self) -> Result<()> {
        match (self.start, self.end) {
            (Some(s), Some(e)) if s >= e => Err(TrackerError::InvalidTimeRange),
            _ => Ok(()),
        }
    }

    pub fn contains(&self, ts: &DateTime<Utc>) -> bool {
        self.start.map_or(true, |s| *ts >= s) && self.end.map_or(true, |e| *ts <= e)
    }
}

/// One page of history, newest first.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct EventPage {
    pub events: Vec<ZoneEvent>,
    /// Matching events skipped before this page
    pub offset: usize,
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    pub total_pages: usize,
}

/// Enter/leave totals for one zone.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolygonStats {
    pub polygon_index: PolygonIndex,
    pub enter_count: u64,
    pub leave_count: u64,
}

/// In-memory append-only event log.
#[derive(Clone, Debug, Default)]
pub struct EventLog {
    events: Vec<ZoneEvent>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_events(events: Vec<ZoneEvent>) -> Self {
        Self { events }
    }

    pub fn append(&mut self, event: ZoneEvent) {
        self.events.push(event);
    }

    /// Events in append order.
    pub fn events(&self) -> &[ZoneEvent] {
        &self.events
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Matching events, newest first; equal timestamps keep the latest append first.
    fn newest_first(&self, range: &TimeRange) -> Vec<&ZoneEvent> {
        let mut hits: Vec<&ZoneEvent> = self
            .events
            .iter()
            .rev()
            .filter(|e| range.contains(&e.timestamp))
            .collect();
        hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        hits
    }

    /// Paged history. `page` is 1-based, `limit` at most [`MAX_PAGE_LIMIT`].
    pub fn query(&self, range: TimeRange, page: usize, limit: usize) -> Result<EventPage> {
        range.validate()?;
        if page == 0 || limit == 0 || limit > MAX_PAGE_LIMIT {
            return Err(TrackerError::InvalidPage);
        }
        let hits = self.newest_first(&range);
        let total = hits.len();
        let offset = (page - 1).saturating_mul(limit);
        let events = hits
            .into_iter()
            .skip(offset)
            .take(limit)
            .cloned()
            .collect();
        Ok(EventPage {
            events,
            offset,
            total,
            page,
            limit,
            total_pages: total.div_ceil(limit),
        })
    }

    /// Enter/leave counts per zone within `range`, ordered by zone index.
    pub fn polygon_stats(&self, range: TimeRange) -> Result<Vec<PolygonStats>> {
        range.validate()?;
        let mut stats: BTreeMap<PolygonIndex, PolygonStats> = BTreeMap::new();
        for ev in self.events.iter().filter(|e| range.contains(&e.timestamp)) {
            let entry = stats.entry(ev.polygon_index).or_insert(PolygonStats {
                polygon_index: ev.polygon_index,
                ..Default::default()
            });
            match ev.event_type {
                EventKind::Enter => entry.enter_count += 1,
                EventKind::Leave => entry.leave_count += 1,
            }
        }
        Ok(stats.into_values().collect())
    }

    /// Events from the last `window` before `now`, newest first.
    pub fn recent(&self, now: DateTime<Utc>, window: Duration) -> Vec<ZoneEvent> {
        let range = TimeRange::new(Some(now - window), Some(now));
        self.newest_first(&range).into_iter().cloned().collect()
    }

    /// Net enters minus leaves per zone over the recent window, floored at zero.
    ///
    /// Events are replayed oldest first and the floor is applied after each
    /// step, so a leave whose enter fell outside the window cannot push a
    /// zone negative.
    pub fn live_counts(&self, now: DateTime<Utc>, window: Duration) -> BTreeMap<PolygonIndex, u64> {
        let mut counts: BTreeMap<PolygonIndex, u64> = BTreeMap::new();
        for ev in self.recent(now, window).iter().rev() {
            let c = counts.entry(ev.polygon_index).or_insert(0);
            match ev.event_type {
                EventKind::Enter => *c += 1,
                EventKind::Leave => *c = c.saturating_sub(1),
            }
        }
        counts
    }
}

impl EventSink for EventLog {
    fn on_event(&mut self, event: &ZoneEvent) {
        self.append(event.clone());
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
