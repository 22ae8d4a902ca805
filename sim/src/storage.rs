//! File-backed persistence: the JSON-lines event log and the polygon file.
//!
//! Event log format: one JSON object per line,
//! `{"person_id":3,"polygon_index":2,"event_type":"leave","timestamp":"2024-01-01T09:00:04.200Z"}`.

use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::fs::{File, OpenOptions};
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use chrono::{DateTime, Utc};
use tracker_core::geometry::validate_polygon;
use tracker_core::{
    EventLog, EventSink, FrameBounds, Point, Polygon, PolygonIndex, TrackerError, ZoneEvent,
    ZoneRegistry,
};

// ---------------------------------------------------------------------------
// Event log
// ---------------------------------------------------------------------------

/// Event sink that appends each event as one JSON line.
///
/// A failed write is logged and counted; the tracking cycle is never
/// interrupted by storage trouble.
pub struct JsonlEventSink {
    path: PathBuf,
    writer: BufWriter<File>,
    written: u64,
    failed: u64,
}

impl JsonlEventSink {
    /// Open `path` for appending, creating it if needed.
    pub fn append(path: &Path) -> anyhow::Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("opening event log {}", path.display()))?;
        Ok(Self {
            path: path.to_path_buf(),
            writer: BufWriter::new(file),
            written: 0,
            failed: 0,
        })
    }

    pub fn written(&self) -> u64 {
        self.written
    }

    pub fn failed(&self) -> u64 {
        self.failed
    }

    pub fn flush(&mut self) -> anyhow::Result<()> {
        self.writer
            .flush()
            .with_context(|| format!("flushing event log {}", self.path.display()))
    }

    fn write_line(&mut self, event: &ZoneEvent) -> anyhow::Result<()> {
        serde_json::to_writer(&mut self.writer, event)?;
        self.writer.write_all(b"\n")?;
        Ok(())
    }
}

impl EventSink for JsonlEventSink {
    fn on_event(&mut self, event: &ZoneEvent) {
        match self.write_line(event) {
            Ok(()) => self.written += 1,
            Err(e) => {
                self.failed += 1;
                warn!(path = %self.path.display(), error = %e, "Event log write failed");
            }
        }
    }
}

/// Read a JSON-lines event log. A missing file is an empty log.
pub fn load_events_jsonl(path: &Path) -> anyhow::Result<EventLog> {
    let file = match File::open(path) {
        Ok(f) => f,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            debug!(path = %path.display(), "No event log yet");
            return Ok(EventLog::new());
        }
        Err(e) => {
            return Err(e).with_context(|| format!("opening event log {}", path.display()))
        }
    };
    let mut log = EventLog::new();
    for (n, line) in BufReader::new(file).lines().enumerate() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let event: ZoneEvent = serde_json::from_str(&line)
            .with_context(|| format!("{}:{}: malformed event", path.display(), n + 1))?;
        log.append(event);
    }
    Ok(log)
}

// ---------------------------------------------------------------------------
// Polygon file
// ---------------------------------------------------------------------------

/// Persisted zone records, tombstones included.
///
/// Edits touch only the records of the index being edited; every other
/// record is written back exactly as it was read. Cleanup (skipping short
/// records, clamping to the frame) happens only in [`PolygonFile::into_registry`].
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct PolygonFile {
    pub polygons: Vec<Polygon>,
}

impl PolygonFile {
    /// Load `path`. A missing file is an empty set.
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        let file = match File::open(path) {
            Ok(f) => f,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Self::default()),
            Err(e) => {
                return Err(e).with_context(|| format!("opening polygon file {}", path.display()))
            }
        };
        let parsed = serde_json::from_reader(BufReader::new(file))
            .with_context(|| format!("parsing polygon file {}", path.display()))?;
        Ok(parsed)
    }

    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let file = File::create(path)
            .with_context(|| format!("creating polygon file {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        serde_json::to_writer_pretty(&mut writer, self)?;
        writer.flush()?;
        Ok(())
    }

    /// Create or replace zone `index`. A tombstoned index is revived.
    pub fn upsert(
        &mut self,
        index: PolygonIndex,
        points: Vec<Point>,
        bounds: &FrameBounds,
        now: DateTime<Utc>,
    ) -> tracker_core::Result<()> {
        validate_polygon(&points, bounds)?;
        let target = self
            .polygons
            .iter()
            .rposition(|p| p.index == index && !p.is_deleted)
            .or_else(|| self.polygons.iter().rposition(|p| p.index == index));
        match target {
            Some(i) => {
                let rec = &mut self.polygons[i];
                rec.points = points;
                rec.is_deleted = false;
                rec.updated_at = now;
            }
            None => self.polygons.push(Polygon {
                index,
                points,
                is_deleted: false,
                updated_at: now,
            }),
        }
        Ok(())
    }

    /// Tombstone zone `index`. Deleting an already deleted zone is a no-op.
    pub fn soft_delete(
        &mut self,
        index: PolygonIndex,
        now: DateTime<Utc>,
    ) -> tracker_core::Result<()> {
        if !self.polygons.iter().any(|p| p.index == index) {
            return Err(TrackerError::NotFound(index));
        }
        for rec in self.polygons.iter_mut().filter(|p| p.index == index && !p.is_deleted) {
            rec.is_deleted = true;
            rec.updated_at = now;
        }
        Ok(())
    }

    /// Tombstone every active zone. Returns how many were affected.
    pub fn soft_delete_all(&mut self, now: DateTime<Utc>) -> usize {
        let mut n = 0;
        for rec in self.polygons.iter_mut().filter(|p| !p.is_deleted) {
            rec.is_deleted = true;
            rec.updated_at = now;
            n += 1;
        }
        n
    }

    /// Records ordered by index, tombstones only when `include_deleted`.
    pub fn listing(&self, include_deleted: bool) -> Vec<&Polygon> {
        let mut out: Vec<&Polygon> = self
            .polygons
            .iter()
            .filter(|p| include_deleted || !p.is_deleted)
            .collect();
        out.sort_by_key(|p| p.index);
        out
    }

    pub fn from_registry(registry: &ZoneRegistry) -> Self {
        Self {
            polygons: registry.all(),
        }
    }

    pub fn into_registry(self, bounds: FrameBounds) -> ZoneRegistry {
        ZoneRegistry::from_records(bounds, self.polygons)
    }
}
