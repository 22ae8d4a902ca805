//! Zone registry: the user-configured polygons, soft-deletable and versioned.
//!
//! Polygons are never physically removed. Deletion sets a tombstone flag so
//! that past events referencing a polygon index stay resolvable. The tracking
//! engine only ever sees [`ZoneRegistry::active_zones`], a cloned snapshot
//! taken once per cycle, so a concurrent `upsert` either applies to a whole
//! cycle or not at all.

use crate::{
    error::{Result, TrackerError},
    geometry::{clamp_to_bounds, point_in_polygon, validate_polygon, MIN_VERTICES},
    types::{FrameBounds, Point, PolygonIndex},
};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, sync::Arc};
use tracing::{info, warn};

/// A user-defined zone.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Polygon {
    /// Unique among non-deleted polygons
    pub index: PolygonIndex,
    /// Vertices in drawing order; implicitly closed
    pub points: Vec<Point>,
    /// Tombstone flag
    pub is_deleted: bool,
    /// Last replacement or deletion time
    pub updated_at: DateTime<Utc>,
}

impl Polygon {
    pub fn contains(&self, p: &Point) -> bool {
        point_in_polygon(p, &self.points)
    }
}

#[derive(Debug, Default)]
struct RegistryInner {
    bounds: FrameBounds,
    polygons: BTreeMap<PolygonIndex, Polygon>,
    /// Bumped on every successful mutation
    version: u64,
}

/// Shared handle to the polygon set. Cloning the handle shares the registry.
#[derive(Clone, Debug, Default)]
pub struct ZoneRegistry {
    inner: Arc<RwLock<RegistryInner>>,
}

impl ZoneRegistry {
    /// Empty registry validating against `bounds`.
    pub fn new(bounds: FrameBounds) -> Self {
        Self {
            inner: Arc::new(RwLock::new(RegistryInner {
                bounds,
                ..Default::default()
            })),
        }
    }

    /// Rebuild a registry from persisted records.
    ///
    /// Records with fewer than 3 points are skipped. Coordinates are clamped
    /// into the frame. When two active records share an index, the most
    /// recently updated one wins.
    pub fn from_records(bounds: FrameBounds, records: impl IntoIterator<Item = Polygon>) -> Self {
        let mut polygons: BTreeMap<PolygonIndex, Polygon> = BTreeMap::new();
        for mut rec in records {
            let finite = rec.points.iter().all(|p| p.x.is_finite() && p.y.is_finite());
            if rec.points.len() < MIN_VERTICES || !finite {
                warn!(
                    index = rec.index,
                    points = rec.points.len(),
                    "Skipped invalid polygon record"
                );
                continue;
            }
            rec.points = rec
                .points
                .iter()
                .map(|p| clamp_to_bounds(p, &bounds))
                .collect();

            let replace = match polygons.get(&rec.index) {
                None => true,
                // an active record always beats a tombstone
                Some(existing) => match (existing.is_deleted, rec.is_deleted) {
                    (true, false) => true,
                    (false, true) => false,
                    _ => rec.updated_at >= existing.updated_at,
                },
            };
            if replace {
                polygons.insert(rec.index, rec);
            }
        }
        info!(
            loaded = polygons.len(),
            active = polygons.values().filter(|p| !p.is_deleted).count(),
            "Zone registry loaded"
        );
        Self {
            inner: Arc::new(RwLock::new(RegistryInner {
                bounds,
                polygons,
                version: 0,
            })),
        }
    }

    pub fn bounds(&self) -> FrameBounds {
        self.inner.read().bounds
    }

    /// Monotonic mutation counter.
    pub fn version(&self) -> u64 {
        self.inner.read().version
    }

    /// Snapshot of the non-deleted polygons, ordered by index.
    pub fn active_zones(&self) -> Vec<Polygon> {
        self.inner
            .read()
            .polygons
            .values()
            .filter(|p| !p.is_deleted)
            .cloned()
            .collect()
    }

    /// Every record ever created, tombstones included, ordered by index.
    pub fn all(&self) -> Vec<Polygon> {
        self.inner.read().polygons.values().cloned().collect()
    }

    /// Lookup by index, tombstones included.
    pub fn get(&self, index: PolygonIndex) -> Option<Polygon> {
        self.inner.read().polygons.get(&index).cloned()
    }

    /// Number of non-deleted polygons.
    pub fn active_len(&self) -> usize {
        self.inner
            .read()
            .polygons
            .values()
            .filter(|p| !p.is_deleted)
            .count()
    }

    /// Create or fully replace the polygon at `index`. A tombstoned index is
    /// revived. Invalid input leaves the registry untouched.
    pub fn upsert(&self, index: PolygonIndex, points: Vec<Point>, now: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write();
        validate_polygon(&points, &inner.bounds)?;
        let vertices = points.len();
        inner.polygons.insert(
            index,
            Polygon {
                index,
                points,
                is_deleted: false,
                updated_at: now,
            },
        );
        inner.version += 1;
        info!(index, vertices, "Polygon saved");
        Ok(())
    }

    /// Tombstone the polygon at `index`. Deleting an already deleted polygon
    /// is a no-op.
    pub fn soft_delete(&self, index: PolygonIndex, now: DateTime<Utc>) -> Result<()> {
        let mut inner = self.inner.write();
        let poly = inner
            .polygons
            .get_mut(&index)
            .ok_or(TrackerError::NotFound(index))?;
        if poly.is_deleted {
            return Ok(());
        }
        poly.is_deleted = true;
        poly.updated_at = now;
        inner.version += 1;
        info!(index, "Polygon marked as deleted");
        Ok(())
    }

    /// Tombstone every active polygon. Returns how many were affected.
    pub fn soft_delete_all(&self, now: DateTime<Utc>) -> usize {
        let mut inner = self.inner.write();
        let mut count = 0;
        for poly in inner.polygons.values_mut().filter(|p| !p.is_deleted) {
            poly.is_deleted = true;
            poly.updated_at = now;
            count += 1;
        }
        if count > 0 {
            inner.version += 1;
        }
        info!(count, "All polygons marked as deleted");
        count
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};

    fn t0() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 7, 23, 14, 30, 0).unwrap()
    }

    fn square(x: f64, y: f64, size: f64) -> Vec<Point> {
        vec![
            Point::new(x, y),
            Point::new(x + size, y),
            Point::new(x + size, y + size),
            Point::new(x, y + size),
        ]
    }

    #[test]
    fn upsert_then_active() {
        let reg = ZoneRegistry::new(FrameBounds::default());
        reg.upsert(1, square(100.0, 100.0, 50.0), t0()).unwrap();
        reg.upsert(0, square(0.0, 0.0, 10.0), t0()).unwrap();

        let active = reg.active_zones();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].index, 0, "Snapshot ordered by index");
        assert_eq!(active[1].index, 1);
        assert_eq!(reg.version(), 2);
    }

    #[test]
    fn upsert_replaces_and_bumps_timestamp() {
        let reg = ZoneRegistry::new(FrameBounds::default());
        reg.upsert(0, square(0.0, 0.0, 10.0), t0()).unwrap();
        let later = t0() + Duration::seconds(5);
        reg.upsert(0, square(20.0, 20.0, 10.0), later).unwrap();

        let active = reg.active_zones();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].points[0], Point::new(20.0, 20.0));
        assert_eq!(active[0].updated_at, later);
    }

    #[test]
    fn invalid_upsert_leaves_registry_unchanged() {
        let reg = ZoneRegistry::new(FrameBounds::default());
        reg.upsert(0, square(0.0, 0.0, 10.0), t0()).unwrap();
        let before = reg.all();
        let version = reg.version();

        let too_short = vec![Point::new(0.0, 0.0), Point::new(1.0, 1.0)];
        assert!(matches!(
            reg.upsert(0, too_short, t0()),
            Err(TrackerError::InvalidPolygon(_))
        ));
        assert!(matches!(
            reg.upsert(3, square(600.0, 10.0, 50.0), t0()),
            Err(TrackerError::InvalidPolygon(_))
        ));

        assert_eq!(reg.all(), before);
        assert_eq!(reg.version(), version);
    }

    #[test]
    fn soft_delete_keeps_history() {
        let reg = ZoneRegistry::new(FrameBounds::default());
        reg.upsert(0, square(0.0, 0.0, 10.0), t0()).unwrap();
        reg.upsert(1, square(50.0, 50.0, 10.0), t0()).unwrap();

        let later = t0() + Duration::seconds(1);
        reg.soft_delete(0, later).unwrap();

        let active = reg.active_zones();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].index, 1);

        let tomb = reg.get(0).expect("tombstone still resolvable");
        assert!(tomb.is_deleted);
        assert_eq!(tomb.updated_at, later);
        assert_eq!(reg.all().len(), 2);
    }

    #[test]
    fn soft_delete_unknown_is_not_found() {
        let reg = ZoneRegistry::new(FrameBounds::default());
        reg.upsert(0, square(0.0, 0.0, 10.0), t0()).unwrap();
        let version = reg.version();
        assert_eq!(reg.soft_delete(7, t0()), Err(TrackerError::NotFound(7)));
        assert_eq!(reg.version(), version);
        assert_eq!(reg.active_len(), 1);
    }

    #[test]
    fn soft_delete_twice_is_noop() {
        let reg = ZoneRegistry::new(FrameBounds::default());
        reg.upsert(0, square(0.0, 0.0, 10.0), t0()).unwrap();
        reg.soft_delete(0, t0()).unwrap();
        let version = reg.version();
        reg.soft_delete(0, t0() + Duration::seconds(9)).unwrap();
        assert_eq!(reg.version(), version);
        assert_eq!(reg.get(0).unwrap().updated_at, t0());
    }

    #[test]
    fn upsert_revives_tombstone() {
        let reg = ZoneRegistry::new(FrameBounds::default());
        reg.upsert(0, square(0.0, 0.0, 10.0), t0()).unwrap();
        reg.soft_delete(0, t0()).unwrap();
        assert_eq!(reg.active_len(), 0);
        reg.upsert(0, square(5.0, 5.0, 10.0), t0()).unwrap();
        assert_eq!(reg.active_len(), 1);
        assert!(!reg.get(0).unwrap().is_deleted);
    }

    #[test]
    fn soft_delete_all_counts_only_active() {
        let reg = ZoneRegistry::new(FrameBounds::default());
        for i in 0..3 {
            reg.upsert(i, square(10.0 * i as f64, 0.0, 5.0), t0()).unwrap();
        }
        reg.soft_delete(2, t0()).unwrap();
        assert_eq!(reg.soft_delete_all(t0()), 2);
        assert!(reg.active_zones().is_empty());
        assert_eq!(reg.all().len(), 3);
        assert_eq!(reg.soft_delete_all(t0()), 0);
    }

    #[test]
    fn from_records_skips_invalid_and_clamps() {
        let bounds = FrameBounds::new(640.0, 480.0);
        let records = vec![
            Polygon {
                index: 0,
                points: vec![Point::new(0.0, 0.0), Point::new(5.0, 5.0)],
                is_deleted: false,
                updated_at: t0(),
            },
            Polygon {
                index: 1,
                points: vec![
                    Point::new(-10.0, 0.0),
                    Point::new(700.0, 0.0),
                    Point::new(700.0, 500.0),
                ],
                is_deleted: false,
                updated_at: t0(),
            },
        ];
        let reg = ZoneRegistry::from_records(bounds, records);
        let active = reg.active_zones();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].index, 1);
        assert_eq!(active[0].points[0], Point::new(0.0, 0.0));
        assert_eq!(active[0].points[2], Point::new(640.0, 480.0));
    }

    #[test]
    fn from_records_prefers_active_then_newest() {
        let old = Polygon {
            index: 4,
            points: square(0.0, 0.0, 10.0),
            is_deleted: false,
            updated_at: t0(),
        };
        let newer = Polygon {
            points: square(30.0, 30.0, 10.0),
            updated_at: t0() + Duration::seconds(60),
            ..old.clone()
        };
        let tomb = Polygon {
            is_deleted: true,
            updated_at: t0() + Duration::seconds(120),
            ..old.clone()
        };
        let reg = ZoneRegistry::from_records(FrameBounds::default(), vec![old, tomb, newer]);
        let poly = reg.get(4).unwrap();
        assert!(!poly.is_deleted);
        assert_eq!(poly.points[0], Point::new(30.0, 30.0));
    }

    #[test]
    fn clones_share_state() {
        let reg = ZoneRegistry::new(FrameBounds::default());
        let other = reg.clone();
        other.upsert(2, square(0.0, 0.0, 10.0), t0()).unwrap();
        assert_eq!(reg.active_len(), 1);
    }
}
