//! Scenario definitions.
//!
//! Each scenario is a named configuration of walkers, zones and detector
//! quality over a fixed camera frame. All scenarios are deterministic given
//! the same seed.

use crate::{
    detector_sim::{DetectorSim, DetectorSimConfig},
    walker::{MotionSpec, Walker},
};
use chrono::{DateTime, Duration, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracker_core::{Frame, FrameBounds, Point, PolygonIndex, ZoneRegistry};

/// Which pre-defined scenario to load.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// 5 walkers crossing two zones, clean detector
    Simple,
    /// 60 walkers wandering between four zones, clutter
    Crowd,
    /// 6 walkers passing behind a pillar inside a zone
    Occlusion,
}

/// A zone drawn on the camera frame.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ZoneSpec {
    pub index: PolygonIndex,
    pub points: Vec<[f64; 2]>,
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    pub duration: f64, // seconds
    pub fps: f64,
    pub bounds: FrameBounds,
    pub start_time: DateTime<Utc>,
    pub detector: DetectorSimConfig,
    pub walkers: Vec<Walker>,
    pub zones: Vec<ZoneSpec>,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        match kind {
            ScenarioKind::Simple => Self::simple(seed),
            ScenarioKind::Crowd => Self::crowd(seed),
            ScenarioKind::Occlusion => Self::occlusion(seed),
        }
    }

    /// Number of frames the scenario produces.
    pub fn frame_count(&self) -> u64 {
        (self.duration * self.fps).round().max(0.0) as u64
    }

    /// Registry holding the scenario's zones, stamped `start_time`.
    pub fn zone_registry(&self) -> tracker_core::Result<ZoneRegistry> {
        let registry = ZoneRegistry::new(self.bounds);
        for zone in &self.zones {
            let points = zone.points.iter().map(|p| Point::new(p[0], p[1])).collect();
            registry.upsert(zone.index, points, self.start_time)?;
        }
        Ok(registry)
    }

    /// Lazily generated frame stream. Each call starts over from the
    /// scenario's initial state.
    pub fn frames(&self) -> FrameStream {
        FrameStream {
            walkers: self.walkers.clone(),
            detector: DetectorSim::new(self.detector.clone(), self.bounds, self.seed),
            dt: 1.0 / self.fps,
            start_time: self.start_time,
            next: 0,
            total: self.frame_count(),
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 1: Simple
    // -----------------------------------------------------------------------
    fn simple(seed: u64) -> Self {
        let walkers = vec![
            walker(1, [20., 120.], [40., 0.], MotionSpec::ConstantVelocity, None, None),
            walker(2, [620., 360.], [-35., 0.], MotionSpec::ConstantVelocity, None, None),
            walker(
                3,
                [320., 20.],
                [0., 0.],
                MotionSpec::Waypoints {
                    waypoints: vec![[320., 240.], [120., 400.], [20., 460.]],
                    speed: 30.,
                },
                Some(2.0),
                None,
            ),
            walker(4, [500., 100.], [0., 0.], MotionSpec::Stationary, None, Some(12.0)),
            walker(
                5,
                [40., 300.],
                [0., 0.],
                MotionSpec::Waypoints {
                    waypoints: vec![[200., 300.], [200., 100.], [600., 100.]],
                    speed: 45.,
                },
                Some(5.0),
                None,
            ),
        ];

        let zones = vec![rect_zone(1, 100., 60., 260., 200.), rect_zone(2, 380., 280., 560., 440.)];

        Scenario {
            name: "simple".into(),
            seed,
            duration: 20.0,
            fps: 10.0,
            bounds: FrameBounds::default(),
            start_time: epoch(),
            detector: DetectorSimConfig {
                p_detection: 1.0,
                position_noise: 1.0,
                lambda_clutter: 0.0,
                occluders: Vec::new(),
            },
            walkers,
            zones,
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 2: Crowd
    // -----------------------------------------------------------------------
    fn crowd(seed: u64) -> Self {
        use rand::prelude::*;
        use rand_chacha::ChaCha8Rng;
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));
        let bounds = FrameBounds::default();

        let walkers = (0..60)
            .map(|i| {
                let start = [
                    rng.gen::<f64>() * bounds.width,
                    rng.gen::<f64>() * bounds.height,
                ];
                let waypoints = (0..4)
                    .map(|_| {
                        [
                            20.0 + rng.gen::<f64>() * (bounds.width - 40.0),
                            20.0 + rng.gen::<f64>() * (bounds.height - 40.0),
                        ]
                    })
                    .collect();
                let speed = 15.0 + rng.gen::<f64>() * 35.0;
                let appear = rng.gen::<f64>() * 20.0;
                let disappear = if rng.gen::<f64>() < 0.3 {
                    Some(appear + 10.0 + rng.gen::<f64>() * 20.0)
                } else {
                    None
                };
                walker(
                    i,
                    start,
                    [0., 0.],
                    MotionSpec::Waypoints { waypoints, speed },
                    Some(appear),
                    disappear,
                )
            })
            .collect();

        let zones = vec![
            rect_zone(1, 40., 40., 280., 200.),
            rect_zone(2, 360., 40., 600., 200.),
            ZoneSpec {
                index: 3,
                points: vec![[320., 220.], [440., 300.], [400., 440.], [240., 440.], [200., 300.]],
            },
            ZoneSpec {
                index: 4,
                points: vec![[20., 260.], [180., 260.], [20., 460.]],
            },
        ];

        Scenario {
            name: "crowd".into(),
            seed,
            duration: 60.0,
            fps: 10.0,
            bounds,
            start_time: epoch(),
            detector: DetectorSimConfig {
                p_detection: 0.9,
                position_noise: 3.0,
                lambda_clutter: 0.3,
                occluders: Vec::new(),
            },
            walkers,
            zones,
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 3: Occlusion
    // -----------------------------------------------------------------------
    fn occlusion(seed: u64) -> Self {
        // Pillar in the middle of the zone; walkers are hidden for under a
        // second while crossing behind it, well under the eviction horizon.
        let walkers = (0..6)
            .map(|i| {
                let y = 180. + i as f64 * 25.;
                let (x, vx) = if i % 2 == 0 { (10., 40.) } else { (630., -40.) };
                walker(
                    i,
                    [x, y],
                    [vx, 0.],
                    MotionSpec::ConstantVelocity,
                    Some(i as f64 * 1.5),
                    None,
                )
            })
            .collect();

        Scenario {
            name: "occlusion".into(),
            seed,
            duration: 30.0,
            fps: 10.0,
            bounds: FrameBounds::default(),
            start_time: epoch(),
            detector: DetectorSimConfig {
                p_detection: 0.85,
                position_noise: 2.0,
                lambda_clutter: 0.02,
                occluders: vec![[300., 150., 330., 340.]],
            },
            walkers,
            zones: vec![rect_zone(1, 200., 140., 440., 350.)],
        }
    }
}

/// Iterator over the frames of a scenario.
pub struct FrameStream {
    walkers: Vec<Walker>,
    detector: DetectorSim,
    dt: f64,
    start_time: DateTime<Utc>,
    next: u64,
    total: u64,
}

impl Iterator for FrameStream {
    type Item = Frame;

    fn next(&mut self) -> Option<Frame> {
        if self.next >= self.total {
            return None;
        }
        let index = self.next;
        let t = index as f64 * self.dt;
        let detections = self.detector.detect(&self.walkers, t);
        for w in self.walkers.iter_mut().filter(|w| w.is_active(t)) {
            w.step(self.dt);
        }
        self.next += 1;
        let timestamp = self.start_time + Duration::microseconds((t * 1e6).round() as i64);
        Some(Frame::new(index, timestamp, detections))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let left = (self.total - self.next) as usize;
        (left, Some(left))
    }
}

// ---------------------------------------------------------------------------
// Builder helpers
// ---------------------------------------------------------------------------

fn walker(
    id: u64,
    pos: [f64; 2],
    vel: [f64; 2],
    motion: MotionSpec,
    appear_at: Option<f64>,
    disappear_at: Option<f64>,
) -> Walker {
    Walker::new(id, pos, vel, motion).active_between(appear_at, disappear_at)
}

fn rect_zone(index: PolygonIndex, x0: f64, y0: f64, x1: f64, y1: f64) -> ZoneSpec {
    ZoneSpec {
        index,
        points: vec![[x0, y0], [x1, y0], [x1, y1], [x0, y1]],
    }
}

/// Fixed scenario start so recorded timestamps are reproducible.
fn epoch() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0)
        .single()
        .unwrap_or_default()
}
