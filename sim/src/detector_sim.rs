//! Person detector simulator.
//!
//! Generates per-frame detection batches with:
//! - Uniform position noise (bounding-box centre jitter)
//! - Miss probability (1 - P_D)
//! - Poisson clutter (false positives anywhere in the frame)
//! - Occluders: rectangles that hide anyone standing behind them
//!
//! Detections are clamped into the frame and shuffled, since a real detector
//! reports boxes in no particular identity order.

use crate::walker::Walker;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use tracker_core::{geometry::clamp_to_bounds, FrameBounds, Point};

/// Detector quality parameters.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectorSimConfig {
    /// Probability a visible person is detected
    pub p_detection: f64,
    /// Half-width of the uniform centre jitter (pixels)
    pub position_noise: f64,
    /// Mean number of false positives per frame
    pub lambda_clutter: f64,
    /// Rectangles [x_min, y_min, x_max, y_max] the detector cannot see into
    #[serde(default)]
    pub occluders: Vec<[f64; 4]>,
}

impl Default for DetectorSimConfig {
    fn default() -> Self {
        Self {
            p_detection: 0.95,
            position_noise: 3.0,
            lambda_clutter: 0.05,
            occluders: Vec::new(),
        }
    }
}

/// Generates detection batches from a set of walkers.
pub struct DetectorSim {
    pub config: DetectorSimConfig,
    pub bounds: FrameBounds,
    rng: ChaCha8Rng,
}

impl DetectorSim {
    pub fn new(config: DetectorSimConfig, bounds: FrameBounds, seed: u64) -> Self {
        Self {
            config,
            bounds,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Detections for all walkers visible at time `t`.
    pub fn detect(&mut self, walkers: &[Walker], t: f64) -> Vec<Point> {
        let mut detections = Vec::new();
        let noise = self.config.position_noise;

        for walker in walkers {
            let p = walker.position();
            if !walker.is_active(t) || !self.bounds.contains(&p) || self.is_occluded(&p) {
                continue;
            }
            // Miss detection?
            if self.rng.gen::<f64>() > self.config.p_detection {
                continue;
            }
            let jittered = Point::new(
                p.x + self.rng.gen::<f64>() * noise * 2.0 - noise,
                p.y + self.rng.gen::<f64>() * noise * 2.0 - noise,
            );
            detections.push(clamp_to_bounds(&jittered, &self.bounds));
        }

        // Draw Poisson sample by multiplying uniforms until below e^{-lambda}
        let lambda = self.config.lambda_clutter;
        let n_clutter = if lambda <= 0.0 {
            0usize
        } else {
            let mut n = 0usize;
            let threshold = (-lambda).exp();
            let mut prod = self.rng.gen::<f64>();
            while prod > threshold && n < 50 {
                prod *= self.rng.gen::<f64>();
                n += 1;
            }
            n
        };
        for _ in 0..n_clutter {
            detections.push(Point::new(
                self.rng.gen::<f64>() * self.bounds.width,
                self.rng.gen::<f64>() * self.bounds.height,
            ));
        }

        detections.shuffle(&mut self.rng);
        detections
    }

    fn is_occluded(&self, p: &Point) -> bool {
        self.config
            .occluders
            .iter()
            .any(|r| p.x >= r[0] && p.x <= r[2] && p.y >= r[1] && p.y <= r[3])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::walker::MotionSpec;

    fn walkers() -> Vec<Walker> {
        (0..5)
            .map(|i| {
                Walker::new(
                    i,
                    [50.0 + i as f64 * 100.0, 240.0],
                    [0.0, 0.0],
                    MotionSpec::Stationary,
                )
            })
            .collect()
    }

    #[test]
    fn perfect_detector_reports_everyone() {
        let cfg = DetectorSimConfig {
            p_detection: 1.0,
            position_noise: 0.0,
            lambda_clutter: 0.0,
            ..Default::default()
        };
        let mut sim = DetectorSim::new(cfg, FrameBounds::default(), 1);
        let mut dets = sim.detect(&walkers(), 0.0);
        assert_eq!(dets.len(), 5);
        dets.sort_by(|a, b| a.x.total_cmp(&b.x));
        assert_eq!(dets[0], Point::new(50.0, 240.0));
    }

    #[test]
    fn noise_stays_bounded() {
        let cfg = DetectorSimConfig {
            p_detection: 1.0,
            position_noise: 4.0,
            lambda_clutter: 0.0,
            ..Default::default()
        };
        let mut sim = DetectorSim::new(cfg, FrameBounds::default(), 2);
        let ws = walkers();
        for frame in 0..50 {
            for d in sim.detect(&ws, frame as f64) {
                let nearest = ws
                    .iter()
                    .map(|w| nalgebra::distance(&w.position(), &d))
                    .fold(f64::INFINITY, f64::min);
                assert!(nearest <= 4.0 * std::f64::consts::SQRT_2 + 1e-9);
            }
        }
    }

    #[test]
    fn same_seed_same_batches() {
        let cfg = DetectorSimConfig {
            lambda_clutter: 1.5,
            ..Default::default()
        };
        let mut a = DetectorSim::new(cfg.clone(), FrameBounds::default(), 42);
        let mut b = DetectorSim::new(cfg, FrameBounds::default(), 42);
        for frame in 0..20 {
            assert_eq!(a.detect(&walkers(), frame as f64), b.detect(&walkers(), frame as f64));
        }
    }

    #[test]
    fn inactive_and_offscreen_walkers_are_invisible() {
        let cfg = DetectorSimConfig {
            p_detection: 1.0,
            lambda_clutter: 0.0,
            ..Default::default()
        };
        let mut sim = DetectorSim::new(cfg, FrameBounds::default(), 3);
        let ws = vec![
            Walker::new(0, [100.0, 100.0], [0.0, 0.0], MotionSpec::Stationary)
                .active_between(Some(5.0), None),
            Walker::new(1, [-20.0, 100.0], [0.0, 0.0], MotionSpec::Stationary),
        ];
        assert!(sim.detect(&ws, 0.0).is_empty());
        assert_eq!(sim.detect(&ws, 5.0).len(), 1);
    }

    #[test]
    fn occluder_hides_walker() {
        let cfg = DetectorSimConfig {
            p_detection: 1.0,
            lambda_clutter: 0.0,
            occluders: vec![[80.0, 80.0, 120.0, 120.0]],
            ..Default::default()
        };
        let mut sim = DetectorSim::new(cfg, FrameBounds::default(), 4);
        let ws = vec![
            Walker::new(0, [100.0, 100.0], [0.0, 0.0], MotionSpec::Stationary),
            Walker::new(1, [300.0, 100.0], [0.0, 0.0], MotionSpec::Stationary),
        ];
        let dets = sim.detect(&ws, 0.0);
        assert_eq!(dets.len(), 1);
        assert!(dets[0].x > 200.0);
    }
}
