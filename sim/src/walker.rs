//! Pedestrian trajectory models and state propagation.
//!
//! Each walker has a true image-plane state [px, py, vx, vy] (pixels,
//! pixels/s) and a `MotionSpec` describing how it moves.

use serde::{Deserialize, Serialize};
use tracker_core::Point;

/// Describes how a walker moves.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum MotionSpec {
    /// Stands still.
    Stationary,
    /// Constant velocity, no turning.
    ConstantVelocity,
    /// Walks through `waypoints` in order at `speed` px/s, then stops.
    Waypoints { waypoints: Vec<[f64; 2]>, speed: f64 },
}

/// A simulated person with ground-truth state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Walker {
    /// Ground-truth ID (not visible to the tracker)
    pub id: u64,
    /// True state [px, py, vx, vy]
    pub state: [f64; 4],
    pub motion: MotionSpec,
    /// Walker enters the scene at this time
    pub appear_at: Option<f64>,
    /// Walker leaves the scene at this time
    pub disappear_at: Option<f64>,
    /// Index of the waypoint currently headed for
    #[serde(default)]
    pub next_waypoint: usize,
}

impl Walker {
    pub fn new(id: u64, pos: [f64; 2], vel: [f64; 2], motion: MotionSpec) -> Self {
        Self {
            id,
            state: [pos[0], pos[1], vel[0], vel[1]],
            motion,
            appear_at: None,
            disappear_at: None,
            next_waypoint: 0,
        }
    }

    /// Restrict presence to `[appear_at, disappear_at)`.
    pub fn active_between(mut self, appear_at: Option<f64>, disappear_at: Option<f64>) -> Self {
        self.appear_at = appear_at;
        self.disappear_at = disappear_at;
        self
    }

    /// Propagate true state by `dt` seconds.
    pub fn step(&mut self, dt: f64) {
        let s = &mut self.state;
        match &self.motion {
            MotionSpec::Stationary => {
                s[2] = 0.0;
                s[3] = 0.0;
            }
            MotionSpec::ConstantVelocity => {
                s[0] += s[2] * dt;
                s[1] += s[3] * dt;
            }
            MotionSpec::Waypoints { waypoints, speed } => {
                let mut budget = speed * dt;
                while budget > 0.0 {
                    let Some(wp) = waypoints.get(self.next_waypoint) else {
                        s[2] = 0.0;
                        s[3] = 0.0;
                        break;
                    };
                    let dx = wp[0] - s[0];
                    let dy = wp[1] - s[1];
                    let dist = (dx * dx + dy * dy).sqrt();
                    if dist <= budget {
                        s[0] = wp[0];
                        s[1] = wp[1];
                        budget -= dist;
                        self.next_waypoint += 1;
                    } else {
                        s[2] = speed * dx / dist;
                        s[3] = speed * dy / dist;
                        s[0] += dx / dist * budget;
                        s[1] += dy / dist * budget;
                        budget = 0.0;
                    }
                }
            }
        }
    }

    /// True if the walker is in the scene at time `t`.
    pub fn is_active(&self, t: f64) -> bool {
        if let Some(appear) = self.appear_at {
            if t < appear {
                return false;
            }
        }
        if let Some(disappear) = self.disappear_at {
            if t >= disappear {
                return false;
            }
        }
        true
    }

    pub fn position(&self) -> Point {
        Point::new(self.state[0], self.state[1])
    }
}
