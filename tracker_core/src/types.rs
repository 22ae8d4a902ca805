//! Fundamental types used across the entire workspace.

use chrono::{DateTime, Utc};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::fmt;

/// 2D image-plane position (pixels).
pub type Point = Point2<f64>;

/// Zone identifier as configured by the user (0-based).
pub type PolygonIndex = u32;

// ---------------------------------------------------------------------------
// Identifier types
// ---------------------------------------------------------------------------

/// Persistent identity of a tracked person. Allocated monotonically, never reused.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct PersonId(pub u64);

impl fmt::Display for PersonId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Person-{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Frame geometry
// ---------------------------------------------------------------------------

/// Extent of the video frame. Valid coordinates are `[0, width] x [0, height]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct FrameBounds {
    pub width: f64,
    pub height: f64,
}

impl Default for FrameBounds {
    fn default() -> Self {
        Self {
            width: 640.0,
            height: 480.0,
        }
    }
}

impl FrameBounds {
    pub fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    /// True if `p` lies inside the closed frame rectangle.
    pub fn contains(&self, p: &Point) -> bool {
        (0.0..=self.width).contains(&p.x) && (0.0..=self.height).contains(&p.y)
    }
}

// ---------------------------------------------------------------------------
// Frame
// ---------------------------------------------------------------------------

/// One time step of detector output. Detections carry no identity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// Sequence number assigned by the producer
    pub index: u64,
    /// Capture time (UTC)
    pub timestamp: DateTime<Utc>,
    /// Person centre points, in detector output order
    pub detections: Vec<Point>,
}

impl Frame {
    pub fn new(index: u64, timestamp: DateTime<Utc>, detections: Vec<Point>) -> Self {
        Self {
            index,
            timestamp,
            detections,
        }
    }

    /// A frame in which the detector reported nothing.
    pub fn empty(index: u64, timestamp: DateTime<Utc>) -> Self {
        Self::new(index, timestamp, Vec::new())
    }
}
