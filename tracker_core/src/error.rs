//! Error type for zone configuration and event-log queries.
//!
//! Nothing inside the per-frame cycle can fail: malformed input there is
//! dropped, not reported.

use crate::types::PolygonIndex;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackerError {
    #[error("Invalid polygon: {0}")]
    InvalidPolygon(String),

    #[error("Polygon {0} not found")]
    NotFound(PolygonIndex),

    #[error("Invalid time range: start must be before end")]
    InvalidTimeRange,

    #[error("Invalid page request: page must be at least 1, limit between 1 and 1000")]
    InvalidPage,
}

pub type Result<T> = std::result::Result<T, TrackerError>;
