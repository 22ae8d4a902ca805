//! `sim` — Pedestrian scenario simulator, detector model, replay and file storage.

pub mod detector_sim;
pub mod replay;
pub mod scenarios;
pub mod storage;
pub mod walker;

pub use detector_sim::{DetectorSim, DetectorSimConfig};
pub use replay::{load_replay, save_replay, ReplayLog};
pub use scenarios::{FrameStream, Scenario, ScenarioKind, ZoneSpec};
pub use storage::{load_events_jsonl, JsonlEventSink, PolygonFile};
pub use walker::{MotionSpec, Walker};
