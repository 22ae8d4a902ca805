//! Replay: record a scenario's frame stream so a run can be repeated offline.

use crate::scenarios::Scenario;
use anyhow::Context;
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::path::Path;
use tracker_core::{EngineConfig, Frame, Polygon, ZoneRegistry};

/// A full recorded run input.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplayLog {
    pub scenario_name: String,
    pub seed: u64,
    pub config: EngineConfig,
    /// Zone records as they were when the run started
    pub zones: Vec<Polygon>,
    /// All frames in producer order
    pub frames: Vec<Frame>,
}

impl ReplayLog {
    /// Materialize every frame of `scenario`.
    pub fn record(scenario: &Scenario, config: EngineConfig) -> anyhow::Result<Self> {
        let registry = scenario
            .zone_registry()
            .with_context(|| format!("building zones for scenario {}", scenario.name))?;
        Ok(Self {
            scenario_name: scenario.name.clone(),
            seed: scenario.seed,
            config,
            zones: registry.all(),
            frames: scenario.frames().collect(),
        })
    }

    /// Registry rebuilt from the recorded zones.
    pub fn zone_registry(&self) -> ZoneRegistry {
        ZoneRegistry::from_records(self.config.bounds, self.zones.iter().cloned())
    }
}

/// Save a replay log to a JSON file.
pub fn save_replay(log: &ReplayLog, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating replay file {}", path.display()))?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, log)?;
    Ok(())
}

/// Load a replay log from a JSON file.
pub fn load_replay(path: &Path) -> anyhow::Result<ReplayLog> {
    let file = std::fs::File::open(path)
        .with_context(|| format!("opening replay file {}", path.display()))?;
    let reader = BufReader::new(file);
    let log: ReplayLog = serde_json::from_reader(reader)?;
    Ok(log)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scenarios::ScenarioKind;
    use tracker_core::TrackingEngine;

    #[test]
    fn replayed_run_matches_live_run() {
        let sc = Scenario::build(ScenarioKind::Simple, 9);
        let log = ReplayLog::record(&sc, EngineConfig::default()).unwrap();

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("simple.json");
        save_replay(&log, &path).unwrap();
        let loaded = load_replay(&path).unwrap();
        assert_eq!(loaded.frames.len(), log.frames.len());
        assert_eq!(loaded.zones, log.zones);

        let mut live: Vec<tracker_core::ZoneEvent> = Vec::new();
        TrackingEngine::new(EngineConfig::default(), sc.zone_registry().unwrap())
            .run(sc.frames(), &mut live);
        let mut replayed: Vec<tracker_core::ZoneEvent> = Vec::new();
        TrackingEngine::new(loaded.config.clone(), loaded.zone_registry())
            .run(loaded.frames.clone(), &mut replayed);
        assert_eq!(live, replayed);
    }

    #[test]
    fn missing_replay_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(load_replay(&dir.path().join("nope.json")).is_err());
    }
}
