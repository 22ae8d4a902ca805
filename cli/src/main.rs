//! `zonetrack` CLI: scenario runs, replay, zone file editing, event statistics.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Duration, Utc};
use clap::{Args, Parser, Subcommand};
use sim::replay::{load_replay, save_replay, ReplayLog};
use sim::scenarios::{Scenario, ScenarioKind};
use sim::storage::{load_events_jsonl, JsonlEventSink, PolygonFile};
use std::path::{Path, PathBuf};
use tracker_core::event_log::LIVE_WINDOW_SECS;
use tracker_core::{
    EngineConfig, EventLog, EventSink, Frame, FrameBounds, Point, PolygonIndex, RunSummary,
    TimeRange, TrackingEngine, ZoneEvent, ZoneRegistry,
};
use tracing::info;

#[derive(Parser)]
#[command(name = "zonetrack", about = "Person tracking and zone crossing events")]
struct Cli {
    #[command(flatten)]
    engine: EngineArgs,
    #[command(subcommand)]
    command: Commands,
}

/// Engine tuning shared by every subcommand.
#[derive(Args)]
struct EngineArgs {
    /// JSON file with an EngineConfig; flags below override it
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Maximum detection-to-track distance in pixels
    #[arg(long, global = true)]
    distance_threshold: Option<f64>,
    /// Consecutive misses tolerated before a track is evicted
    #[arg(long, global = true)]
    max_missed_frames: Option<u32>,
    /// Frame width in pixels
    #[arg(long, global = true)]
    width: Option<f64>,
    /// Frame height in pixels
    #[arg(long, global = true)]
    height: Option<f64>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a named scenario in batch mode and output metrics.
    RunScenario {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Use the zones of this polygon file instead of the scenario's
        #[arg(long)]
        zones: Option<PathBuf>,
        /// Append events to this JSON-lines file
        #[arg(long)]
        events: Option<PathBuf>,
        /// Also save the full replay log
        #[arg(long)]
        save_replay: Option<PathBuf>,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Load and replay a previously recorded run.
    Replay {
        /// Path to replay JSON file
        input: PathBuf,
        /// Append events to this JSON-lines file
        #[arg(long)]
        events: Option<PathBuf>,
        /// Output metrics to a JSON file
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Edit or list the zones of a polygon file.
    Zone {
        #[command(subcommand)]
        action: ZoneAction,
    },
    /// Event history and per-zone statistics from a JSON-lines event log.
    Stats {
        #[arg(long)]
        events: PathBuf,
        /// Only events at or after this RFC 3339 time
        #[arg(long)]
        start: Option<DateTime<Utc>>,
        /// Only events at or before this RFC 3339 time
        #[arg(long)]
        end: Option<DateTime<Utc>>,
        #[arg(long, default_value_t = 1)]
        page: usize,
        #[arg(long, default_value_t = 20)]
        limit: usize,
        /// Look-back for live zone counts, in seconds
        #[arg(long, default_value_t = LIVE_WINDOW_SECS)]
        live_window: i64,
        /// Reference time for live counts (defaults to now)
        #[arg(long)]
        now: Option<DateTime<Utc>>,
    },
}

#[derive(Subcommand)]
enum ZoneAction {
    /// Create or replace a zone.
    Add {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        index: PolygonIndex,
        /// Vertices as "x,y x,y x,y ..."
        #[arg(long)]
        points: String,
    },
    /// Soft-delete one zone.
    Delete {
        #[arg(long)]
        file: PathBuf,
        #[arg(long)]
        index: PolygonIndex,
    },
    /// Soft-delete every zone.
    Clear {
        #[arg(long)]
        file: PathBuf,
    },
    /// List zones.
    List {
        #[arg(long)]
        file: PathBuf,
        /// Include deleted zones
        #[arg(long)]
        all: bool,
    },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let config = cli.engine.resolve()?;

    match cli.command {
        Commands::RunScenario {
            scenario,
            seed,
            zones,
            events,
            save_replay: save_path,
            output,
        } => {
            run_scenario(
                scenario,
                seed,
                config,
                zones.as_deref(),
                events.as_deref(),
                save_path.as_deref(),
                output.as_deref(),
            )?;
        }
        Commands::Replay {
            input,
            events,
            output,
        } => {
            run_replay(&input, events.as_deref(), output.as_deref())?;
        }
        Commands::Zone { action } => run_zone(action, config.bounds, Utc::now())?,
        Commands::Stats {
            events,
            start,
            end,
            page,
            limit,
            live_window,
            now,
        } => {
            let log = load_events_jsonl(&events)?;
            show_stats(
                &log,
                TimeRange::new(start, end),
                page,
                limit,
                Duration::seconds(live_window),
                now.unwrap_or_else(Utc::now),
            )?;
        }
    }

    Ok(())
}

impl EngineArgs {
    fn resolve(&self) -> Result<EngineConfig> {
        let mut config = match &self.config {
            Some(path) => {
                let text = std::fs::read_to_string(path)
                    .with_context(|| format!("reading config {}", path.display()))?;
                serde_json::from_str(&text)
                    .with_context(|| format!("parsing config {}", path.display()))?
            }
            None => EngineConfig::default(),
        };
        if let Some(d) = self.distance_threshold {
            config.distance_threshold = d;
        }
        if let Some(m) = self.max_missed_frames {
            config.max_missed_frames = m;
        }
        if let Some(w) = self.width {
            config.bounds.width = w;
        }
        if let Some(h) = self.height {
            config.bounds.height = h;
        }
        if !(config.distance_threshold.is_finite() && config.distance_threshold >= 0.0) {
            bail!("distance threshold must be a non-negative number");
        }
        if !(config.bounds.width > 0.0 && config.bounds.height > 0.0) {
            bail!("frame bounds must be positive");
        }
        Ok(config)
    }
}

/// Collects every event in memory and optionally mirrors it to a JSON-lines file.
struct RunSink {
    log: EventLog,
    file: Option<JsonlEventSink>,
}

impl RunSink {
    fn open(events_path: Option<&Path>) -> Result<Self> {
        let file = events_path.map(JsonlEventSink::append).transpose()?;
        Ok(Self {
            log: EventLog::new(),
            file,
        })
    }

    fn finish(&mut self) -> Result<()> {
        if let Some(file) = &mut self.file {
            file.flush()?;
            if file.failed() > 0 {
                println!("Warning: {} events could not be written", file.failed());
            }
        }
        Ok(())
    }
}

impl EventSink for RunSink {
    fn on_event(&mut self, event: &ZoneEvent) {
        self.log.append(event.clone());
        if let Some(file) = &mut self.file {
            file.on_event(event);
        }
    }
}

fn run_scenario(
    kind: ScenarioKind,
    seed: u64,
    config: EngineConfig,
    zones_path: Option<&Path>,
    events_path: Option<&Path>,
    replay_path: Option<&Path>,
    output_path: Option<&Path>,
) -> Result<()> {
    let (scenario, registry) = prepare_scenario(kind, seed, &config, zones_path)?;

    println!(
        "Running scenario '{}' (seed={}, duration={:.0}s, {} zones)...",
        scenario.name,
        seed,
        scenario.duration,
        registry.active_len()
    );

    let (summary, engine, log, elapsed) =
        drive(config.clone(), registry.clone(), scenario.frames(), events_path)?;
    report(&summary, &engine, elapsed);

    if let Some(rpath) = replay_path {
        let log = ReplayLog {
            scenario_name: scenario.name.clone(),
            seed,
            config,
            zones: registry.all(),
            frames: scenario.frames().collect(),
        };
        save_replay(&log, rpath)?;
        println!("Replay saved to {}", rpath.display());
    }

    if let Some(opath) = output_path {
        write_metrics(opath, &scenario.name, seed, &summary, &engine, &log, elapsed)?;
    }

    Ok(())
}

/// Build the scenario on the configured frame and its zone registry.
fn prepare_scenario(
    kind: ScenarioKind,
    seed: u64,
    config: &EngineConfig,
    zones_path: Option<&Path>,
) -> Result<(Scenario, ZoneRegistry)> {
    let mut scenario = Scenario::build(kind, seed);
    scenario.bounds = config.bounds;
    let registry = match zones_path {
        Some(path) => PolygonFile::load(path)?.into_registry(config.bounds),
        None => scenario.zone_registry().with_context(|| {
            format!(
                "scenario zones do not fit a {}x{} frame",
                config.bounds.width, config.bounds.height
            )
        })?,
    };
    Ok((scenario, registry))
}

fn run_replay(input: &Path, events_path: Option<&Path>, output_path: Option<&Path>) -> Result<()> {
    let replay = load_replay(input)?;
    println!(
        "Replaying '{}' ({} frames, {} zones)...",
        replay.scenario_name,
        replay.frames.len(),
        replay.zones.iter().filter(|z| !z.is_deleted).count()
    );

    let registry = replay.zone_registry();
    let (summary, engine, log, elapsed) = drive(
        replay.config.clone(),
        registry,
        replay.frames.iter().cloned(),
        events_path,
    )?;
    report(&summary, &engine, elapsed);

    if let Some(opath) = output_path {
        write_metrics(
            opath,
            &replay.scenario_name,
            replay.seed,
            &summary,
            &engine,
            &log,
            elapsed,
        )?;
    }

    Ok(())
}

fn drive(
    config: EngineConfig,
    registry: ZoneRegistry,
    frames: impl IntoIterator<Item = Frame>,
    events_path: Option<&Path>,
) -> Result<(RunSummary, TrackingEngine, EventLog, std::time::Duration)> {
    let mut sink = RunSink::open(events_path)?;
    let mut engine = TrackingEngine::new(config, registry);

    let start = std::time::Instant::now();
    let summary = engine.run(frames, &mut sink);
    let elapsed = start.elapsed();

    sink.finish()?;
    if let Some(path) = events_path {
        info!(path = %path.display(), events = summary.events, "Events appended");
    }
    Ok((summary, engine, sink.log, elapsed))
}

fn report(summary: &RunSummary, engine: &TrackingEngine, elapsed: std::time::Duration) {
    let snapshot = engine.live_snapshot();
    println!(
        "Done: {} frames, {} events, {} births, {} evictions, elapsed={:.2}s",
        summary.frames,
        summary.events,
        summary.births,
        summary.evictions,
        elapsed.as_secs_f64(),
    );
    println!("Live persons: {}", snapshot.live_count());
    for (index, count) in &snapshot.occupancy {
        println!("  Polygon-{index}: {count} inside");
    }
}

fn write_metrics(
    path: &Path,
    scenario: &str,
    seed: u64,
    summary: &RunSummary,
    engine: &TrackingEngine,
    log: &EventLog,
    elapsed: std::time::Duration,
) -> Result<()> {
    let json = serde_json::json!({
        "scenario": scenario,
        "seed": seed,
        "elapsed_s": elapsed.as_secs_f64(),
        "summary": summary,
        "live": engine.live_snapshot(),
        "polygon_stats": log.polygon_stats(TimeRange::all())?,
    });
    std::fs::write(path, serde_json::to_string_pretty(&json)?)?;
    println!("Metrics saved to {}", path.display());
    Ok(())
}

fn run_zone(action: ZoneAction, bounds: FrameBounds, now: DateTime<Utc>) -> Result<()> {
    match action {
        ZoneAction::Add {
            file,
            index,
            points,
        } => {
            let mut zones = PolygonFile::load(&file)?;
            zones.upsert(index, parse_points(&points)?, &bounds, now)?;
            zones.save(&file)?;
            println!("Polygon-{index} saved to {}", file.display());
        }
        ZoneAction::Delete { file, index } => {
            let mut zones = PolygonFile::load(&file)?;
            zones.soft_delete(index, now)?;
            zones.save(&file)?;
            println!("Polygon-{index} deleted");
        }
        ZoneAction::Clear { file } => {
            let mut zones = PolygonFile::load(&file)?;
            let n = zones.soft_delete_all(now);
            zones.save(&file)?;
            println!("{n} polygons deleted");
        }
        ZoneAction::List { file, all } => {
            let zones = PolygonFile::load(&file)?;
            let listing = zones.listing(all);
            for z in &listing {
                let pts: Vec<String> = z.points.iter().map(|p| format!("{},{}", p.x, p.y)).collect();
                let state = if z.is_deleted { " (deleted)" } else { "" };
                println!(
                    "Polygon-{}{}: {} [updated {}]",
                    z.index,
                    state,
                    pts.join(" "),
                    z.updated_at.to_rfc3339()
                );
            }
            println!("{} polygons", listing.len());
        }
    }
    Ok(())
}

/// Parse `"x,y x,y ..."` into points.
fn parse_points(text: &str) -> Result<Vec<Point>> {
    text.split_whitespace()
        .map(|pair| -> Result<Point> {
            let (x, y) = pair
                .split_once(',')
                .with_context(|| format!("expected x,y but got '{pair}'"))?;
            let x: f64 = x.trim().parse().with_context(|| format!("bad x in '{pair}'"))?;
            let y: f64 = y.trim().parse().with_context(|| format!("bad y in '{pair}'"))?;
            Ok(Point::new(x, y))
        })
        .collect()
}

fn show_stats(
    log: &EventLog,
    range: TimeRange,
    page: usize,
    limit: usize,
    live_window: Duration,
    now: DateTime<Utc>,
) -> Result<()> {
    let history = log.query(range, page, limit)?;
    println!(
        "Events {}-{} of {} (page {}/{})",
        history.offset.saturating_add(1).min(history.total),
        history.offset.saturating_add(history.events.len()),
        history.total,
        history.page,
        history.total_pages.max(1)
    );
    for ev in &history.events {
        println!("  {}  {}", ev.timestamp.to_rfc3339(), ev);
    }

    println!("Per-zone totals:");
    for s in log.polygon_stats(range)? {
        println!(
            "  Polygon-{}: {} enter, {} leave",
            s.polygon_index, s.enter_count, s.leave_count
        );
    }

    let live = log.live_counts(now, live_window);
    println!("Live counts (last {}s):", live_window.num_seconds());
    for (index, count) in &live {
        println!("  Polygon-{index}: {count}");
    }
    Ok(())
}
