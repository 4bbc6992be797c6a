//! `coopfuse` CLI: scenario runs, replays, JSON metrics export.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use fusion_core::metrics::TrackingMetrics;
use fusion_core::track_manager::{LifecycleCounts, TrackManager, TrackManagerConfig};
use fusion_core::{Pipeline, PipelineConfig, Track, TrackStatus};
use serde::{Deserialize, Serialize};
use sim::replay::{load_replay, save_replay, ReplayLog};
use sim::scenarios::{Scenario, ScenarioKind};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Parser)]
#[command(name = "coopfuse", about = "Cooperative-perception track fusion CLI")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate a named scenario, fuse it and output metrics.
    RunScenario {
        #[arg(value_enum)]
        scenario: ScenarioKind,
        /// Random seed for reproducibility
        #[arg(long, default_value_t = 42)]
        seed: u64,
        /// Also save the full replay log
        #[arg(long)]
        save_replay: Option<PathBuf>,
        #[command(flatten)]
        eval: EvalArgs,
    },
    /// Fuse a previously recorded replay log.
    Replay {
        /// Path to replay JSON file
        input: PathBuf,
        #[command(flatten)]
        eval: EvalArgs,
    },
}

#[derive(Args)]
struct EvalArgs {
    /// JSON file with `pipeline` and `track_manager` sections
    #[arg(long)]
    config: Option<PathBuf>,
    /// Perception cycle length (s)
    #[arg(long, default_value_t = 0.1)]
    cycle_period: f64,
    /// Track-to-truth match radius for metrics (m)
    #[arg(long, default_value_t = 3.0)]
    match_radius: f64,
    /// Output metrics to a JSON file
    #[arg(long)]
    output: Option<PathBuf>,
}

/// Contents of the `--config` file.
#[derive(Debug, Default, Serialize, Deserialize)]
#[serde(default)]
struct Settings {
    pipeline: PipelineConfig,
    track_manager: TrackManagerConfig,
}

#[derive(Debug, Serialize)]
struct Summary {
    scenario: String,
    seed: u64,
    cycles: usize,
    objects: usize,
    elapsed_s: f64,
    confirmed_tracks: usize,
    tentative_tracks: usize,
    lifecycle: LifecycleCounts,
    rmse_position: f64,
    rmse_speed: f64,
    precision: f64,
    recall: f64,
    id_switches: u64,
    metrics: TrackingMetrics,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::RunScenario {
            scenario,
            seed,
            save_replay: save_path,
            eval,
        } => {
            let scenario = Scenario::build(scenario, seed);
            println!(
                "Running scenario '{}' (seed={}, duration={:.0}s, {} agents, {} targets)...",
                scenario.name,
                seed,
                scenario.duration,
                scenario.agents.len(),
                scenario.targets.len()
            );
            let log = scenario.run();
            if let Some(path) = save_path {
                save_replay(&log, &path)?;
                println!("Replay saved to {}", path.display());
            }
            evaluate_and_report(&log, &eval)?;
        }
        Commands::Replay { input, eval } => {
            let log = load_replay(&input).with_context(|| format!("loading {}", input.display()))?;
            println!(
                "Replaying '{}' ({} batches)...",
                log.scenario_name,
                log.batches.len()
            );
            evaluate_and_report(&log, &eval)?;
        }
    }

    Ok(())
}

fn load_settings(path: Option<&Path>) -> Result<Settings> {
    let Some(path) = path else {
        return Ok(Settings::default());
    };
    let text = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let settings = serde_json::from_str(&text).with_context(|| format!("parsing {}", path.display()))?;
    Ok(settings)
}

fn evaluate_and_report(log: &ReplayLog, eval: &EvalArgs) -> Result<()> {
    anyhow::ensure!(eval.cycle_period > 0.0, "cycle period must be positive");
    let settings = load_settings(eval.config.as_deref())?;
    let summary = evaluate(log, &settings, eval.cycle_period, eval.match_radius)?;

    println!(
        "Done: {} cycles, {} objects, elapsed={:.2}s",
        summary.cycles, summary.objects, summary.elapsed_s
    );
    println!(
        "Tracks: {} confirmed, {} tentative (births={}, confirmations={}, deletions={})",
        summary.confirmed_tracks,
        summary.tentative_tracks,
        summary.lifecycle.births,
        summary.lifecycle.confirmations,
        summary.lifecycle.deletions,
    );
    println!(
        "RMSE pos={:.2} m, speed={:.2} m/s, precision={:.3}, recall={:.3}, id switches={}",
        summary.rmse_position, summary.rmse_speed, summary.precision, summary.recall, summary.id_switches
    );

    if let Some(path) = &eval.output {
        std::fs::write(path, serde_json::to_string_pretty(&summary)?)?;
        println!("Metrics saved to {}", path.display());
    }
    Ok(())
}

/// Run every cycle of `log` through the pipeline and the track manager.
fn evaluate(log: &ReplayLog, settings: &Settings, cycle_period: f64, match_radius: f64) -> Result<Summary> {
    let pipeline = Pipeline::new(&settings.pipeline);
    let manager = TrackManager::new(settings.track_manager.clone());
    let mut metrics = TrackingMetrics::default();
    let mut lifecycle = LifecycleCounts::default();
    let mut tracks: Vec<Track> = Vec::new();

    let cycles = log.cycles(cycle_period);
    let start = std::time::Instant::now();
    let mut objects = 0;

    for cycle in &cycles {
        objects += cycle.objects.len();
        let output = pipeline.run(&tracks, &cycle.objects, cycle.time)?;
        debug!(
            time = cycle.time,
            objects = cycle.objects.len(),
            tracks = output.tracks.len(),
            us = output.total_time_us,
            "cycle"
        );
        tracks = output.tracks.clone();
        let counts = manager.update(&mut tracks, &output, &output.aligned_objects, cycle.time);
        lifecycle.births += counts.births;
        lifecycle.confirmations += counts.confirmations;
        lifecycle.deletions += counts.deletions;

        if let Some(frame) = log.truth_at(cycle.time) {
            metrics.accumulate(&tracks, &frame.targets, match_radius);
        }
    }

    let elapsed = start.elapsed().as_secs_f64();
    let count = |status: TrackStatus| tracks.iter().filter(|t| t.status == status).count();
    info!(cycles = cycles.len(), objects, elapsed, "evaluation finished");

    Ok(Summary {
        scenario: log.scenario_name.clone(),
        seed: log.seed,
        cycles: cycles.len(),
        objects,
        elapsed_s: elapsed,
        confirmed_tracks: count(TrackStatus::Confirmed),
        tentative_tracks: count(TrackStatus::Tentative),
        lifecycle,
        rmse_position: metrics.rmse_position(),
        rmse_speed: metrics.rmse_speed(),
        precision: metrics.precision(),
        recall: metrics.recall(),
        id_switches: metrics.id_switches,
        metrics,
    })
}
