//! Replay: serialize/deserialize simulation logs for offline analysis and re-runs.

use fusion_core::metrics::GroundTruth;
use fusion_core::{DetectedObject, ObjectBatch};
use serde::{Deserialize, Serialize};
use std::io::{BufReader, BufWriter};
use std::path::Path;

/// A full recorded simulation log.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ReplayLog {
    pub scenario_name: String,
    pub seed: u64,
    pub sim_dt: f64,
    pub duration: f64,
    /// All object batches, ordered by arrival time
    pub batches: Vec<ObjectBatch>,
    /// Ground-truth target states, sampled every `sim_dt`
    pub ground_truth: Vec<GroundTruthFrame>,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct GroundTruthFrame {
    pub time: f64,
    pub targets: Vec<GroundTruth>,
}

/// Objects that reached the fusion node during one perception cycle.
#[derive(Clone, Debug)]
pub struct Cycle {
    /// Cycle end; the pipeline runs at this time
    pub time: f64,
    pub objects: Vec<DetectedObject>,
}

impl ReplayLog {
    /// Group batches into cycles of `period` seconds by arrival time.
    /// Cycle k covers arrivals in ((k − 1)·period, k·period]; cycles with no
    /// arrivals are kept so tracks still get predicted and aged.
    pub fn cycles(&self, period: f64) -> Vec<Cycle> {
        if period <= 0.0 {
            return Vec::new();
        }
        let last_arrival = self
            .batches
            .iter()
            .map(|b| b.arrival_time)
            .fold(self.duration, f64::max);
        let n = (last_arrival / period).ceil() as usize;

        let mut cycles: Vec<Cycle> = (1..=n.max(1))
            .map(|k| Cycle {
                time: k as f64 * period,
                objects: Vec::new(),
            })
            .collect();
        for batch in &self.batches {
            let k = ((batch.arrival_time / period).ceil() as usize).clamp(1, cycles.len());
            cycles[k - 1].objects.extend(batch.objects.iter().cloned());
        }
        cycles
    }

    /// Ground-truth frame closest to `time`.
    pub fn truth_at(&self, time: f64) -> Option<&GroundTruthFrame> {
        self.ground_truth
            .iter()
            .min_by(|a, b| (a.time - time).abs().total_cmp(&(b.time - time).abs()))
    }
}

/// Save a replay log to a JSON file.
pub fn save_replay(log: &ReplayLog, path: &Path) -> anyhow::Result<()> {
    let file = std::fs::File::create(path)?;
    let writer = BufWriter::new(file);
    serde_json::to_writer_pretty(writer, log)?;
    Ok(())
}

/// Load a replay log from a JSON file.
pub fn load_replay(path: &Path) -> anyhow::Result<ReplayLog> {
    let file = std::fs::File::open(path)?;
    let reader = BufReader::new(file);
    let log: ReplayLog = serde_json::from_reader(reader)?;
    Ok(log)
}
