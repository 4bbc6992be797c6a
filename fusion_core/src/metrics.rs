//! Tracking metrics: RMSE position/speed, ID-switch count, precision/recall.
//!
//! Confirmed tracks are matched to ground truth by nearest neighbour within
//! a match radius, closest pairs first, one track per target.

use crate::{
    motion::CtraState,
    object::{Track, TrackStatus},
    types::TrackId,
};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

/// Ground-truth state of one target at a given time.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct GroundTruth {
    /// True target ID (from simulator)
    pub target_id: u64,
    pub time: f64,
    pub state: CtraState,
}

/// Accumulated metric statistics.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TrackingMetrics {
    /// Number of frames evaluated
    pub n_frames: u64,
    /// Total number of matched (track, target) pairs evaluated
    pub n_matched: u64,
    /// Sum of squared position errors (for RMSE)
    pub sum_sq_pos_err: f64,
    /// Sum of squared speed errors (for RMSE)
    pub sum_sq_speed_err: f64,
    /// Confirmed tracks matched to a target
    pub true_positives: u64,
    /// Confirmed tracks matched to no target
    pub false_positives: u64,
    /// Targets matched by no confirmed track
    pub false_negatives: u64,
    /// A target changed the track that follows it
    pub id_switches: u64,
    #[serde(skip)]
    last_track: HashMap<u64, TrackId>,
}

impl TrackingMetrics {
    /// Root-mean-square position error (meters, 2D).
    pub fn rmse_position(&self) -> f64 {
        if self.n_matched == 0 {
            return 0.0;
        }
        (self.sum_sq_pos_err / self.n_matched as f64).sqrt()
    }

    /// Root-mean-square speed error (m/s).
    pub fn rmse_speed(&self) -> f64 {
        if self.n_matched == 0 {
            return 0.0;
        }
        (self.sum_sq_speed_err / self.n_matched as f64).sqrt()
    }

    /// Precision = TP / (TP + FP)
    pub fn precision(&self) -> f64 {
        let denom = (self.true_positives + self.false_positives) as f64;
        if denom == 0.0 { 1.0 } else { self.true_positives as f64 / denom }
    }

    /// Recall = TP / (TP + FN)
    pub fn recall(&self) -> f64 {
        let denom = (self.true_positives + self.false_negatives) as f64;
        if denom == 0.0 { 1.0 } else { self.true_positives as f64 / denom }
    }

    /// Accumulate one frame. Only confirmed tracks are scored.
    pub fn accumulate(&mut self, tracks: &[Track], ground_truths: &[GroundTruth], match_radius: f64) {
        self.n_frames += 1;

        let confirmed: Vec<&Track> = tracks
            .iter()
            .filter(|t| t.status == TrackStatus::Confirmed)
            .collect();

        let mut candidates: Vec<(usize, usize, f64)> = Vec::new();
        for (ti, track) in confirmed.iter().enumerate() {
            let (x, y) = track.state.position();
            for (gi, gt) in ground_truths.iter().enumerate() {
                let d = (x - gt.state.position_x).hypot(y - gt.state.position_y);
                if d <= match_radius {
                    candidates.push((ti, gi, d));
                }
            }
        }
        candidates.sort_by(|a, b| a.2.partial_cmp(&b.2).unwrap_or(Ordering::Equal));

        let mut track_used = vec![false; confirmed.len()];
        let mut truth_used = vec![false; ground_truths.len()];
        for (ti, gi, d) in candidates {
            if track_used[ti] || truth_used[gi] {
                continue;
            }
            track_used[ti] = true;
            truth_used[gi] = true;

            let track = confirmed[ti];
            let gt = &ground_truths[gi];
            let dv = track.state.velocity() - gt.state.velocity;
            self.sum_sq_pos_err += d * d;
            self.sum_sq_speed_err += dv * dv;
            self.n_matched += 1;
            self.true_positives += 1;

            if let Some(prev) = self.last_track.insert(gt.target_id, track.id.clone()) {
                if prev != track.id {
                    self.id_switches += 1;
                }
            }
        }

        self.false_positives += track_used.iter().filter(|u| !**u).count() as u64;
        self.false_negatives += truth_used.iter().filter(|u| !**u).count() as u64;
    }
}
