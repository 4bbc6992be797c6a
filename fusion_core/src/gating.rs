//! Gating: decide whether a scored (track, object) pair is plausible enough
//! to be considered by the associator.
//!
//! A rejected pair keeps its entry in the score map; its score becomes
//! [`UNASSIGNABLE`]. Gating never adds or removes entries.
//!
//! # Gate threshold table (χ² at 99%)
//! dof=2: χ²(0.99, 2) ≈ 9.21
//! dof=5: χ²(0.99, 5) ≈ 15.09  (full CTRV subspace)

use crate::types::{ObjectId, ScoreMap, TrackId};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Sentinel score of a pair that must never be assigned.
pub const UNASSIGNABLE: f64 = f64::INFINITY;

/// Pre-computed χ² gate thresholds indexed by dimension [1..=6].
/// Value at index `d` is χ²(0.99, d).
pub const CHI2_99: [f64; 7] = [0.0, 6.63, 9.21, 11.34, 13.28, 15.09, 16.81];

/// True if `score` may take part in association.
pub fn is_assignable(score: f64) -> bool {
    score.is_finite()
}

/// Strategy transforming one score independently of all others.
pub trait Gater: Send + Sync {
    fn gate(&self, pair: &(TrackId, ObjectId), score: f64) -> f64;
}

/// Reject pairs whose score exceeds a fixed radius (same units as the score).
#[derive(Clone, Copy, Debug)]
pub struct FixedRadiusGater {
    pub radius: f64,
}

impl Gater for FixedRadiusGater {
    fn gate(&self, _pair: &(TrackId, ObjectId), score: f64) -> f64 {
        if !score.is_finite() || score > self.radius {
            UNASSIGNABLE
        } else {
            score
        }
    }
}

/// Reject squared Mahalanobis distances beyond χ²(0.99, dof).
#[derive(Clone, Copy, Debug)]
pub struct ChiSquareGater {
    pub threshold: f64,
}

impl ChiSquareGater {
    /// Gate for `dof` degrees of freedom; dimensions beyond the table use
    /// its largest entry.
    pub fn for_dof(dof: usize) -> Self {
        let idx = dof.clamp(1, CHI2_99.len() - 1);
        Self {
            threshold: CHI2_99[idx],
        }
    }
}

impl Gater for ChiSquareGater {
    fn gate(&self, _pair: &(TrackId, ObjectId), score: f64) -> f64 {
        if score.is_finite() && score < self.threshold {
            score
        } else {
            UNASSIGNABLE
        }
    }
}

/// Which gater a pipeline is built with.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum GaterConfig {
    /// Pair rejected when its score exceeds `radius`
    FixedRadius { radius: f64 },
    /// Pair rejected when d² ≥ χ²(0.99, dof)
    ChiSquare { dof: usize },
}

impl Default for GaterConfig {
    fn default() -> Self {
        GaterConfig::FixedRadius { radius: 4.0 }
    }
}

impl GaterConfig {
    pub fn build(&self) -> Box<dyn Gater> {
        match *self {
            GaterConfig::FixedRadius { radius } => Box::new(FixedRadiusGater { radius }),
            GaterConfig::ChiSquare { dof } => Box::new(ChiSquareGater::for_dof(dof)),
        }
    }
}

/// Apply `gater` to every entry of `scores`.
pub fn gate(gater: &dyn Gater, scores: &ScoreMap) -> ScoreMap {
    let gated: ScoreMap = scores
        .iter()
        .map(|(pair, &score)| (pair.clone(), gater.gate(pair, score)))
        .collect();
    debug!(
        pairs = gated.len(),
        passing = gated.values().filter(|s| is_assignable(**s)).count(),
        "gated scores"
    );
    gated
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    fn pair(t: &str, o: &str) -> (TrackId, ObjectId) {
        (TrackId::from(t), ObjectId::from(o))
    }

    #[test]
    fn fixed_radius_keeps_inside_and_rejects_outside() {
        let gater = FixedRadiusGater { radius: 2.0 };
        assert_eq!(gater.gate(&pair("t", "o"), 1.5), 1.5);
        assert_eq!(gater.gate(&pair("t", "o"), 2.0), 2.0);
        assert_eq!(gater.gate(&pair("t", "o"), 2.5), UNASSIGNABLE);
        assert_eq!(gater.gate(&pair("t", "o"), f64::NAN), UNASSIGNABLE);
    }

    #[test]
    fn chi_square_threshold_from_table() {
        assert_eq!(ChiSquareGater::for_dof(2).threshold, 9.21);
        assert_eq!(ChiSquareGater::for_dof(40).threshold, CHI2_99[6]);
        let gater = ChiSquareGater::for_dof(5);
        assert_eq!(gater.gate(&pair("t", "o"), 3.0), 3.0);
        assert_eq!(gater.gate(&pair("t", "o"), 20.0), UNASSIGNABLE);
    }

    #[test]
    fn gating_preserves_cardinality() {
        let mut scores = ScoreMap::new();
        for (i, s) in [0.5, 10.0, 3.9, 4.1, UNASSIGNABLE].iter().enumerate() {
            scores.insert(pair("t", &format!("o{i}")), *s);
        }
        let gated = gate(&FixedRadiusGater { radius: 4.0 }, &scores);
        assert_eq!(gated.len(), scores.len());
        assert_eq!(gated.values().filter(|s| is_assignable(**s)).count(), 2);
        assert_eq!(gated[&pair("t", "o2")], 3.9);
    }
}
