//! Pairwise track × object affinity.
//!
//! Every (track, object) pair receives exactly one score; rejecting pairs is
//! the gater's job. Inputs are expected to be temporally aligned already.
//!
//! # Metrics
//! - [`EuclideanScorer`]: planar distance ‖p_obj − p_trk‖ (m)
//! - [`MahalanobisScorer`]: d² = νᵀ S⁻¹ ν over [px, py, v, yaw, ω] with
//!   S = P_trk + P_obj (yaw residual wrapped)

use crate::{
    gating::UNASSIGNABLE,
    motion::{MotionModel, MotionModelKind, IDX_YAW},
    object::{DetectedObject, Track},
    types::{DMat, ScoreMap},
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Strategy computing the cost of explaining `object` with `track`.
/// Lower is better.
pub trait Scorer: Send + Sync {
    fn score(&self, track: &Track, object: &DetectedObject) -> f64;
}

/// Planar Euclidean distance between positions.
#[derive(Clone, Copy, Debug, Default)]
pub struct EuclideanScorer;

impl Scorer for EuclideanScorer {
    fn score(&self, track: &Track, object: &DetectedObject) -> f64 {
        let (tx, ty) = track.state.position();
        let (ox, oy) = object.state.position();
        (ox - tx).hypot(oy - ty)
    }
}

/// Squared Mahalanobis distance over the state components shared by every
/// motion model.
#[derive(Clone, Copy, Debug, Default)]
pub struct MahalanobisScorer;

impl Scorer for MahalanobisScorer {
    fn score(&self, track: &Track, object: &DetectedObject) -> f64 {
        let t = track.state.common();
        let o = object.state.common();
        let dim = MotionModelKind::Ctrv.dim();

        let mut innovation = o.to_vector() - t.to_vector();
        innovation[IDX_YAW] = (o.yaw - t.yaw).radians();

        let s: DMat = track.covariance.view((0, 0), (dim, dim)).into_owned()
            + object.covariance.view((0, 0), (dim, dim));

        // LU for numerical safety
        match s.lu().try_inverse() {
            Some(s_inv) => innovation.dot(&(&s_inv * &innovation)),
            None => UNASSIGNABLE, // degenerate case: reject
        }
    }
}

/// Which scorer a pipeline is built with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ScorerConfig {
    #[default]
    Euclidean,
    Mahalanobis,
}

impl ScorerConfig {
    pub fn build(&self) -> Box<dyn Scorer> {
        match self {
            ScorerConfig::Euclidean => Box::new(EuclideanScorer),
            ScorerConfig::Mahalanobis => Box::new(MahalanobisScorer),
        }
    }
}

/// Score every track against every object: |tracks| × |objects| entries.
/// With `parallel` the rows are computed on the rayon pool; the resulting
/// map is identical either way.
pub fn score(
    scorer: &dyn Scorer,
    tracks: &[Track],
    objects: &[DetectedObject],
    parallel: bool,
) -> ScoreMap {
    let row = |track: &Track| -> Vec<_> {
        objects
            .iter()
            .map(|object| ((track.id.clone(), object.id.clone()), scorer.score(track, object)))
            .collect()
    };

    let rows: Vec<Vec<_>> = if parallel {
        tracks.par_iter().map(row).collect()
    } else {
        tracks.iter().map(row).collect()
    };

    let scores: ScoreMap = rows.into_iter().flatten().collect();
    debug!(
        tracks = tracks.len(),
        objects = objects.len(),
        pairs = scores.len(),
        "scored track/object pairs"
    );
    scores
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::{CtraState, CtrvState, KinematicState};
    use crate::types::{AgentId, ObjectId, TrackId};
    use approx::assert_abs_diff_eq;

    fn track(id: &str, state: KinematicState) -> Track {
        let d = state.dim();
        Track::new(TrackId::from(id), 0.0, state, DMat::identity(d, d)).unwrap()
    }

    fn object(id: &str, state: KinematicState) -> DetectedObject {
        let d = state.dim();
        DetectedObject::new(ObjectId::from(id), AgentId(1), 0.0, state, DMat::identity(d, d))
            .unwrap()
    }

    #[test]
    fn euclidean_distance_between_positions() {
        let t = track("t", CtrvState::new(0.0, 0.0, 5.0, 0.0, 0.0).into());
        let o = object("o", CtraState::new(3.0, 4.0, 1.0, 1.0, 0.0, 2.0).into());
        assert_abs_diff_eq!(EuclideanScorer.score(&t, &o), 5.0, epsilon = 1e-12);
    }

    #[test]
    fn mahalanobis_wraps_yaw_residual() {
        let pi = std::f64::consts::PI;
        let t = track("t", CtrvState::new(0.0, 0.0, 0.0, pi - 0.05, 0.0).into());
        let o = object("o", CtrvState::new(0.0, 0.0, 0.0, -pi + 0.05, 0.0).into());
        // residual 0.1 rad, S = 2·I
        assert_abs_diff_eq!(MahalanobisScorer.score(&t, &o), 0.01 / 2.0, epsilon = 1e-12);
    }

    #[test]
    fn mahalanobis_of_singular_sum_is_unassignable() {
        let state: KinematicState = CtrvState::default().into();
        let mut t = track("t", state);
        let mut o = object("o", state);
        t.covariance = DMat::zeros(5, 5);
        o.covariance = DMat::zeros(5, 5);
        assert_eq!(MahalanobisScorer.score(&t, &o), UNASSIGNABLE);
    }

    #[test]
    fn every_pair_is_scored() {
        let tracks: Vec<_> = (0..3)
            .map(|i| track(&format!("t{i}"), CtrvState::new(i as f64, 0.0, 0.0, 0.0, 0.0).into()))
            .collect();
        let objects: Vec<_> = (0..4)
            .map(|i| object(&format!("o{i}"), CtrvState::new(0.0, i as f64, 0.0, 0.0, 0.0).into()))
            .collect();

        let sequential = score(&EuclideanScorer, &tracks, &objects, false);
        let parallel = score(&EuclideanScorer, &tracks, &objects, true);
        assert_eq!(sequential.len(), 12);
        assert_eq!(sequential, parallel);
        assert_abs_diff_eq!(
            sequential[&(TrackId::from("t2"), ObjectId::from("o3"))],
            13.0f64.sqrt(),
            epsilon = 1e-12
        );
    }
}
