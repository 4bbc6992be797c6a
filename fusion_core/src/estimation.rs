//! State estimation: combine a track's prior with its fused observation.
//!
//! # Prediction (augmented state)
//! x_a = [x; ν_a; ν_ω],  P_a = diag(P, σ_a², σ_ω̇²)
//! Each sigma point is pushed through [`KinematicState::propagate_with_noise`];
//! CTRA tracks additionally receive an acceleration random walk σ_j²·|Δt|.
//!
//! # Update
//! The measurement is the fused observation projected onto the variant the
//! track and the observation both carry (h = identity on that subspace).
//! K = P_xz S⁻¹,  x⁺ = x⁻ + K(z − ẑ),  P⁺ = P⁻ − K S Kᵀ

use crate::{
    error::{Result, TrackingError},
    fusion::FusedTrack,
    motion::{KinematicState, MotionModelKind, IDX_ACCELERATION, IDX_YAW},
    object::Track,
    types::{DMat, DVec, TrackId},
    ukf::{
        cross_covariance, generate_sigma_points, residual, symmetrize, weighted_covariance,
        weighted_mean, UkfParams,
    },
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::debug;

const ANGLES: [usize; 1] = [IDX_YAW];

/// Strategy updating one track.
pub trait Estimator: Send + Sync {
    /// Prior of `track` at `time`, no measurement.
    fn predict(&self, track: &Track, time: f64) -> Result<Track>;

    /// Posterior of `previous` given the fused observation (at its timestamp).
    fn estimate(&self, previous: &Track, fused: &Track) -> Result<Track>;
}

#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UkfConfig {
    pub alpha: f64,
    pub beta: f64,
    pub kappa: f64,
    /// Linear acceleration process noise (m/s²)
    pub linear_accel_std: f64,
    /// Yaw acceleration process noise (rad/s²)
    pub yaw_accel_std: f64,
    /// Acceleration random walk for CTRA tracks (m/s² per √s)
    pub accel_random_walk_std: f64,
}

impl Default for UkfConfig {
    fn default() -> Self {
        Self {
            alpha: 1.0,
            beta: 2.0,
            kappa: 0.0,
            linear_accel_std: 2.0,
            yaw_accel_std: 0.5,
            accel_random_walk_std: 1.0,
        }
    }
}

impl UkfConfig {
    pub fn params(&self) -> UkfParams {
        UkfParams {
            alpha: self.alpha,
            beta: self.beta,
            kappa: self.kappa,
        }
    }
}

/// Which estimator a pipeline is built with.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum EstimatorConfig {
    Ukf(UkfConfig),
}

impl Default for EstimatorConfig {
    fn default() -> Self {
        EstimatorConfig::Ukf(UkfConfig::default())
    }
}

impl EstimatorConfig {
    pub fn build(&self) -> Box<dyn Estimator> {
        match *self {
            EstimatorConfig::Ukf(config) => Box::new(UkfEstimator::new(config)),
        }
    }
}

/// Unscented Kalman estimator over CTRV/CTRA states.
#[derive(Clone, Copy, Debug, Default)]
pub struct UkfEstimator {
    pub config: UkfConfig,
}

impl UkfEstimator {
    pub fn new(config: UkfConfig) -> Self {
        Self { config }
    }
}

impl Estimator for UkfEstimator {
    fn predict(&self, track: &Track, time: f64) -> Result<Track> {
        let dt = time - track.timestamp;
        let kind = track.kind();
        let n = kind.dim();
        let cfg = &self.config;

        let mut mean = DVec::zeros(n + 2);
        mean.rows_mut(0, n).copy_from(&track.state.to_vector());
        let mut cov = DMat::zeros(n + 2, n + 2);
        cov.view_mut((0, 0), (n, n)).copy_from(&track.covariance);
        cov[(n, n)] = cfg.linear_accel_std * cfg.linear_accel_std;
        cov[(n + 1, n + 1)] = cfg.yaw_accel_std * cfg.yaw_accel_std;

        let sp = generate_sigma_points(&mean, &cov, &cfg.params())?;
        let propagated: Vec<DVec> = sp
            .points
            .iter()
            .map(|p| {
                let state = KinematicState::from_vector(kind, &p.rows(0, n).into_owned());
                state.propagate_with_noise(dt, p[n], p[n + 1]).to_vector()
            })
            .collect();

        let x = weighted_mean(&propagated, &sp.weights_mean, &ANGLES);
        let mut p = weighted_covariance(&propagated, &x, &sp.weights_cov, &ANGLES);
        if kind == MotionModelKind::Ctra {
            p[(IDX_ACCELERATION, IDX_ACCELERATION)] +=
                cfg.accel_random_walk_std * cfg.accel_random_walk_std * dt.abs();
        }

        Ok(track.with_estimate(time, KinematicState::from_vector(kind, &x), symmetrize(&p)))
    }

    fn estimate(&self, previous: &Track, fused: &Track) -> Result<Track> {
        let prior = self.predict(previous, fused.timestamp)?;
        let kind = prior.kind();
        let shared = if fused.kind() == kind {
            kind
        } else {
            MotionModelKind::Ctrv
        };
        let m = shared.dim();

        let x = prior.state.to_vector();
        let sp = generate_sigma_points(&x, &prior.covariance, &self.config.params())?;
        let z_points: Vec<DVec> = sp.points.iter().map(|p| p.rows(0, m).into_owned()).collect();

        let z_hat = weighted_mean(&z_points, &sp.weights_mean, &ANGLES);
        let r = fused.covariance.view((0, 0), (m, m));
        let s = weighted_covariance(&z_points, &z_hat, &sp.weights_cov, &ANGLES) + r;
        let p_xz = cross_covariance(&sp.points, &x, &z_points, &z_hat, &sp.weights_cov, &ANGLES);

        let s_inv = s
            .clone()
            .lu()
            .try_inverse()
            .ok_or(TrackingError::SingularMatrix("innovation covariance"))?;
        let k = p_xz * s_inv;

        let z = fused.state.convert(shared).to_vector();
        let innovation = residual(&z, &z_hat, &ANGLES);
        let x_post = &x + &k * innovation;
        let p_post = &prior.covariance - &k * s * k.transpose();

        Ok(prior.with_estimate(
            fused.timestamp,
            KinematicState::from_vector(kind, &x_post),
            symmetrize(&p_post),
        ))
    }
}

/// Update every previous track from its fused entry, paired by identifier.
///
/// `fused` must hold exactly one entry per previous track. Entries without
/// an observation are predicted to `time`. Output follows `previous` order.
pub fn estimate(
    estimator: &dyn Estimator,
    previous: &[Track],
    fused: &[FusedTrack],
    time: f64,
    parallel: bool,
) -> Result<Vec<Track>> {
    if previous.len() != fused.len() {
        return Err(TrackingError::LengthMismatch {
            previous: previous.len(),
            fused: fused.len(),
        });
    }

    let mut index: HashMap<&TrackId, &FusedTrack> = HashMap::with_capacity(fused.len());
    for entry in fused {
        if index.insert(&entry.track_id, entry).is_some() {
            return Err(TrackingError::DuplicateTrack(entry.track_id.clone()));
        }
    }
    let mut seen = std::collections::HashSet::with_capacity(previous.len());
    let mut pairs = Vec::with_capacity(previous.len());
    for track in previous {
        if !seen.insert(&track.id) {
            return Err(TrackingError::DuplicateTrack(track.id.clone()));
        }
        let entry = index
            .get(&track.id)
            .ok_or_else(|| TrackingError::MissingTrack(track.id.clone()))?;
        pairs.push((track, entry.observation.as_ref()));
    }

    let update = |&(track, observation): &(&Track, Option<&Track>)| match observation {
        Some(obs) => estimator.estimate(track, obs),
        None => estimator.predict(track, time),
    };
    let tracks: Vec<Track> = if parallel {
        pairs.par_iter().map(update).collect::<Result<_>>()?
    } else {
        pairs.iter().map(update).collect::<Result<_>>()?
    };

    debug!(
        tracks = tracks.len(),
        updated = pairs.iter().filter(|(_, o)| o.is_some()).count(),
        "estimated tracks"
    );
    Ok(tracks)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::{CtraState, CtrvState, MotionModel};
    use approx::assert_abs_diff_eq;

    fn track(id: &str, t: f64, state: KinematicState, var: f64) -> Track {
        let d = state.dim();
        Track::new(TrackId::from(id), t, state, DMat::identity(d, d) * var).unwrap()
    }

    #[test]
    fn prediction_follows_motion_model() {
        let s = CtrvState::new(0.0, 0.0, 10.0, 0.3, 0.1);
        let t = track("t", 0.0, s.into(), 0.01);
        let predicted = UkfEstimator::default().predict(&t, 0.5).unwrap();
        let expected = s.propagate(0.5);
        let got = predicted.state.common();
        assert_abs_diff_eq!(got.position_x, expected.position_x, epsilon = 0.1);
        assert_abs_diff_eq!(got.position_y, expected.position_y, epsilon = 0.1);
        assert_eq!(predicted.timestamp, 0.5);
        assert_eq!(predicted.id, t.id);
    }

    #[test]
    fn prediction_grows_uncertainty() {
        for state in [
            KinematicState::from(CtrvState::new(0.0, 0.0, 5.0, 0.0, 0.0)),
            KinematicState::from(CtraState::new(0.0, 0.0, 5.0, 0.0, 0.0, 1.0)),
        ] {
            let t = track("t", 0.0, state, 1.0);
            let predicted = UkfEstimator::default().predict(&t, 1.0).unwrap();
            assert_eq!(predicted.kind(), t.kind());
            for i in 0..state.dim() {
                assert!(predicted.covariance[(i, i)] >= t.covariance[(i, i)] - 1e-9);
            }
            assert!(predicted.covariance[(0, 0)] > 1.0);
        }
    }

    #[test]
    fn update_moves_towards_measurement_and_shrinks_covariance() {
        let prev = track("t", 0.0, CtrvState::new(0.0, 0.0, 0.0, 0.0, 0.0).into(), 1.0);
        let obs = track("t", 0.0, CtrvState::new(2.0, 0.0, 0.0, 0.0, 0.0).into(), 1e-6);
        let post = UkfEstimator::default().estimate(&prev, &obs).unwrap();
        let (x, _) = post.state.position();
        assert!(x > 1.9 && x <= 2.0 + 1e-9, "x = {x}");
        assert!(post.covariance[(0, 0)] < 1e-3);
        assert_abs_diff_eq!(post.covariance, post.covariance.transpose(), epsilon = 1e-12);
    }

    #[test]
    fn ctra_track_keeps_variant_with_ctrv_observation() {
        let prev = track("t", 0.0, CtraState::new(0.0, 0.0, 5.0, 0.0, 0.0, 1.0).into(), 1.0);
        let obs = track("t", 0.1, CtrvState::new(0.5, 0.0, 5.1, 0.0, 0.0).into(), 0.1);
        let post = UkfEstimator::default().estimate(&prev, &obs).unwrap();
        assert_eq!(post.kind(), MotionModelKind::Ctra);
        assert_eq!(post.covariance.nrows(), 6);
        assert_eq!(post.timestamp, 0.1);
    }

    #[test]
    fn batch_rejects_mismatched_lengths() {
        let prev = vec![
            track("a", 0.0, CtrvState::default().into(), 1.0),
            track("b", 0.0, CtrvState::default().into(), 1.0),
        ];
        let fused = vec![FusedTrack {
            track_id: TrackId::from("a"),
            observation: None,
        }];
        let err = estimate(&UkfEstimator::default(), &prev, &fused, 1.0, false).unwrap_err();
        assert_eq!(err, TrackingError::LengthMismatch { previous: 2, fused: 1 });
    }

    #[test]
    fn batch_pairs_by_identifier_not_position() {
        let prev = vec![
            track("a", 0.0, CtrvState::new(0.0, 0.0, 0.0, 0.0, 0.0).into(), 1.0),
            track("b", 0.0, CtrvState::new(100.0, 0.0, 0.0, 0.0, 0.0).into(), 1.0),
        ];
        let fused = vec![
            FusedTrack {
                track_id: TrackId::from("b"),
                observation: Some(track("b", 0.0, CtrvState::new(101.0, 0.0, 0.0, 0.0, 0.0).into(), 1e-4)),
            },
            FusedTrack {
                track_id: TrackId::from("a"),
                observation: None,
            },
        ];
        for parallel in [false, true] {
            let out = estimate(&UkfEstimator::default(), &prev, &fused, 0.2, parallel).unwrap();
            assert_eq!(out[0].id, TrackId::from("a"));
            assert_eq!(out[0].timestamp, 0.2);
            assert_abs_diff_eq!(out[0].state.position().0, 0.0, epsilon = 1e-9);
            assert_eq!(out[1].id, TrackId::from("b"));
            assert!(out[1].state.position().0 > 100.9);
        }
    }

    #[test]
    fn batch_reports_missing_and_duplicate_tracks() {
        let prev = vec![
            track("a", 0.0, CtrvState::default().into(), 1.0),
            track("b", 0.0, CtrvState::default().into(), 1.0),
        ];
        let entry = |id: &str| FusedTrack {
            track_id: TrackId::from(id),
            observation: None,
        };
        let est = UkfEstimator::default();

        let err = estimate(&est, &prev, &[entry("a"), entry("c")], 0.0, false).unwrap_err();
        assert_eq!(err, TrackingError::MissingTrack(TrackId::from("b")));

        let err = estimate(&est, &prev, &[entry("a"), entry("a")], 0.0, false).unwrap_err();
        assert_eq!(err, TrackingError::DuplicateTrack(TrackId::from("a")));
    }

    #[test]
    fn degenerate_covariance_is_reported() {
        let mut t = track("t", 0.0, CtrvState::default().into(), 1.0);
        t.covariance[(2, 2)] = -1.0;
        let err = UkfEstimator::default().predict(&t, 0.1).unwrap_err();
        assert!(matches!(err, TrackingError::NotPositiveDefinite(_)));
    }
}
