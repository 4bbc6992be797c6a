//! Fusion of the objects associated to one track into a single observation.
//!
//! # Information form
//! Y_i = P_i⁻¹,  y_i = Y_i x_i
//! P_f = (Σ Y_i)⁻¹,  x_f = P_f Σ y_i
//!
//! All objects are first aligned to the latest timestamp among them. When any
//! object is CTRA the fusion happens in CTRA space and CTRV objects carry no
//! information on acceleration; otherwise it happens in CTRV space. Yaw is
//! accumulated relative to the first object so the ±π seam never splits the
//! weighted mean.

use crate::{
    error::{Result, TrackingError},
    motion::{KinematicState, MotionModelKind, IDX_YAW},
    object::{DetectedObject, Track},
    temporal_alignment::objects_at_time,
    types::{AssociationMap, DMat, DVec, ObjectId, TrackId},
    units::Angle,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, trace};

/// Strategy combining zero or more objects into one observation of a track.
/// `Ok(None)` means no new observation this cycle.
pub trait Fuser: Send + Sync {
    fn fuse(&self, track_id: &TrackId, objects: &[DetectedObject]) -> Result<Option<Track>>;
}

/// Fused observation attributed to one track.
#[derive(Clone, Debug, PartialEq)]
pub struct FusedTrack {
    pub track_id: TrackId,
    pub observation: Option<Track>,
}

/// Which fuser a pipeline is built with.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum FuserConfig {
    #[default]
    Covariance,
}

impl FuserConfig {
    pub fn build(&self) -> Box<dyn Fuser> {
        match self {
            FuserConfig::Covariance => Box::new(CovarianceFuser),
        }
    }
}

/// Covariance-weighted (information form) fusion.
#[derive(Clone, Copy, Debug, Default)]
pub struct CovarianceFuser;

impl Fuser for CovarianceFuser {
    fn fuse(&self, track_id: &TrackId, objects: &[DetectedObject]) -> Result<Option<Track>> {
        match objects {
            [] => Ok(None),
            [single] => Track::new(
                track_id.clone(),
                single.timestamp,
                single.state,
                single.covariance.clone(),
            )
            .map(Some),
            _ => self.fuse_many(track_id, objects).map(Some),
        }
    }
}

impl CovarianceFuser {
    fn fuse_many(&self, track_id: &TrackId, objects: &[DetectedObject]) -> Result<Track> {
        let time = objects
            .iter()
            .map(|o| o.timestamp)
            .fold(f64::NEG_INFINITY, f64::max);
        let aligned = objects_at_time(objects, time);

        let kind = if aligned.iter().any(|o| o.kind() == MotionModelKind::Ctra) {
            MotionModelKind::Ctra
        } else {
            MotionModelKind::Ctrv
        };
        let dim = kind.dim();
        let reference_yaw = aligned[0].state.yaw();

        let mut info = DMat::zeros(dim, dim);
        let mut info_state = DVec::zeros(dim);

        for object in &aligned {
            let (y, x) = information_contribution(object, reference_yaw, dim)?;
            info_state += &y * &x;
            info += y;
        }

        let covariance = info
            .try_inverse()
            .ok_or(TrackingError::SingularMatrix("fused information matrix"))?;
        let covariance = (&covariance + covariance.transpose()) * 0.5;

        let mut mean = &covariance * info_state;
        mean[IDX_YAW] += reference_yaw.radians();
        let state = KinematicState::from_vector(kind, &mean);

        trace!(track = %track_id, objects = objects.len(), model = kind.name(), "fused objects");
        Track::new(track_id.clone(), time, state, covariance)
    }
}

/// Information matrix and yaw-relative state of `object`, embedded in a
/// `dim`-dimensional space. Components beyond the object's own model get
/// zero information.
fn information_contribution(
    object: &DetectedObject,
    reference_yaw: Angle,
    dim: usize,
) -> Result<(DMat, DVec)> {
    let own = object.state.dim();
    let own_info = object
        .covariance
        .clone()
        .try_inverse()
        .ok_or(TrackingError::SingularMatrix("object covariance"))?;

    let mut info = DMat::zeros(dim, dim);
    info.view_mut((0, 0), (own, own)).copy_from(&own_info);

    let mut x = DVec::zeros(dim);
    x.rows_mut(0, own).copy_from(&object.state.to_vector());
    x[IDX_YAW] = (object.state.yaw() - reference_yaw).radians();

    Ok((info, x))
}

/// Fuse the objects of every association entry, in track-id order.
pub fn fuse(
    fuser: &dyn Fuser,
    objects: &[DetectedObject],
    associations: &AssociationMap,
) -> Result<Vec<FusedTrack>> {
    let index: HashMap<&ObjectId, &DetectedObject> = objects.iter().map(|o| (&o.id, o)).collect();

    let fused = associations
        .iter()
        .map(|(track_id, object_ids)| {
            let claimed = object_ids
                .iter()
                .map(|id| {
                    index.get(id).map(|o| (*o).clone()).ok_or_else(|| {
                        TrackingError::UnknownObject {
                            track: track_id.clone(),
                            object: id.clone(),
                        }
                    })
                })
                .collect::<Result<Vec<_>>>()?;
            Ok(FusedTrack {
                track_id: track_id.clone(),
                observation: fuser.fuse(track_id, &claimed)?,
            })
        })
        .collect::<Result<Vec<_>>>()?;

    debug!(
        tracks = fused.len(),
        observed = fused.iter().filter(|f| f.observation.is_some()).count(),
        "fused associated objects"
    );
    Ok(fused)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::{CtraState, CtrvState};
    use crate::types::AgentId;
    use approx::assert_abs_diff_eq;
    use std::f64::consts::PI;

    fn object(id: &str, t: f64, state: KinematicState, var: f64) -> DetectedObject {
        let d = state.dim();
        DetectedObject::new(ObjectId::from(id), AgentId(1), t, state, DMat::identity(d, d) * var)
            .unwrap()
    }

    #[test]
    fn no_objects_no_observation() {
        let fused = CovarianceFuser.fuse(&TrackId::from("t"), &[]).unwrap();
        assert!(fused.is_none());
    }

    #[test]
    fn single_object_passes_through() {
        let o = object("o", 1.5, CtrvState::new(1.0, 2.0, 3.0, 0.4, 0.1).into(), 2.0);
        let fused = CovarianceFuser
            .fuse(&TrackId::from("t"), std::slice::from_ref(&o))
            .unwrap()
            .unwrap();
        assert_eq!(fused.id, TrackId::from("t"));
        assert_eq!(fused.timestamp, 1.5);
        assert_eq!(fused.state, o.state);
        assert_eq!(fused.covariance, o.covariance);
    }

    #[test]
    fn fusion_weights_by_uncertainty() {
        // Variance 1 vs 3 → weights 3/4 and 1/4
        let a = object("a", 0.0, CtrvState::new(0.0, 0.0, 10.0, 0.0, 0.0).into(), 1.0);
        let b = object("b", 0.0, CtrvState::new(4.0, 8.0, 10.0, 0.0, 0.0).into(), 3.0);
        let fused = CovarianceFuser.fuse(&TrackId::from("t"), &[a, b]).unwrap().unwrap();
        let (x, y) = fused.state.position();
        assert_abs_diff_eq!(x, 1.0, epsilon = 1e-9);
        assert_abs_diff_eq!(y, 2.0, epsilon = 1e-9);
        assert_abs_diff_eq!(fused.covariance[(0, 0)], 0.75, epsilon = 1e-9);
    }

    #[test]
    fn yaw_across_the_seam() {
        let a = object("a", 0.0, CtrvState::new(0.0, 0.0, 1.0, PI - 0.1, 0.0).into(), 1.0);
        let b = object("b", 0.0, CtrvState::new(0.0, 0.0, 1.0, -PI + 0.1, 0.0).into(), 1.0);
        let fused = CovarianceFuser.fuse(&TrackId::from("t"), &[a, b]).unwrap().unwrap();
        assert_abs_diff_eq!(fused.state.yaw(), Angle::new(PI), epsilon = 1e-9);
    }

    #[test]
    fn mixed_models_fuse_in_ctra_space() {
        let a = object("a", 0.0, CtrvState::new(0.0, 0.0, 10.0, 0.0, 0.0).into(), 1.0);
        let b = object("b", 0.0, CtraState::new(2.0, 0.0, 10.0, 0.0, 0.0, 1.5).into(), 1.0);
        let fused = CovarianceFuser.fuse(&TrackId::from("t"), &[a, b]).unwrap().unwrap();
        assert_eq!(fused.kind(), MotionModelKind::Ctra);
        assert_eq!(fused.covariance.nrows(), 6);
        match fused.state {
            KinematicState::Ctra(s) => {
                assert_abs_diff_eq!(s.position_x, 1.0, epsilon = 1e-9);
                // Only the CTRA object informs acceleration
                assert_abs_diff_eq!(s.acceleration, 1.5, epsilon = 1e-9);
            }
            KinematicState::Ctrv(_) => panic!("expected CTRA"),
        }
        assert_abs_diff_eq!(fused.covariance[(5, 5)], 1.0, epsilon = 1e-9);
    }

    #[test]
    fn objects_aligned_to_latest_timestamp() {
        let a = object("a", 0.0, CtrvState::new(0.0, 0.0, 2.0, 0.0, 0.0).into(), 1.0);
        let b = object("b", 0.5, CtrvState::new(1.0, 0.0, 2.0, 0.0, 0.0).into(), 1.0);
        let fused = CovarianceFuser.fuse(&TrackId::from("t"), &[a, b]).unwrap().unwrap();
        assert_eq!(fused.timestamp, 0.5);
        assert_abs_diff_eq!(fused.state.position().0, 1.0, epsilon = 1e-9);
    }

    #[test]
    fn singular_object_covariance_is_an_error() {
        let state: KinematicState = CtrvState::default().into();
        let a = object("a", 0.0, state, 1.0);
        let mut b = object("b", 0.0, state, 1.0);
        b.covariance = DMat::zeros(5, 5);
        let err = CovarianceFuser.fuse(&TrackId::from("t"), &[a, b]).unwrap_err();
        assert!(matches!(err, TrackingError::SingularMatrix(_)));
    }

    #[test]
    fn batch_reports_unknown_object() {
        let objects = vec![object("o1", 0.0, CtrvState::default().into(), 1.0)];
        let mut associations = AssociationMap::new();
        associations.insert(TrackId::from("t1"), vec![ObjectId::from("o1")]);
        associations.insert(TrackId::from("t2"), vec![]);

        let fused = fuse(&CovarianceFuser, &objects, &associations).unwrap();
        assert_eq!(fused.len(), 2);
        assert!(fused[0].observation.is_some());
        assert!(fused[1].observation.is_none());

        associations.insert(TrackId::from("t3"), vec![ObjectId::from("ghost")]);
        let err = fuse(&CovarianceFuser, &objects, &associations).unwrap_err();
        assert_eq!(
            err,
            TrackingError::UnknownObject {
                track: TrackId::from("t3"),
                object: ObjectId::from("ghost"),
            }
        );
    }
}
