//! Track lifecycle management: birth, M-hit confirmation, deletion.
//!
//! # Track Management Policy
//! - **Birth**: each unassociated object farther than `min_birth_separation`
//!   from every live track (and from every birth earlier in the same cycle)
//!   spawns a tentative track. Its identifier is a UUIDv5 of the object id.
//! - **Confirmation**: a tentative track is confirmed once it has
//!   `confirm_hits` associated cycles. Birth counts as the first one.
//! - **Deletion**: a track is deleted when its consecutive misses exceed the
//!   limit for its status. Tentative tracks are pruned fast.

use crate::{
    motion::{IDX_ACCELERATION, IDX_VELOCITY, IDX_YAW_RATE},
    object::{DetectedObject, Track, TrackStatus},
    pipeline::PipelineOutput,
    types::{ObjectId, TrackId},
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Configuration for track management policy.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackManagerConfig {
    /// Associated cycles required for confirmation
    pub confirm_hits: u8,
    /// Consecutive misses tolerated by a tentative track
    pub miss_limit_tentative: u8,
    /// Consecutive misses tolerated by a confirmed track
    pub miss_limit_confirmed: u8,
    /// No birth closer than this to a live track (m)
    pub min_birth_separation: f64,
    /// Floor on the initial speed uncertainty (1σ, m/s)
    pub init_speed_std: f64,
    /// Floor on the initial yaw-rate uncertainty (1σ, rad/s)
    pub init_yaw_rate_std: f64,
    /// Floor on the initial acceleration uncertainty of CTRA births (1σ, m/s²)
    pub init_accel_std: f64,
}

impl Default for TrackManagerConfig {
    fn default() -> Self {
        Self {
            confirm_hits: 3,
            miss_limit_tentative: 1,
            miss_limit_confirmed: 5,
            min_birth_separation: 2.0,
            init_speed_std: 3.0,
            init_yaw_rate_std: 0.3,
            init_accel_std: 2.0,
        }
    }
}

/// Lifecycle events of one cycle.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LifecycleCounts {
    pub births: usize,
    pub confirmations: usize,
    pub deletions: usize,
}

/// Applies the lifecycle policy to the pipeline's output.
#[derive(Clone, Debug, Default)]
pub struct TrackManager {
    pub config: TrackManagerConfig,
}

impl TrackManager {
    pub fn new(config: TrackManagerConfig) -> Self {
        Self { config }
    }

    /// Create a new tentative track from an object aligned to `time`.
    pub fn birth_track(&self, object: &DetectedObject, time: f64) -> Track {
        let mut covariance = object.covariance.clone();
        let floors = [
            (IDX_VELOCITY, self.config.init_speed_std),
            (IDX_YAW_RATE, self.config.init_yaw_rate_std),
            (IDX_ACCELERATION, self.config.init_accel_std),
        ];
        for (idx, std) in floors {
            if idx < covariance.nrows() {
                covariance[(idx, idx)] = covariance[(idx, idx)].max(std * std);
            }
        }
        Track {
            id: TrackId::derived_from(&object.id),
            timestamp: time,
            state: object.state,
            covariance,
            status: TrackStatus::Tentative,
            hits: 1,
            misses: 0,
            total_hits: 1,
            born_at: time,
        }
    }

    /// Call after a track received an update (hit). Returns true on confirmation.
    pub fn register_hit(&self, track: &mut Track) -> bool {
        track.misses = 0;
        track.hits = track.hits.saturating_add(1);
        track.total_hits += 1;
        if track.status == TrackStatus::Tentative && track.hits >= self.config.confirm_hits {
            track.status = TrackStatus::Confirmed;
            return true;
        }
        false
    }

    /// Call after a track received no update (miss). Returns true on deletion.
    pub fn register_miss(&self, track: &mut Track) -> bool {
        track.misses = track.misses.saturating_add(1);
        let limit = match track.status {
            TrackStatus::Tentative => self.config.miss_limit_tentative,
            TrackStatus::Confirmed => self.config.miss_limit_confirmed,
            TrackStatus::Deleted => return false,
        };
        if track.misses > limit {
            track.status = TrackStatus::Deleted;
            return true;
        }
        false
    }

    /// Remove all deleted tracks. Returns count of removed tracks.
    pub fn prune_deleted(tracks: &mut Vec<Track>) -> usize {
        let before = tracks.len();
        tracks.retain(Track::is_live);
        before - tracks.len()
    }

    /// Apply hits and misses from `output` to `tracks` (the pipeline's
    /// updated list), birth tracks from unassociated `objects`, and prune.
    pub fn update(
        &self,
        tracks: &mut Vec<Track>,
        output: &PipelineOutput,
        objects: &[DetectedObject],
        time: f64,
    ) -> LifecycleCounts {
        let mut counts = LifecycleCounts::default();

        for track in tracks.iter_mut() {
            let hit = output
                .associations
                .get(&track.id)
                .is_some_and(|objects| !objects.is_empty());
            if hit {
                counts.confirmations += usize::from(self.register_hit(track));
            } else {
                counts.deletions += usize::from(self.register_miss(track));
            }
        }

        let index: HashMap<&ObjectId, &DetectedObject> = objects.iter().map(|o| (&o.id, o)).collect();
        let min_sep = self.config.min_birth_separation;
        let mut occupied: Vec<(f64, f64)> = tracks
            .iter()
            .filter(|t| t.is_live())
            .map(|t| t.state.position())
            .collect();

        for id in &output.unassociated_objects {
            let Some(object) = index.get(id) else {
                continue;
            };
            let (x, y) = object.state.position();
            if occupied.iter().any(|&(ox, oy)| (x - ox).hypot(y - oy) < min_sep) {
                warn!(object = %id, x, y, "birth suppressed near existing track");
                continue;
            }
            occupied.push((x, y));
            tracks.push(self.birth_track(object, time));
            counts.births += 1;
        }

        Self::prune_deleted(tracks);
        debug!(
            tracks = tracks.len(),
            births = counts.births,
            confirmations = counts.confirmations,
            deletions = counts.deletions,
            "track management"
        );
        counts
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::motion::{CtraState, CtrvState, KinematicState};
    use crate::pipeline::{Pipeline, PipelineConfig};
    use crate::types::{AgentId, DMat};

    fn track(id: &str, status: TrackStatus) -> Track {
        Track {
            status,
            ..Track::new(TrackId::from(id), 0.0, CtrvState::default().into(), DMat::identity(5, 5))
                .unwrap()
        }
    }

    fn object(id: &str, x: f64, y: f64) -> DetectedObject {
        DetectedObject::new(
            ObjectId::from(id),
            AgentId(1),
            0.0,
            CtrvState::new(x, y, 5.0, 0.0, 0.0).into(),
            DMat::identity(5, 5) * 0.1,
        )
        .unwrap()
    }

    #[test]
    fn tentative_confirms_after_m_hits() {
        let mgr = TrackManager::new(TrackManagerConfig {
            confirm_hits: 3,
            ..Default::default()
        });
        // Birth counts as first hit
        let mut t = track("t", TrackStatus::Tentative);
        assert_eq!(t.hits, 1);
        assert!(!mgr.register_hit(&mut t));
        assert_eq!(t.status, TrackStatus::Tentative, "Not confirmed yet at hit 2");
        assert!(mgr.register_hit(&mut t));
        assert_eq!(t.status, TrackStatus::Confirmed, "Should be confirmed at hit 3");
        assert_eq!(t.total_hits, 3);
    }

    #[test]
    fn confirmed_deleted_after_misses() {
        let mgr = TrackManager::new(TrackManagerConfig {
            miss_limit_confirmed: 3,
            ..Default::default()
        });
        let mut t = track("t", TrackStatus::Confirmed);
        for _ in 0..3 {
            assert!(!mgr.register_miss(&mut t));
        }
        assert_eq!(t.status, TrackStatus::Confirmed, "Still alive at 3 misses");
        assert!(mgr.register_miss(&mut t));
        assert_eq!(t.status, TrackStatus::Deleted);
    }

    #[test]
    fn hit_resets_misses() {
        let mgr = TrackManager::default();
        let mut t = track("t", TrackStatus::Confirmed);
        mgr.register_miss(&mut t);
        mgr.register_miss(&mut t);
        mgr.register_hit(&mut t);
        assert_eq!(t.misses, 0);
    }

    #[test]
    fn prune_deleted_removes_correctly() {
        let mut tracks = vec![
            track("a", TrackStatus::Confirmed),
            track("b", TrackStatus::Deleted),
            track("c", TrackStatus::Tentative),
        ];
        assert_eq!(TrackManager::prune_deleted(&mut tracks), 1);
        assert!(tracks.iter().all(Track::is_live));
    }

    #[test]
    fn birth_uses_derived_id_and_floors_uncertainty() {
        let mgr = TrackManager::default();
        let o = DetectedObject::new(
            ObjectId::from("o"),
            AgentId(3),
            1.0,
            CtraState::new(1.0, 2.0, 3.0, 0.0, 0.0, 0.5).into(),
            DMat::identity(6, 6) * 0.01,
        )
        .unwrap();
        let t = mgr.birth_track(&o, 1.0);
        assert_eq!(t.id, TrackId::derived_from(&o.id));
        assert_ne!(t.id.as_str(), o.id.as_str());
        assert_eq!(t.state, o.state);
        assert_eq!(t.covariance[(0, 0)], 0.01);
        assert_eq!(t.covariance[(IDX_VELOCITY, IDX_VELOCITY)], 9.0);
        assert_eq!(t.covariance[(IDX_ACCELERATION, IDX_ACCELERATION)], 4.0);
        assert!(matches!(t.state, KinematicState::Ctra(_)));
    }

    #[test]
    fn update_runs_the_whole_policy() {
        let mgr = TrackManager::new(TrackManagerConfig {
            confirm_hits: 2,
            miss_limit_tentative: 0,
            ..Default::default()
        });
        let previous = vec![track("seen", TrackStatus::Tentative), {
            let mut far = track("lost", TrackStatus::Tentative);
            far.state = CtrvState::new(500.0, 500.0, 0.0, 0.0, 0.0).into();
            far
        }];
        let objects = vec![
            object("hit", 0.1, 0.0),
            // Unassociated but too close to the surviving track
            object("echo", 1.0, 0.5),
            object("new1", 50.0, 0.0),
            // Too close to new1
            object("new2", 50.5, 0.0),
        ];

        let output = Pipeline::new(&PipelineConfig {
            gater: crate::gating::GaterConfig::FixedRadius { radius: 0.5 },
            ..Default::default()
        })
        .run(&previous, &objects, 0.0)
        .unwrap();
        let mut tracks = output.tracks.clone();
        let counts = mgr.update(&mut tracks, &output, &output.aligned_objects, 0.0);

        assert_eq!(
            counts,
            LifecycleCounts {
                births: 1,
                confirmations: 1,
                deletions: 1
            }
        );
        let ids: Vec<&str> = tracks.iter().map(|t| t.id.as_str()).collect();
        assert_eq!(ids.len(), 2);
        assert_eq!(tracks[0].id, TrackId::from("seen"));
        assert_eq!(tracks[0].status, TrackStatus::Confirmed);
        assert_eq!(tracks[1].id, TrackId::derived_from(&ObjectId::from("new1")));
    }
}
