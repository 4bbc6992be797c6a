//! Detected objects and tracks.

use crate::{
    error::{Result, TrackingError},
    motion::{KinematicState, MotionModelKind},
    types::{AgentId, DMat, ObjectId, TrackId},
};
use serde::{Deserialize, Serialize};

/// One agent's observation of one entity at one instant. Immutable once
/// produced; time-shifting yields a new value.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectedObject {
    pub id: ObjectId,
    /// Agent that reported the object
    pub source: AgentId,
    /// Observation time (s)
    pub timestamp: f64,
    pub state: KinematicState,
    /// State covariance, `dim × dim` for the state's model
    pub covariance: DMat,
}

impl DetectedObject {
    pub fn new(
        id: ObjectId,
        source: AgentId,
        timestamp: f64,
        state: KinematicState,
        covariance: DMat,
    ) -> Result<Self> {
        check_covariance(state.kind(), &covariance)?;
        Ok(Self {
            id,
            source,
            timestamp,
            state,
            covariance,
        })
    }

    pub fn kind(&self) -> MotionModelKind {
        self.state.kind()
    }
}

/// Lifecycle status of a track.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum TrackStatus {
    /// Not yet confirmed: may be spurious
    #[default]
    Tentative,
    /// Confirmed after enough associated cycles
    Confirmed,
    /// Marked for removal
    Deleted,
}

/// Fused belief about one real-world entity.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Track {
    /// Stable identifier, distinct from every object identifier
    pub id: TrackId,
    /// Time of the current estimate (s)
    pub timestamp: f64,
    pub state: KinematicState,
    pub covariance: DMat,
    pub status: TrackStatus,
    /// Associated cycles counted towards confirmation
    pub hits: u8,
    /// Consecutive cycles without association
    pub misses: u8,
    /// Total number of associated cycles
    pub total_hits: u32,
    /// Time the track was born (s)
    pub born_at: f64,
}

impl Track {
    /// Create a new tentative track.
    pub fn new(id: TrackId, timestamp: f64, state: KinematicState, covariance: DMat) -> Result<Self> {
        check_covariance(state.kind(), &covariance)?;
        Ok(Self {
            id,
            timestamp,
            state,
            covariance,
            status: TrackStatus::Tentative,
            hits: 1,
            misses: 0,
            total_hits: 1,
            born_at: timestamp,
        })
    }

    pub fn kind(&self) -> MotionModelKind {
        self.state.kind()
    }

    /// Same track with a new estimate; lifecycle counters are kept.
    pub fn with_estimate(&self, timestamp: f64, state: KinematicState, covariance: DMat) -> Self {
        Self {
            timestamp,
            state,
            covariance,
            ..self.clone()
        }
    }

    pub fn is_live(&self) -> bool {
        self.status != TrackStatus::Deleted
    }
}

/// Reject covariances whose shape does not match the state model.
pub fn check_covariance(kind: MotionModelKind, covariance: &DMat) -> Result<()> {
    let dim = kind.dim();
    if covariance.nrows() != dim || covariance.ncols() != dim {
        return Err(TrackingError::CovarianceShape {
            kind: kind.name(),
            dim,
            rows: covariance.nrows(),
            cols: covariance.ncols(),
        });
    }
    Ok(())
}
