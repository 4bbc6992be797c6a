//! Fundamental types used across the entire workspace.

use crate::object::DetectedObject;
use nalgebra::{DMatrix, DVector};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Scalar type: f64 throughout for numerical precision in the filter.
// ---------------------------------------------------------------------------

/// Dynamic-size vector (state vectors, innovations)
pub type DVec = DVector<f64>;

/// Dynamic-size matrix (covariances, gains)
pub type DMat = DMatrix<f64>;

// ---------------------------------------------------------------------------
// Identifier types: newtype wrappers so IDs are never confused at compile time
// ---------------------------------------------------------------------------

/// Stable identifier of a fused track (UUID text).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TrackId(pub String);

/// Identifier of one detected object as reported by an agent (UUID text).
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObjectId(pub String);

/// Sensing agent: a connected vehicle or an infrastructure unit.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize,
)]
pub struct AgentId(pub u32);

impl TrackId {
    /// Deterministic identifier for a track born from `object`.
    /// Distinct from the object's own identifier.
    pub fn derived_from(object: &ObjectId) -> Self {
        Self(Uuid::new_v5(&Uuid::NAMESPACE_OID, object.0.as_bytes()).to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl ObjectId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for TrackId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl From<&str> for ObjectId {
    fn from(s: &str) -> Self {
        Self(s.to_owned())
    }
}

impl fmt::Display for TrackId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.0)
    }
}

// ---------------------------------------------------------------------------
// Stage outputs
// ---------------------------------------------------------------------------

/// Pairwise affinity keyed by (track, object). Ordered so iteration depends
/// only on identifiers, never on hashing or scheduling.
pub type ScoreMap = BTreeMap<(TrackId, ObjectId), f64>;

/// Objects claimed by each track, in claim order.
pub type AssociationMap = BTreeMap<TrackId, Vec<ObjectId>>;

// ---------------------------------------------------------------------------
// ObjectBatch: a timestamped batch of objects relayed by one agent
// ---------------------------------------------------------------------------

/// A batch of detected objects from one agent.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ObjectBatch {
    pub agent_id: AgentId,
    /// Time the agent sensed the scene (agent clock, seconds)
    pub sensor_time: f64,
    /// Time the batch reached the fusion node (includes relay latency)
    pub arrival_time: f64,
    pub objects: Vec<DetectedObject>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn derived_track_id_is_stable_and_distinct() {
        let object = ObjectId::from("6a1f1c4e-3b55-4d0c-9a47-0d2a8e9f6b11");
        let a = TrackId::derived_from(&object);
        let b = TrackId::derived_from(&object);
        assert_eq!(a, b);
        assert_ne!(a.as_str(), object.as_str());
        assert_eq!(a.as_str().len(), 36);
    }

    #[test]
    fn score_map_iterates_in_identifier_order() {
        let mut scores = ScoreMap::new();
        scores.insert((TrackId::from("t2"), ObjectId::from("o1")), 1.0);
        scores.insert((TrackId::from("t1"), ObjectId::from("o2")), 2.0);
        scores.insert((TrackId::from("t1"), ObjectId::from("o1")), 3.0);
        let keys: Vec<_> = scores
            .keys()
            .map(|(t, o)| format!("{t}/{o}"))
            .collect();
        assert_eq!(keys, vec!["t1/o1", "t1/o2", "t2/o1"]);
    }
}
