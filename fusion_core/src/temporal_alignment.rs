//! Temporal alignment: project time-stamped objects and tracks to a common
//! reference time through their own motion model.
//!
//! [`object_at_time`] moves only the state and timestamp. The `_with_noise`
//! variants also add the process noise accrued over the shift, so relayed
//! objects lose confidence with their latency. Works for negative Δt as
//! well (the closed forms are time-reversible).

use crate::object::{DetectedObject, Track};
use serde::{Deserialize, Serialize};

/// Process noise applied to objects shifted in time. Zero disables it.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlignmentNoise {
    /// Linear acceleration noise (1σ, m/s²)
    pub linear_accel_std: f64,
    /// Yaw acceleration noise (1σ, rad/s²)
    pub yaw_accel_std: f64,
}

impl Default for AlignmentNoise {
    fn default() -> Self {
        Self {
            linear_accel_std: 2.0,
            yaw_accel_std: 0.5,
        }
    }
}

/// Copy of `object` with its state advanced to `time`.
pub fn object_at_time(object: &DetectedObject, time: f64) -> DetectedObject {
    DetectedObject {
        state: object.state.propagate(time - object.timestamp),
        timestamp: time,
        ..object.clone()
    }
}

/// Every object advanced to `time`, input order preserved.
pub fn objects_at_time(objects: &[DetectedObject], time: f64) -> Vec<DetectedObject> {
    objects.iter().map(|o| object_at_time(o, time)).collect()
}

/// Like [`object_at_time`], with the covariance inflated by the process
/// noise of the shift.
pub fn object_at_time_with_noise(object: &DetectedObject, time: f64, noise: &AlignmentNoise) -> DetectedObject {
    let dt = time - object.timestamp;
    let mut aligned = object_at_time(object, time);
    aligned.covariance += object
        .state
        .process_noise(dt, noise.linear_accel_std, noise.yaw_accel_std);
    aligned
}

pub fn objects_at_time_with_noise(
    objects: &[DetectedObject],
    time: f64,
    noise: &AlignmentNoise,
) -> Vec<DetectedObject> {
    objects
        .iter()
        .map(|o| object_at_time_with_noise(o, time, noise))
        .collect()
}

/// Copy of `track` with its state advanced to `time`.
pub fn track_at_time(track: &Track, time: f64) -> Track {
    track.with_estimate(
        time,
        track.state.propagate(time - track.timestamp),
        track.covariance.clone(),
    )
}
