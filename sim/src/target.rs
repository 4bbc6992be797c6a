//! Ground-truth target trajectories.
//!
//! Each target carries a CTRA true state [px, py, v, yaw, ω, a] and a list of
//! timed control segments. A segment sets the commanded yaw rate and
//! acceleration from its start time on; between segment starts the state
//! propagates in closed form.

use fusion_core::metrics::GroundTruth;
use fusion_core::motion::{CtraState, MotionModel};
use serde::{Deserialize, Serialize};

/// Commanded motion from `start` (s) onwards.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct ControlSegment {
    pub start: f64,
    /// rad/s
    pub yaw_rate: f64,
    /// m/s²
    pub acceleration: f64,
}

impl ControlSegment {
    pub fn new(start: f64, yaw_rate: f64, acceleration: f64) -> Self {
        Self {
            start,
            yaw_rate,
            acceleration,
        }
    }
}

/// A simulated road user with ground-truth state.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Target {
    /// Unique target ID (used for metrics)
    pub id: u64,
    pub state: CtraState,
    /// Sorted by start time ascending; the active one is the last whose
    /// start ≤ t. Before the first segment the initial ω and a hold.
    pub segments: Vec<ControlSegment>,
    /// Optional: target appears after this time (no detections before)
    pub appear_at: Option<f64>,
    /// Optional: target disappears after this time
    pub disappear_at: Option<f64>,
    /// Speed cap (m/s); acceleration stops at the cap and at standstill
    pub max_speed: f64,
}

impl Target {
    pub fn new(id: u64, state: CtraState) -> Self {
        Self {
            id,
            state,
            segments: Vec::new(),
            appear_at: None,
            disappear_at: None,
            max_speed: 40.0,
        }
    }

    pub fn with_segments(mut self, mut segments: Vec<ControlSegment>) -> Self {
        segments.sort_by(|a, b| a.start.total_cmp(&b.start));
        self.segments = segments;
        self
    }

    pub fn active_between(mut self, appear_at: Option<f64>, disappear_at: Option<f64>) -> Self {
        self.appear_at = appear_at;
        self.disappear_at = disappear_at;
        self
    }

    /// Propagate true state by `dt` seconds from sim time `t`.
    pub fn step(&mut self, t: f64, dt: f64) {
        if let Some(seg) = self.segments.iter().filter(|s| s.start <= t).last() {
            self.state.yaw_rate = seg.yaw_rate;
            self.state.acceleration = seg.acceleration;
        }
        let mut next = self.state.propagate(dt);
        if next.velocity <= 0.0 {
            next.velocity = 0.0;
            next.acceleration = next.acceleration.max(0.0);
        } else if next.velocity >= self.max_speed {
            next.velocity = self.max_speed;
            next.acceleration = next.acceleration.min(0.0);
        }
        self.state = next;
    }

    /// True if target is active at time `t`.
    pub fn is_active(&self, t: f64) -> bool {
        if let Some(appear) = self.appear_at {
            if t < appear {
                return false;
            }
        }
        if let Some(disappear) = self.disappear_at {
            if t >= disappear {
                return false;
            }
        }
        true
    }

    /// 2D position
    pub fn pos_2d(&self) -> (f64, f64) {
        (self.state.position_x, self.state.position_y)
    }

    pub fn ground_truth(&self, time: f64) -> GroundTruth {
        GroundTruth {
            target_id: self.id,
            time,
            state: self.state,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;

    #[test]
    fn straight_line_without_segments() {
        let mut t = Target::new(0, CtraState::new(0.0, 0.0, 10.0, 0.0, 0.0, 0.0));
        for i in 0..10 {
            t.step(i as f64 * 0.1, 0.1);
        }
        assert_abs_diff_eq!(t.state.position_x, 10.0, epsilon = 1e-9);
        assert_abs_diff_eq!(t.state.position_y, 0.0, epsilon = 1e-9);
    }

    #[test]
    fn segment_switches_controls() {
        let mut t = Target::new(0, CtraState::new(0.0, 0.0, 10.0, 0.0, 0.0, 0.0))
            .with_segments(vec![ControlSegment::new(1.0, 0.0, 2.0)]);
        for i in 0..20 {
            t.step(i as f64 * 0.1, 0.1);
        }
        // 1 s cruising, then 1 s at 2 m/s²
        assert_abs_diff_eq!(t.state.velocity, 12.0, epsilon = 1e-9);
        assert_abs_diff_eq!(t.state.position_x, 10.0 + 11.0, epsilon = 1e-9);
    }

    #[test]
    fn braking_stops_at_standstill() {
        let mut t = Target::new(0, CtraState::new(0.0, 0.0, 2.0, 0.0, 0.0, -4.0));
        for i in 0..10 {
            t.step(i as f64 * 0.1, 0.1);
        }
        assert_eq!(t.state.velocity, 0.0);
        assert_eq!(t.state.acceleration, 0.0);
    }

    #[test]
    fn activity_window() {
        let t = Target::new(0, CtraState::default()).active_between(Some(2.0), Some(5.0));
        assert!(!t.is_active(1.9));
        assert!(t.is_active(2.0));
        assert!(!t.is_active(5.0));
    }
}
