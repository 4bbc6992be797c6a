//! Sensing-agent simulator.
//!
//! Generates per-agent object batches with:
//! - Gaussian noise on every reported state component
//! - Miss probability (1 - P_D) and a sensing range
//! - Poisson clutter (false objects)
//! - Per-agent relay latency (arrival_time = sensor_time + latency)
//! - A per-agent reporting model (CTRV or CTRA)

use crate::target::Target;
use fusion_core::{
    motion::{CtraState, KinematicState, MotionModelKind},
    types::{AgentId, DMat, DVec, ObjectBatch, ObjectId},
    DetectedObject,
};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, Poisson, StandardNormal};
use serde::{Deserialize, Serialize};
use std::f64::consts::{PI, TAU};
use tracing::trace;

/// Where an agent's sensor sits.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub enum Mount {
    /// Roadside unit at a fixed position (m)
    Fixed { x: f64, y: f64 },
    /// Connected vehicle: rides on the target with this id
    Vehicle { target_id: u64 },
}

/// Sensing and reporting characteristics of one agent.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AgentParams {
    /// Sensing radius (m)
    pub range: f64,
    /// Probability of detecting a target in range
    pub p_detection: f64,
    /// Reports per second
    pub report_rate: f64,
    /// Relay latency to the fusion node (s)
    pub latency: f64,
    /// State model the agent reports in
    pub reports: MotionModelKind,
    /// Position noise (1σ, m)
    pub position_std: f64,
    /// Speed noise (1σ, m/s)
    pub speed_std: f64,
    /// Heading noise (1σ, rad)
    pub yaw_std: f64,
    /// Yaw-rate noise (1σ, rad/s)
    pub yaw_rate_std: f64,
    /// Acceleration noise (1σ, m/s²), CTRA reports only
    pub accel_std: f64,
    /// Mean number of clutter objects per report
    pub clutter_rate: f64,
}

impl Default for AgentParams {
    fn default() -> Self {
        Self {
            range: 80.0,
            p_detection: 0.95,
            report_rate: 10.0,
            latency: 0.05,
            reports: MotionModelKind::Ctrv,
            position_std: 0.5,
            speed_std: 0.5,
            yaw_std: 0.05,
            yaw_rate_std: 0.05,
            accel_std: 0.5,
            clutter_rate: 0.0,
        }
    }
}

impl AgentParams {
    /// Diagonal covariance matching the injected noise, sized for the
    /// `reports` model.
    pub fn covariance(&self, scale: f64) -> DMat {
        let mut stds = vec![
            self.position_std,
            self.position_std,
            self.speed_std,
            self.yaw_std,
            self.yaw_rate_std,
        ];
        if self.reports == MotionModelKind::Ctra {
            stds.push(self.accel_std);
        }
        let variances = DVec::from_iterator(stds.len(), stds.iter().map(|s| (s * scale).powi(2)));
        DMat::from_diagonal(&variances)
    }
}

/// One configured agent in the simulation.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct SimAgent {
    pub id: AgentId,
    pub mount: Mount,
    pub params: AgentParams,
    /// Next scheduled report time
    pub next_report_time: f64,
}

impl SimAgent {
    pub fn new(id: u32, mount: Mount, params: AgentParams) -> Self {
        Self {
            id: AgentId(id),
            mount,
            params,
            next_report_time: 0.0,
        }
    }

    /// Check if this agent should report at the current simulation time.
    pub fn should_report(&self, t: f64) -> bool {
        t + 1e-9 >= self.next_report_time
    }

    /// Advance the schedule by one report interval.
    pub fn advance_schedule(&mut self) {
        self.next_report_time += 1.0 / self.params.report_rate;
    }

    /// Sensor position, `None` while the carrying vehicle is inactive.
    pub fn position(&self, targets: &[Target], t: f64) -> Option<(f64, f64)> {
        match self.mount {
            Mount::Fixed { x, y } => Some((x, y)),
            Mount::Vehicle { target_id } => targets
                .iter()
                .find(|tg| tg.id == target_id && tg.is_active(t))
                .map(Target::pos_2d),
        }
    }
}

/// Generates object batches from a set of targets.
pub struct AgentSimulator {
    pub agents: Vec<SimAgent>,
    rng: ChaCha8Rng,
}

impl AgentSimulator {
    pub fn new(agents: Vec<SimAgent>, seed: u64) -> Self {
        Self {
            agents,
            rng: ChaCha8Rng::seed_from_u64(seed),
        }
    }

    /// Generate the batches of every agent due at `sim_time`.
    pub fn generate_batches(&mut self, targets: &[Target], sim_time: f64) -> Vec<ObjectBatch> {
        let mut batches = Vec::new();

        for agent in &mut self.agents {
            if !agent.should_report(sim_time) {
                continue;
            }
            agent.advance_schedule();
            let Some((ax, ay)) = agent.position(targets, sim_time) else {
                continue;
            };
            let own_target = match agent.mount {
                Mount::Vehicle { target_id } => Some(target_id),
                Mount::Fixed { .. } => None,
            };
            let params = &agent.params;
            let mut objects = Vec::new();

            // True detections
            for target in targets {
                if !target.is_active(sim_time) || Some(target.id) == own_target {
                    continue;
                }
                let (tx, ty) = target.pos_2d();
                if (tx - ax).hypot(ty - ay) > params.range {
                    continue;
                }
                // Miss detection?
                if self.rng.gen::<f64>() > params.p_detection {
                    continue;
                }
                let state = noisy_state(&mut self.rng, &target.state, params);
                objects.push(DetectedObject {
                    id: random_object_id(&mut self.rng),
                    source: agent.id,
                    timestamp: sim_time,
                    state,
                    covariance: params.covariance(1.0),
                });
            }

            // Clutter (Poisson)
            let n_clutter = match Poisson::new(params.clutter_rate) {
                Ok(poisson) => {
                    let n: f64 = poisson.sample(&mut self.rng);
                    n as usize
                }
                Err(_) => 0,
            };
            for _ in 0..n_clutter {
                let r = params.range * self.rng.gen::<f64>().sqrt();
                let bearing = self.rng.gen::<f64>() * TAU - PI;
                let truth = CtraState::new(
                    ax + r * bearing.cos(),
                    ay + r * bearing.sin(),
                    self.rng.gen::<f64>() * 5.0,
                    self.rng.gen::<f64>() * TAU - PI,
                    0.0,
                    0.0,
                );
                objects.push(DetectedObject {
                    id: random_object_id(&mut self.rng),
                    source: agent.id,
                    timestamp: sim_time,
                    state: report(&truth, params.reports),
                    covariance: params.covariance(2.0),
                });
            }

            trace!(agent = %agent.id, objects = objects.len(), n_clutter, "agent report");
            batches.push(ObjectBatch {
                agent_id: agent.id,
                sensor_time: sim_time,
                arrival_time: sim_time + params.latency,
                objects,
            });
        }

        batches
    }
}

/// UUIDv4 drawn from the simulator's RNG so runs are reproducible.
fn random_object_id(rng: &mut ChaCha8Rng) -> ObjectId {
    ObjectId(uuid::Builder::from_random_bytes(rng.gen()).into_uuid().to_string())
}

fn gaussian(rng: &mut ChaCha8Rng, std: f64) -> f64 {
    let z: f64 = rng.sample(StandardNormal);
    z * std
}

fn noisy_state(rng: &mut ChaCha8Rng, truth: &CtraState, params: &AgentParams) -> KinematicState {
    let noisy = CtraState::new(
        truth.position_x + gaussian(rng, params.position_std),
        truth.position_y + gaussian(rng, params.position_std),
        truth.velocity + gaussian(rng, params.speed_std),
        truth.yaw.radians() + gaussian(rng, params.yaw_std),
        truth.yaw_rate + gaussian(rng, params.yaw_rate_std),
        truth.acceleration + gaussian(rng, params.accel_std),
    );
    report(&noisy, params.reports)
}

fn report(state: &CtraState, kind: MotionModelKind) -> KinematicState {
    match kind {
        MotionModelKind::Ctrv => KinematicState::Ctrv(state.to_ctrv()),
        MotionModelKind::Ctra => KinematicState::Ctra(*state),
    }
}
