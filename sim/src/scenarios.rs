//! Scenario definitions.
//!
//! Each scenario is a named configuration of road users and sensing agents.
//! All scenarios are deterministic given the same seed.

use crate::{
    agent_sim::{AgentParams, AgentSimulator, Mount, SimAgent},
    replay::{GroundTruthFrame, ReplayLog},
    target::{ControlSegment, Target},
};
use fusion_core::motion::{CtraState, MotionModelKind};
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};
use std::f64::consts::{FRAC_PI_2, PI, TAU};
use tracing::info;

/// Which pre-defined scenario to load.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
pub enum ScenarioKind {
    /// Urban crossing: one roadside unit, two connected vehicles, turning traffic
    Intersection,
    /// Three lanes with accelerating and lane-changing traffic, CTRA reports
    Highway,
    /// 30 road users, four agents, clutter
    Dense,
}

/// A fully configured simulation scenario.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,
    pub seed: u64,
    pub duration: f64, // seconds
    pub sim_dt: f64,   // simulation step (s)
    pub targets: Vec<Target>,
    pub agents: Vec<SimAgent>,
}

impl Scenario {
    /// Build the named scenario. Uses `seed` for repeatability.
    pub fn build(kind: ScenarioKind, seed: u64) -> Self {
        match kind {
            ScenarioKind::Intersection => Self::intersection(seed),
            ScenarioKind::Highway => Self::highway(seed),
            ScenarioKind::Dense => Self::dense(seed),
        }
    }

    /// Step truth and agents through the whole scenario.
    pub fn run(&self) -> ReplayLog {
        let mut targets = self.targets.clone();
        let mut sim = AgentSimulator::new(self.agents.clone(), self.seed);
        let steps = (self.duration / self.sim_dt).round() as usize;

        let mut batches = Vec::new();
        let mut ground_truth = Vec::with_capacity(steps + 1);
        for step in 0..=steps {
            let t = step as f64 * self.sim_dt;
            batches.extend(sim.generate_batches(&targets, t));
            ground_truth.push(GroundTruthFrame {
                time: t,
                targets: targets
                    .iter()
                    .filter(|tg| tg.is_active(t))
                    .map(|tg| tg.ground_truth(t))
                    .collect(),
            });
            for target in &mut targets {
                target.step(t, self.sim_dt);
            }
        }
        // The fusion node sees batches in arrival order
        batches.sort_by(|a, b| a.arrival_time.total_cmp(&b.arrival_time));

        info!(
            scenario = %self.name,
            seed = self.seed,
            batches = batches.len(),
            objects = batches.iter().map(|b| b.objects.len()).sum::<usize>(),
            "scenario simulated"
        );
        ReplayLog {
            scenario_name: self.name.clone(),
            seed: self.seed,
            sim_dt: self.sim_dt,
            duration: self.duration,
            batches,
            ground_truth,
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 1: Intersection
    // -----------------------------------------------------------------------
    fn intersection(seed: u64) -> Self {
        let targets = vec![
            // Connected vehicles
            target(0, -60.0, -2.0, 10.0, 0.0),
            target(1, 2.0, -60.0, 9.0, FRAC_PI_2),
            // Crossing traffic
            target(2, 60.0, 2.0, 11.0, PI),
            // Left turn from the north arm
            target(3, -2.0, 60.0, 8.0, -FRAC_PI_2).with_segments(vec![
                ControlSegment::new(4.0, 0.0, -1.5),
                ControlSegment::new(6.0, FRAC_PI_2 / 3.0, 0.0),
                ControlSegment::new(9.0, 0.0, 1.0),
                ControlSegment::new(12.0, 0.0, 0.0),
            ]),
            // Cyclist on the sidewalk
            target(4, -20.0, 8.0, 4.0, 0.0).active_between(Some(3.0), None),
        ];

        let roadside = AgentParams {
            range: 60.0,
            latency: 0.08,
            position_std: 0.3,
            ..Default::default()
        };
        let vehicle = AgentParams {
            range: 50.0,
            latency: 0.12,
            p_detection: 0.9,
            ..Default::default()
        };
        let agents = vec![
            SimAgent::new(0, Mount::Fixed { x: 8.0, y: 8.0 }, roadside),
            SimAgent::new(1, Mount::Vehicle { target_id: 0 }, vehicle.clone()),
            SimAgent::new(
                2,
                Mount::Vehicle { target_id: 1 },
                AgentParams {
                    latency: 0.15,
                    reports: MotionModelKind::Ctra,
                    ..vehicle
                },
            ),
        ];

        Scenario {
            name: "intersection".into(),
            seed,
            duration: 15.0,
            sim_dt: 0.05,
            targets,
            agents,
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 2: Highway
    // -----------------------------------------------------------------------
    fn highway(seed: u64) -> Self {
        // Lateral shift of one lane: yaw pulse +ω then −ω
        let lane_change = |start: f64, dir: f64| {
            vec![
                ControlSegment::new(start, 0.1 * dir, 0.0),
                ControlSegment::new(start + 1.0, -0.1 * dir, 0.0),
                ControlSegment::new(start + 2.0, 0.0, 0.0),
            ]
        };

        let mut merging = lane_change(5.0, 1.0);
        merging.insert(0, ControlSegment::new(0.0, 0.0, 1.5));
        merging.push(ControlSegment::new(8.0, 0.0, 0.0));

        let targets = vec![
            target(0, 0.0, 0.0, 27.0, 0.0),
            target(1, 40.0, 3.5, 30.0, 0.0).with_segments(lane_change(6.0, -1.0)),
            target(2, -30.0, 7.0, 24.0, 0.0).with_segments(merging),
            target(3, 80.0, 0.0, 25.0, 0.0)
                .with_segments(vec![ControlSegment::new(10.0, 0.0, -3.0), ControlSegment::new(13.0, 0.0, 0.0)]),
            target(4, -60.0, 3.5, 33.0, 0.0).with_segments(lane_change(3.0, 1.0)),
            target(5, 120.0, 7.0, 22.0, 0.0).active_between(None, Some(14.0)),
        ];

        let ctra_vehicle = AgentParams {
            range: 100.0,
            latency: 0.1,
            reports: MotionModelKind::Ctra,
            position_std: 0.6,
            ..Default::default()
        };
        let agents = vec![
            SimAgent::new(0, Mount::Vehicle { target_id: 0 }, ctra_vehicle.clone()),
            SimAgent::new(1, Mount::Vehicle { target_id: 3 }, ctra_vehicle),
            SimAgent::new(
                2,
                Mount::Fixed { x: 250.0, y: 12.0 },
                AgentParams {
                    range: 150.0,
                    latency: 0.05,
                    report_rate: 20.0,
                    ..Default::default()
                },
            ),
        ];

        Scenario {
            name: "highway".into(),
            seed,
            duration: 20.0,
            sim_dt: 0.05,
            targets,
            agents,
        }
    }

    // -----------------------------------------------------------------------
    // Scenario 3: Dense
    // -----------------------------------------------------------------------
    fn dense(seed: u64) -> Self {
        let mut rng = ChaCha8Rng::seed_from_u64(seed.wrapping_add(1));

        let targets = (0..30)
            .map(|i| {
                let x = rng.gen::<f64>() * 160.0 - 80.0;
                let y = rng.gen::<f64>() * 160.0 - 80.0;
                let speed = 2.0 + rng.gen::<f64>() * 13.0;
                let heading = rng.gen::<f64>() * TAU - PI;
                let turn_at = rng.gen::<f64>() * 15.0;
                let omega = (rng.gen::<f64>() - 0.5) * 0.6;
                let appear = if i % 5 == 0 { Some(rng.gen::<f64>() * 8.0) } else { None };
                let disappear = if i % 7 == 0 { Some(12.0 + rng.gen::<f64>() * 8.0) } else { None };
                target(i, x, y, speed, heading)
                    .with_segments(vec![
                        ControlSegment::new(turn_at, omega, 0.0),
                        ControlSegment::new(turn_at + 3.0, 0.0, 0.0),
                    ])
                    .active_between(appear, disappear)
            })
            .collect();

        let cluttered = AgentParams {
            range: 90.0,
            latency: 0.1,
            clutter_rate: 1.5,
            p_detection: 0.9,
            ..Default::default()
        };
        let agents = vec![
            SimAgent::new(0, Mount::Fixed { x: -60.0, y: -60.0 }, cluttered.clone()),
            SimAgent::new(1, Mount::Fixed { x: 60.0, y: 60.0 }, cluttered.clone()),
            SimAgent::new(
                2,
                Mount::Vehicle { target_id: 1 },
                AgentParams {
                    reports: MotionModelKind::Ctra,
                    latency: 0.2,
                    ..cluttered.clone()
                },
            ),
            SimAgent::new(
                3,
                Mount::Vehicle { target_id: 2 },
                AgentParams {
                    report_rate: 5.0,
                    latency: 0.25,
                    ..cluttered
                },
            ),
        ];

        Scenario {
            name: "dense".into(),
            seed,
            duration: 20.0,
            sim_dt: 0.1,
            targets,
            agents,
        }
    }
}

// ---------------------------------------------------------------------------
// Helper constructors
// ---------------------------------------------------------------------------

fn target(id: u64, x: f64, y: f64, speed: f64, heading: f64) -> Target {
    Target::new(id, CtraState::new(x, y, speed, heading, 0.0, 0.0))
}
