//! `sim`: Cooperative-perception scenario simulator: ground-truth targets,
//! sensing agents, replay logs.

pub mod agent_sim;
pub mod replay;
pub mod scenarios;
pub mod target;

pub use agent_sim::{AgentParams, AgentSimulator, Mount, SimAgent};
pub use replay::{load_replay, save_replay, Cycle, GroundTruthFrame, ReplayLog};
pub use scenarios::{Scenario, ScenarioKind};
pub use target::{ControlSegment, Target};
