//! `fusion_core`: Cooperative-perception track fusion.
//!
//! # Module layout
//! - [`types`]             : Identifiers, score/association maps, object batches
//! - [`units`]             : Wrapped angles and tolerance helpers
//! - [`motion`]            : CTRV / CTRA states and closed-form propagation
//! - [`object`]            : Detected objects and tracks
//! - [`temporal_alignment`]: Project objects and tracks to a common time
//! - [`scoring`]           : Track × object affinity
//! - [`gating`]            : Reject implausible pairs
//! - [`association`]       : GNN, Hungarian and cluster associators
//! - [`fusion`]            : Information-form fusion of associated objects
//! - [`ukf`]               : Sigma points and the unscented transform
//! - [`estimation`]        : Unscented Kalman estimator
//! - [`pipeline`]          : score → gate → associate → fuse → estimate
//! - [`track_manager`]     : Birth / confirmation / deletion policy
//! - [`metrics`]           : RMSE, precision/recall against ground truth
//! - [`error`]             : Error type shared by every stage

pub mod association;
pub mod error;
pub mod estimation;
pub mod fusion;
pub mod gating;
pub mod metrics;
pub mod motion;
pub mod object;
pub mod pipeline;
pub mod scoring;
pub mod temporal_alignment;
pub mod track_manager;
pub mod types;
pub mod ukf;
pub mod units;

pub use error::{Result, TrackingError};
pub use motion::{CtraState, CtrvState, KinematicState, MotionModelKind};
pub use object::{DetectedObject, Track, TrackStatus};
pub use pipeline::{Pipeline, PipelineConfig, PipelineDebugData, PipelineOutput};
pub use types::{AgentId, AssociationMap, ObjectBatch, ObjectId, ScoreMap, TrackId};
pub use units::Angle;
