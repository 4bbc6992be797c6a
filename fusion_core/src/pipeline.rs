//! Pipeline orchestrator: one perception cycle over previous tracks and the
//! objects reported by every agent.
//!
//! # Processing steps per cycle
//! 1. Align all objects to the cycle time through their own motion model,
//!    inflating their covariance by the process noise of the shift
//! 2. Predict all previous tracks to the cycle time (scoring only)
//! 3. Score every track × object pair
//! 4. Gate the score map
//! 5. Associate objects to tracks
//! 6. Fuse the aligned objects of each track into one observation
//! 7. Estimate every track from its unmodified previous state
//! 8. Collect unassociated objects and debug data
//!
//! The pipeline holds strategies only; no state survives a call to
//! [`Pipeline::run`].

use crate::{
    association::{self, unassociated_objects, Associator, AssociatorConfig},
    error::Result,
    estimation::{self, Estimator, EstimatorConfig},
    fusion::{self, Fuser, FuserConfig},
    gating::{self, Gater, GaterConfig},
    object::{DetectedObject, Track},
    scoring::{self, Scorer, ScorerConfig},
    temporal_alignment::{objects_at_time_with_noise, AlignmentNoise},
    types::{AssociationMap, ObjectId, ScoreMap},
};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::debug;

// ---------------------------------------------------------------------------
// Config
// ---------------------------------------------------------------------------

/// Strategy selection and execution options.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub scorer: ScorerConfig,
    pub gater: GaterConfig,
    pub associator: AssociatorConfig,
    pub fuser: FuserConfig,
    pub estimator: EstimatorConfig,
    /// Process noise added to objects while aligning them to the cycle time
    pub alignment: AlignmentNoise,
    /// Score and estimate on the rayon pool
    pub parallel: bool,
    /// Keep score maps in the output debug data
    pub collect_debug: bool,
}

// ---------------------------------------------------------------------------
// Debug Data
// ---------------------------------------------------------------------------

/// Intermediate data produced in one cycle.
#[derive(Clone, Debug, Default)]
pub struct PipelineDebugData {
    /// Raw scores (populated only when `collect_debug` is true)
    pub scores: ScoreMap,
    /// Scores after gating (populated only when `collect_debug` is true)
    pub gated_scores: ScoreMap,
    /// Timings in microseconds
    pub timing_align_us: u64,
    pub timing_score_us: u64,
    pub timing_gate_us: u64,
    pub timing_assign_us: u64,
    pub timing_fuse_us: u64,
    pub timing_estimate_us: u64,
}

/// Outputs of one cycle.
#[derive(Clone, Debug)]
pub struct PipelineOutput {
    /// One updated track per previous track, in the same order
    pub tracks: Vec<Track>,
    /// Objects claimed by each track
    pub associations: AssociationMap,
    /// Objects no track claimed, in input order (candidates for track birth)
    pub unassociated_objects: Vec<ObjectId>,
    /// Input objects aligned to the cycle time, in input order
    pub aligned_objects: Vec<DetectedObject>,
    pub debug: PipelineDebugData,
    /// Wall-clock time of processing
    pub total_time_us: u64,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

/// Stateless orchestrator over boxed strategies.
pub struct Pipeline {
    scorer: Box<dyn Scorer>,
    gater: Box<dyn Gater>,
    associator: Box<dyn Associator>,
    fuser: Box<dyn Fuser>,
    estimator: Box<dyn Estimator>,
    alignment: AlignmentNoise,
    parallel: bool,
    collect_debug: bool,
}

impl Pipeline {
    /// Build every strategy selected by `config`.
    pub fn new(config: &PipelineConfig) -> Self {
        Self {
            scorer: config.scorer.build(),
            gater: config.gater.build(),
            associator: config.associator.build(),
            fuser: config.fuser.build(),
            estimator: config.estimator.build(),
            alignment: config.alignment,
            parallel: config.parallel,
            collect_debug: config.collect_debug,
        }
    }

    /// Pipeline over caller-supplied strategies.
    pub fn with_strategies(
        scorer: Box<dyn Scorer>,
        gater: Box<dyn Gater>,
        associator: Box<dyn Associator>,
        fuser: Box<dyn Fuser>,
        estimator: Box<dyn Estimator>,
    ) -> Self {
        Self {
            scorer,
            gater,
            associator,
            fuser,
            estimator,
            alignment: AlignmentNoise::default(),
            parallel: false,
            collect_debug: false,
        }
    }

    pub fn alignment_noise(mut self, alignment: AlignmentNoise) -> Self {
        self.alignment = alignment;
        self
    }

    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn collect_debug(mut self, collect_debug: bool) -> Self {
        self.collect_debug = collect_debug;
        self
    }

    /// Run one cycle at `time`. `previous` is never modified.
    pub fn run(
        &self,
        previous: &[Track],
        objects: &[DetectedObject],
        time: f64,
    ) -> Result<PipelineOutput> {
        let start_total = Instant::now();
        let mut debug = PipelineDebugData::default();

        // ----------------------------------------------------------------
        // Step 1: Temporal alignment
        // ----------------------------------------------------------------
        let t0 = Instant::now();
        let aligned = objects_at_time_with_noise(objects, time, &self.alignment);
        debug.timing_align_us = t0.elapsed().as_micros() as u64;

        // ----------------------------------------------------------------
        // Step 2–3: Predict tracks, score pairs
        // ----------------------------------------------------------------
        let t0 = Instant::now();
        let predict = |t: &Track| self.estimator.predict(t, time);
        let predicted: Vec<Track> = if self.parallel {
            previous.par_iter().map(predict).collect::<Result<_>>()?
        } else {
            previous.iter().map(predict).collect::<Result<_>>()?
        };
        let scores = scoring::score(self.scorer.as_ref(), &predicted, &aligned, self.parallel);
        debug.timing_score_us = t0.elapsed().as_micros() as u64;

        // ----------------------------------------------------------------
        // Step 4: Gating
        // ----------------------------------------------------------------
        let t0 = Instant::now();
        let gated = gating::gate(self.gater.as_ref(), &scores);
        debug.timing_gate_us = t0.elapsed().as_micros() as u64;

        // ----------------------------------------------------------------
        // Step 5: Association; every previous track gets an entry
        // ----------------------------------------------------------------
        let t0 = Instant::now();
        let mut associations = association::associate(self.associator.as_ref(), &gated);
        for track in previous {
            associations.entry(track.id.clone()).or_default();
        }
        let unassociated = unassociated_objects(&aligned, &associations);
        debug.timing_assign_us = t0.elapsed().as_micros() as u64;

        // ----------------------------------------------------------------
        // Step 6: Fusion
        // ----------------------------------------------------------------
        let t0 = Instant::now();
        let fused = fusion::fuse(self.fuser.as_ref(), &aligned, &associations)?;
        debug.timing_fuse_us = t0.elapsed().as_micros() as u64;

        // ----------------------------------------------------------------
        // Step 7: Estimation
        // ----------------------------------------------------------------
        let t0 = Instant::now();
        let tracks = estimation::estimate(self.estimator.as_ref(), previous, &fused, time, self.parallel)?;
        debug.timing_estimate_us = t0.elapsed().as_micros() as u64;

        if self.collect_debug {
            debug.scores = scores;
            debug.gated_scores = gated;
        }

        let total_time_us = start_total.elapsed().as_micros() as u64;
        debug!(
            time,
            tracks = tracks.len(),
            objects = objects.len(),
            unassociated = unassociated.len(),
            total_time_us,
            "pipeline cycle"
        );

        Ok(PipelineOutput {
            tracks,
            associations,
            unassociated_objects: unassociated,
            aligned_objects: aligned,
            debug,
            total_time_us,
        })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
