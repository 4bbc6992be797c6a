//! Error type for every fallible pipeline stage.

use crate::types::{ObjectId, TrackId};
use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, TrackingError>;

/// Failures raised by stages that carry cross-collection invariants
/// (fusion lookups, batch estimation) or hit a numerical dead end.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TrackingError {
    /// Batch estimation was handed collections of different sizes.
    #[error("previous track list has {previous} entries but fused list has {fused}")]
    LengthMismatch { previous: usize, fused: usize },

    /// An association entry names an object that is not in the object list.
    #[error("track {track} is associated with unknown object {object}")]
    UnknownObject { track: TrackId, object: ObjectId },

    /// A previous track has no counterpart in the fused batch.
    #[error("no fused entry for track {0}")]
    MissingTrack(TrackId),

    /// The same track identifier appears twice in one batch.
    #[error("track {0} appears more than once in the batch")]
    DuplicateTrack(TrackId),

    /// Covariance dimensions do not match the state variant.
    #[error("covariance is {rows}x{cols} but the {kind} state has dimension {dim}")]
    CovarianceShape {
        kind: &'static str,
        dim: usize,
        rows: usize,
        cols: usize,
    },

    /// Cholesky factorisation failed while generating sigma points.
    #[error("covariance is not positive definite ({0})")]
    NotPositiveDefinite(&'static str),

    /// A matrix that must be inverted is singular.
    #[error("singular matrix in {0}")]
    SingularMatrix(&'static str),
}
