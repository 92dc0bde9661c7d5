//! Error types for the solver core.
//!
//! Every fatal condition names the invariant it violated and where, so a
//! failed run reports which boundary face or stability bound was at fault
//! rather than an opaque failure.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, FdtdError>;

#[derive(Debug, Error)]
pub enum FdtdError {
    /// Courant criterion S < n_min/sqrt(d) violated at setup.
    #[error("Courant factor {s} violates the stability bound {limit:.6} (S < n_min/sqrt(d)); the explicit scheme would diverge")]
    CourantUnstable { s: f64, limit: f64 },

    /// Field magnitudes blew past the configured bound mid-run.
    #[error("field magnitude {magnitude:.3e} exceeded the divergence limit {limit:.1e} at step {step}; aborting instead of returning garbage")]
    FieldsDiverged {
        step: usize,
        magnitude: f64,
        limit: f64,
    },

    /// PML layers do not fit inside the domain along the given axis.
    #[error("PML layers on axis {axis} total {thickness} length units but the domain extent is only {extent}")]
    PmlTooThick {
        axis: usize,
        thickness: f64,
        extent: f64,
    },

    /// Two different boundary conditions declared for the same face.
    #[error("conflicting boundary declarations on the {side} face of axis {axis}")]
    BoundaryConflict { axis: usize, side: &'static str },

    /// Periodic faces of an axis must pair up with one consistent Bloch phase.
    #[error("axis {axis} must be periodic on both faces with the same Bloch wavevector")]
    BlochMismatch { axis: usize },

    /// The declared symmetry cannot be represented on this grid.
    #[error("symmetry {op} incompatible with the grid: {reason}")]
    SymmetryIncompatible { op: String, reason: String },

    /// Geometry sampled on both sides of the symmetry plane disagrees.
    #[error("material field is not invariant under the declared symmetry near {position:?}")]
    AsymmetricMaterial { position: [f64; 3] },

    /// A source has no image partner under the declared symmetry.
    #[error("source at {position:?} is not invariant under the declared symmetry")]
    AsymmetricSource { position: [f64; 3] },

    /// A monitor/accumulator region misses the grid entirely.
    #[error("requested region does not intersect the grid")]
    EmptyRegion,

    /// Mismatched accumulator shapes (e.g. flux subtraction between runs
    /// with different planes or frequency lists).
    #[error("accumulator shapes do not match: {0}")]
    ShapeMismatch(String),

    #[error("index {index:?} out of bounds for grid dims {dims:?}")]
    OutOfBounds {
        index: [usize; 3],
        dims: [usize; 3],
    },
}
