//! Error types for shape construction and broadcast planning.

use thiserror::Error;

use crate::shape::Shape;

/// Errors arising from shape construction and broadcast planning.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("rank {ndim} exceeds the maximum supported rank {max}")]
    RankOverflow { ndim: usize, max: usize },

    #[error("unsqueeze axis {axis} out of range for rank-{ndim} shape")]
    AxisOutOfRange { axis: isize, ndim: usize },

    #[error("shapes {a} and {b} are not broadcast-compatible")]
    Incompatible { a: Shape, b: Shape },

    #[error("cannot broadcast {from} to {to}")]
    BadBroadcastTarget { from: Shape, to: Shape },
}

/// Convenience alias used throughout this crate.
pub type Result<T> = std::result::Result<T, ShapeError>;
