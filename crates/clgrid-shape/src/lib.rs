//! Tensor shape arithmetic for the clgrid dispatch planner.
//!
//! This crate is the pure half of clgrid: a fixed-capacity [`Shape`] value
//! type plus the broadcast engine that decides how operands of different
//! ranks are reconciled before a kernel launch — NumPy-style pairwise
//! [`broadcast`], per-operand [`broadcast strides`](Shape::broadcast_strides)
//! against a common target, and [`shrink_broadcast_ranges`], which merges
//! dimensions that are contiguous across every operand so the kernel loops
//! over as few logical dimensions as possible.
//!
//! Nothing here touches a device; the runtime crate consumes these plans.

pub mod broadcast;
pub mod error;
pub mod shape;

pub use broadcast::{broadcast, shrink_broadcast_ranges};
pub use error::{Result, ShapeError};
pub use shape::{Shape, MAX_TENSOR_DIM};
