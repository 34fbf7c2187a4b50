//! NumPy-style broadcasting and dimension coalescing.
//!
//! [`broadcast`] reconciles two shapes into a common target,
//! [`Shape::broadcast_strides`] lays each operand out against that target
//! (stride 0 = replicated dimension), and [`shrink_broadcast_ranges`] merges
//! adjacent dimensions that are contiguous in every operand simultaneously,
//! minimizing the rank the kernel has to iterate.

use crate::error::{Result, ShapeError};
use crate::shape::{Shape, MAX_TENSOR_DIM};

/// Compute the broadcast target of two shapes.
///
/// The shorter shape is right-aligned by left-padding with size-1 dimensions;
/// each aligned pair must then be equal or contain a 1. Fails with
/// [`ShapeError::Incompatible`] naming both original shapes otherwise.
pub fn broadcast(a: &Shape, b: &Shape) -> Result<Shape> {
    let mut lhs = *a;
    let mut rhs = *b;
    while lhs.ndim() < rhs.ndim() {
        lhs = lhs.unsqueeze(0)?;
    }
    while rhs.ndim() < lhs.ndim() {
        rhs = rhs.unsqueeze(0)?;
    }

    let mut out = lhs;
    for i in 0..lhs.ndim() {
        if lhs[i] == rhs[i] {
            out[i] = lhs[i];
        } else if lhs[i] == 1 {
            out[i] = rhs[i];
        } else if rhs[i] == 1 {
            out[i] = lhs[i];
        } else {
            return Err(ShapeError::Incompatible { a: *a, b: *b });
        }
    }
    Ok(out)
}

impl Shape {
    /// Lay this shape out against an already-broadcast `target`, producing a
    /// stride vector (reusing `Shape` as the container).
    ///
    /// Walking right to left: a dimension matching the target extent gets the
    /// running contiguous stride; a size-1 dimension replicated to a larger
    /// extent gets stride 0; target dimensions with no counterpart in `self`
    /// get stride 0. Any other mismatch fails with
    /// [`ShapeError::BadBroadcastTarget`].
    pub fn broadcast_strides(&self, target: &Shape) -> Result<Shape> {
        if self.ndim() > target.ndim() {
            return Err(ShapeError::BadBroadcastTarget { from: *self, to: *target });
        }
        let offset = target.ndim() - self.ndim();

        let mut strides = *target;
        let mut stride = 1usize;
        for i in (0..target.ndim()).rev() {
            if i < offset {
                strides[i] = 0;
                continue;
            }
            let pos = i - offset;
            if self[pos] == target[i] {
                strides[i] = stride;
                stride *= target[i];
            } else if self[pos] == 1 {
                strides[i] = 0;
            } else {
                return Err(ShapeError::BadBroadcastTarget { from: *self, to: *target });
            }
        }
        Ok(strides)
    }
}

/// Coalesce the dimensions of a batch of shapes that broadcast together.
///
/// Computes the common broadcast target and each shape's strides against it,
/// then finds maximal runs of adjacent dimensions — scanning from the
/// innermost dimension outward — where every operand's stride for dimension
/// `i` equals `stride[i+1] * extent[i+1]` (dimension `i` is contiguous with
/// its right neighbor in every operand). Each such run collapses into a
/// single dimension whose extent is the product of the run, applied with the
/// same merge decisions to every shape so kernels can iterate them in
/// lock-step.
///
/// Either every shape in `shapes` is rewritten or, on error, none are.
/// An empty batch is a no-op. The per-shape element count is preserved
/// exactly, and re-running on the output changes nothing.
pub fn shrink_broadcast_ranges(shapes: &mut [Shape]) -> Result<()> {
    let Some((first, rest)) = shapes.split_first() else {
        return Ok(());
    };

    let mut target = *first;
    for s in rest {
        target = broadcast(&target, s)?;
    }
    let strides: Vec<Shape> =
        shapes.iter().map(|s| s.broadcast_strides(&target)).collect::<Result<_>>()?;

    let ndim = target.ndim();
    let mut squeezable = vec![false; ndim];
    let mut squeezed = 0;
    for i in 0..ndim.saturating_sub(1) {
        squeezable[i] = strides.iter().all(|st| st[i + 1] * target[i + 1] == st[i]);
        if squeezable[i] {
            squeezed += 1;
        }
    }
    let final_ndim = ndim - squeezed;

    let mut rewritten = Vec::with_capacity(shapes.len());
    for s in shapes.iter() {
        let mut input = *s;
        while input.ndim() < ndim {
            input = input.unsqueeze(0)?;
        }
        let mut merged = [0usize; MAX_TENSOR_DIM];
        let mut pos = 0;
        for slot in merged.iter_mut().take(final_ndim) {
            *slot = input[pos];
            while pos + 1 < ndim && squeezable[pos] {
                *slot *= input[pos + 1];
                pos += 1;
            }
            pos += 1;
        }
        rewritten.push(Shape::new(&merged[..final_ndim])?);
    }
    shapes.copy_from_slice(&rewritten);
    Ok(())
}
