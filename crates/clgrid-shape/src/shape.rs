//! Fixed-capacity tensor shape value type.

use std::fmt;
use std::ops::{Index, IndexMut};

use crate::error::{Result, ShapeError};

/// Maximum number of dimensions a [`Shape`] can hold.
pub const MAX_TENSOR_DIM: usize = 8;

/// A tensor shape: up to [`MAX_TENSOR_DIM`] dimension extents stored inline.
///
/// `Shape` is a plain value type, cheap to copy, compare, and hash. An
/// extent of `1` is the broadcast wildcard: the broadcast engine treats such
/// a dimension as replicable against any paired extent. The same type doubles
/// as a stride vector when produced by
/// [`broadcast_strides`](Shape::broadcast_strides), where an entry of `0`
/// marks a replicated (non-advancing) dimension.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Shape {
    ndim: usize,
    dims: [usize; MAX_TENSOR_DIM],
}

impl Shape {
    /// Build a shape from a slice of dimension extents.
    ///
    /// Fails with [`ShapeError::RankOverflow`] when the slice is longer than
    /// [`MAX_TENSOR_DIM`].
    pub fn new(dims: &[usize]) -> Result<Self> {
        if dims.len() > MAX_TENSOR_DIM {
            return Err(ShapeError::RankOverflow { ndim: dims.len(), max: MAX_TENSOR_DIM });
        }
        let mut shape = Shape::default();
        shape.dims[..dims.len()].copy_from_slice(dims);
        shape.ndim = dims.len();
        Ok(shape)
    }

    /// The rank-0 (scalar) shape.
    pub fn scalar() -> Self {
        Shape::default()
    }

    /// Number of active dimensions.
    pub fn ndim(&self) -> usize {
        self.ndim
    }

    /// The active dimension extents as a slice.
    pub fn dims(&self) -> &[usize] {
        &self.dims[..self.ndim]
    }

    /// Total number of elements: the product of all extents (1 for a scalar).
    pub fn total_elements(&self) -> usize {
        self.dims().iter().product()
    }

    /// Return a new shape with a size-1 dimension inserted at `axis`.
    ///
    /// A negative `axis` counts from the end, inclusive of one-past-last:
    /// `-1` inserts after the current last dimension. Fails when the axis
    /// falls outside `[0, ndim]` or the result would exceed
    /// [`MAX_TENSOR_DIM`].
    pub fn unsqueeze(&self, axis: isize) -> Result<Self> {
        let resolved = if axis < 0 { axis + self.ndim as isize + 1 } else { axis };
        if resolved < 0 || resolved > self.ndim as isize {
            return Err(ShapeError::AxisOutOfRange { axis, ndim: self.ndim });
        }
        if self.ndim + 1 > MAX_TENSOR_DIM {
            return Err(ShapeError::RankOverflow { ndim: self.ndim + 1, max: MAX_TENSOR_DIM });
        }
        let at = resolved as usize;

        let mut out = Shape::default();
        out.dims[..at].copy_from_slice(&self.dims[..at]);
        out.dims[at] = 1;
        out.dims[at + 1..=self.ndim].copy_from_slice(&self.dims[at..self.ndim]);
        out.ndim = self.ndim + 1;
        Ok(out)
    }
}

impl TryFrom<&[usize]> for Shape {
    type Error = ShapeError;

    fn try_from(dims: &[usize]) -> Result<Self> {
        Shape::new(dims)
    }
}

impl Index<usize> for Shape {
    type Output = usize;

    fn index(&self, dim: usize) -> &usize {
        &self.dims()[dim]
    }
}

impl IndexMut<usize> for Shape {
    fn index_mut(&mut self, dim: usize) -> &mut usize {
        let ndim = self.ndim;
        &mut self.dims[..ndim][dim]
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "(")?;
        for (i, d) in self.dims().iter().enumerate() {
            if i > 0 {
                write!(f, ",")?;
            }
            write!(f, "{d}")?;
        }
        write!(f, ")")
    }
}

impl fmt::Debug for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Shape{self}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn s(dims: &[usize]) -> Shape {
        Shape::new(dims).unwrap()
    }

    // ----- construction ---------------------------------------------------

    #[test]
    fn new_stores_dims() {
        let shape = s(&[2, 3, 4]);
        assert_eq!(shape.ndim(), 3);
        assert_eq!(shape.dims(), &[2, 3, 4]);
    }

    #[test]
    fn new_rejects_over_capacity() {
        let dims = [1usize; MAX_TENSOR_DIM + 1];
        let err = Shape::new(&dims).unwrap_err();
        assert_eq!(err, ShapeError::RankOverflow { ndim: MAX_TENSOR_DIM + 1, max: MAX_TENSOR_DIM });
    }

    #[test]
    fn new_accepts_full_capacity() {
        let dims = [2usize; MAX_TENSOR_DIM];
        assert_eq!(s(&dims).ndim(), MAX_TENSOR_DIM);
    }

    #[test]
    fn scalar_has_rank_zero() {
        assert_eq!(Shape::scalar().ndim(), 0);
        assert_eq!(Shape::scalar().total_elements(), 1);
    }

    #[test]
    fn try_from_slice() {
        let shape = Shape::try_from(&[5, 6][..]).unwrap();
        assert_eq!(shape.dims(), &[5, 6]);
    }

    // ----- accessors ------------------------------------------------------

    #[test]
    fn total_elements_is_product() {
        assert_eq!(s(&[2, 3, 4]).total_elements(), 24);
        assert_eq!(s(&[7]).total_elements(), 7);
    }

    #[test]
    fn index_reads_extents() {
        let shape = s(&[2, 3]);
        assert_eq!(shape[0], 2);
        assert_eq!(shape[1], 3);
    }

    #[test]
    fn index_mut_writes_extents() {
        let mut shape = s(&[2, 3]);
        shape[1] = 9;
        assert_eq!(shape.dims(), &[2, 9]);
    }

    #[test]
    #[should_panic]
    fn index_past_rank_panics() {
        let shape = s(&[2, 3]);
        let _ = shape[2];
    }

    // ----- unsqueeze ------------------------------------------------------

    #[test]
    fn unsqueeze_front() {
        assert_eq!(s(&[2, 3]).unsqueeze(0).unwrap().dims(), &[1, 2, 3]);
    }

    #[test]
    fn unsqueeze_middle() {
        assert_eq!(s(&[2, 3]).unsqueeze(1).unwrap().dims(), &[2, 1, 3]);
    }

    #[test]
    fn unsqueeze_end() {
        assert_eq!(s(&[2, 3]).unsqueeze(2).unwrap().dims(), &[2, 3, 1]);
    }

    #[test]
    fn unsqueeze_negative_counts_from_end() {
        // -1 is one-past-last, mirroring the inclusive upper bound.
        assert_eq!(s(&[2, 3]).unsqueeze(-1).unwrap().dims(), &[2, 3, 1]);
        assert_eq!(s(&[2, 3]).unsqueeze(-3).unwrap().dims(), &[1, 2, 3]);
    }

    #[test]
    fn unsqueeze_axis_out_of_range() {
        assert_eq!(
            s(&[2, 3]).unsqueeze(3).unwrap_err(),
            ShapeError::AxisOutOfRange { axis: 3, ndim: 2 }
        );
        assert_eq!(
            s(&[2, 3]).unsqueeze(-4).unwrap_err(),
            ShapeError::AxisOutOfRange { axis: -4, ndim: 2 }
        );
    }

    #[test]
    fn unsqueeze_at_capacity_fails() {
        let full = s(&[2; MAX_TENSOR_DIM]);
        assert!(matches!(full.unsqueeze(0), Err(ShapeError::RankOverflow { .. })));
    }

    #[test]
    fn unsqueeze_grows_rank_and_preserves_extents() {
        let shape = s(&[4, 5, 6]);
        for axis in 0..=shape.ndim() {
            let grown = shape.unsqueeze(axis as isize).unwrap();
            assert_eq!(grown.ndim(), shape.ndim() + 1);
            assert_eq!(grown[axis], 1);
            // Removing the inserted dimension reconstructs the original.
            let mut rest: Vec<usize> = grown.dims().to_vec();
            rest.remove(axis);
            assert_eq!(rest, shape.dims());
        }
    }

    #[test]
    fn unsqueeze_scalar() {
        assert_eq!(Shape::scalar().unsqueeze(0).unwrap().dims(), &[1]);
    }

    // ----- formatting -----------------------------------------------------

    #[test]
    fn display_matches_tuple_form() {
        assert_eq!(s(&[2, 3, 4]).to_string(), "(2,3,4)");
        assert_eq!(s(&[7]).to_string(), "(7)");
        assert_eq!(Shape::scalar().to_string(), "()");
    }

    #[test]
    fn debug_includes_dims() {
        assert_eq!(format!("{:?}", s(&[2, 3])), "Shape(2,3)");
    }
}
