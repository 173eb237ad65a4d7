//! Shared shape helpers: bidirectional broadcasting and axis normalization.

use thiserror::Error;

use crate::tensor::Shape;

/// Shape-compatibility violations raised by the pure inference functions.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ShapeError {
    #[error("shapes {lhs} and {rhs} are not broadcastable at axis {axis} ({left} vs {right})")]
    NotBroadcastable {
        lhs: Shape,
        rhs: Shape,
        axis: usize,
        left: usize,
        right: usize,
    },
    #[error("matmul contraction dimension mismatch: lhs k={lhs_k} vs rhs k={rhs_k}")]
    ContractionMismatch { lhs_k: usize, rhs_k: usize },
    #[error("matmul operands must have rank >= 2, got {lhs_rank} and {rhs_rank}")]
    MatmulRankTooLow { lhs_rank: usize, rhs_rank: usize },
    #[error("permutation {perm:?} is invalid for rank {rank}")]
    InvalidPermutation { perm: Vec<usize>, rank: usize },
    #[error("axis {axis} is out of range for rank {rank}")]
    AxisOutOfRange { axis: isize, rank: usize },
    #[error("concat inputs must share rank {expected}, got {got}")]
    RankMismatch { expected: usize, got: usize },
    #[error("concat inputs disagree on non-concatenated axis {axis}: {expected} vs {got}")]
    AxisMismatch {
        axis: usize,
        expected: usize,
        got: usize,
    },
    #[error("concat requires at least one input")]
    EmptyConcat,
}

/// Right-aligned bidirectional (ONNX-style) broadcasting of two shapes.
///
/// Dimensions are matched from the trailing axis; a dimension of size 1 or a
/// missing leading dimension matches any size on the other operand.
pub fn infer_broadcast(lhs: &Shape, rhs: &Shape) -> Result<Shape, ShapeError> {
    let a = lhs.dims();
    let b = rhs.dims();
    let rank = a.len().max(b.len());
    let mut dims = vec![0usize; rank];
    for i in 0..rank {
        let da = if i < a.len() { a[a.len() - 1 - i] } else { 1 };
        let db = if i < b.len() { b[b.len() - 1 - i] } else { 1 };
        dims[rank - 1 - i] = if da == db || db == 1 {
            da
        } else if da == 1 {
            db
        } else {
            return Err(ShapeError::NotBroadcastable {
                lhs: lhs.clone(),
                rhs: rhs.clone(),
                axis: rank - 1 - i,
                left: da,
                right: db,
            });
        };
    }
    Ok(Shape::new(dims))
}

/// Resolves a possibly negative axis against a rank.
pub fn normalize_axis(axis: isize, rank: usize) -> Result<usize, ShapeError> {
    let rank_i = rank as isize;
    if axis < -rank_i || axis >= rank_i {
        return Err(ShapeError::AxisOutOfRange { axis, rank });
    }
    Ok(if axis < 0 { (axis + rank_i) as usize } else { axis as usize })
}

/// Converts a flat row-major index into per-axis coordinates.
pub fn locate_index(mut flat: usize, shape: &Shape) -> Vec<usize> {
    let dims = shape.dims();
    let mut coords = vec![0usize; dims.len()];
    for axis in (0..dims.len()).rev() {
        coords[axis] = flat % dims[axis];
        flat /= dims[axis];
    }
    coords
}

/// Converts per-axis coordinates back to a flat offset under the given strides.
pub fn delocate_index(coords: &[usize], strides: &[usize]) -> usize {
    debug_assert_eq!(coords.len(), strides.len());
    coords
        .iter()
        .zip(strides.iter())
        .map(|(coord, stride)| coord * stride)
        .sum()
}
