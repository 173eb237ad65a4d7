//! Concatenation shape inference.

use crate::tensor::Shape;
use crate::utils::{normalize_axis, ShapeError};

/// Infers the concatenation of `inputs` along `axis` (negative axes are
/// resolved against the rank of the first input).
///
/// All inputs must share rank and agree exactly on every non-concatenated
/// axis; the concatenated axis is the sum of the input extents.
pub fn infer_concat(inputs: &[&Shape], axis: isize) -> Result<Shape, ShapeError> {
    let first = inputs.first().ok_or(ShapeError::EmptyConcat)?;
    let rank = first.rank();
    let axis = normalize_axis(axis, rank)?;

    let mut dims = first.dims().to_vec();
    let mut concat_extent = 0usize;
    for shape in inputs {
        if shape.rank() != rank {
            return Err(ShapeError::RankMismatch {
                expected: rank,
                got: shape.rank(),
            });
        }
        for (i, (&expected, &got)) in dims.iter().zip(shape.dims()).enumerate() {
            if i != axis && expected != got {
                return Err(ShapeError::AxisMismatch {
                    axis: i,
                    expected,
                    got,
                });
            }
        }
        concat_extent += shape.dims()[axis];
    }
    dims[axis] = concat_extent;
    Ok(Shape::new(dims))
}
