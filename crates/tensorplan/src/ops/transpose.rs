//! Transpose shape inference and permutation predicates.

use crate::tensor::Shape;
use crate::utils::ShapeError;

/// Validates `perm` against `input` and returns the permuted shape.
///
/// A permutation is valid when it has the input rank and mentions every
/// axis exactly once.
pub fn infer_transpose(input: &Shape, perm: &[usize]) -> Result<Shape, ShapeError> {
    let rank = input.rank();
    if perm.len() != rank {
        return Err(ShapeError::InvalidPermutation {
            perm: perm.to_vec(),
            rank,
        });
    }
    let mut seen = vec![false; rank];
    for &axis in perm {
        if axis >= rank || seen[axis] {
            return Err(ShapeError::InvalidPermutation {
                perm: perm.to_vec(),
                rank,
            });
        }
        seen[axis] = true;
    }

    let dims = input.dims();
    let out: Vec<usize> = perm.iter().map(|&axis| dims[axis]).collect();
    Ok(Shape::new(out))
}

/// True when `second` undoes `first`: `second[first[i]] == i` for all i.
pub fn is_inverse_perm(first: &[usize], second: &[usize]) -> bool {
    first.len() == second.len()
        && first
            .iter()
            .enumerate()
            .all(|(i, &p)| p < second.len() && second[p] == i)
}

/// True when the permutation swaps only the trailing two axes and is the
/// identity elsewhere. Such a transpose folds into a matmul transpose flag.
pub fn swaps_last_two_axes(perm: &[usize]) -> bool {
    let n = perm.len();
    if n < 2 {
        return false;
    }
    perm[..n - 2].iter().enumerate().all(|(i, &p)| p == i)
        && perm[n - 2] == n - 1
        && perm[n - 1] == n - 2
}
