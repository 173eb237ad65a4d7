//! Matrix-multiply shape inference with ONNX-style batch broadcasting.

use serde::{Deserialize, Serialize};

use crate::tensor::Shape;
use crate::utils::{infer_broadcast, ShapeError};

/// Derived matmul scalars, recorded on the operator after inference.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatmulDims {
    pub m: usize,
    pub n: usize,
    pub k: usize,
}

/// Infers the output shape of `A x B` under the given transpose flags.
///
/// The trailing two axes of each operand are the matrix dimensions; any
/// leading axes are batch dimensions resolved by right-aligned
/// bidirectional broadcasting before `[m, n]` is appended. The contraction
/// dimension must agree between the operands.
pub fn infer_matmul(
    a: &Shape,
    b: &Shape,
    trans_a: bool,
    trans_b: bool,
) -> Result<(Shape, MatmulDims), ShapeError> {
    let rank_a = a.rank();
    let rank_b = b.rank();
    if rank_a < 2 || rank_b < 2 {
        return Err(ShapeError::MatmulRankTooLow {
            lhs_rank: rank_a,
            rhs_rank: rank_b,
        });
    }

    let dims_a = a.dims();
    let dims_b = b.dims();
    let (m, k_from_a) = if trans_a {
        (dims_a[rank_a - 1], dims_a[rank_a - 2])
    } else {
        (dims_a[rank_a - 2], dims_a[rank_a - 1])
    };
    let (k_from_b, n) = if trans_b {
        (dims_b[rank_b - 1], dims_b[rank_b - 2])
    } else {
        (dims_b[rank_b - 2], dims_b[rank_b - 1])
    };
    if k_from_a != k_from_b {
        return Err(ShapeError::ContractionMismatch {
            lhs_k: k_from_a,
            rhs_k: k_from_b,
        });
    }

    let mut out = if rank_a > 2 || rank_b > 2 {
        let batch_a = Shape::new([&dims_a[..rank_a - 2], &[1]].concat());
        let batch_b = Shape::new([&dims_b[..rank_b - 2], &[1]].concat());
        let batch = infer_broadcast(&batch_a, &batch_b)?;
        let batch_dims = batch.dims();
        batch_dims[..batch_dims.len() - 1].to_vec()
    } else {
        Vec::new()
    };
    out.push(m);
    out.push(n);

    Ok((Shape::new(out), MatmulDims { m, n, k: k_from_a }))
}
