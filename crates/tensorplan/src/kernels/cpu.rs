//! Naive CPU kernels for the data-movement operators.
//!
//! Transpose and concat only move elements, so both kernels work on raw
//! element-width byte chunks and serve every dtype with one code path.

use anyhow::{anyhow, Result};

use crate::graph::Graph;
use crate::ids::TensorId;
use crate::ops::{OpKind, Operator};
use crate::runtime::StorageHandle;
use crate::tensor::Tensor;
use crate::utils::{delocate_index, locate_index, normalize_axis};

use super::Kernel;

fn bound_storage<'a>(graph: &'a Graph, id: TensorId) -> Result<(&'a Tensor, &'a StorageHandle)> {
    let tensor = graph.tensor(id);
    let storage = tensor
        .storage()
        .ok_or_else(|| anyhow!("tensor {id} has no bound storage; run data_malloc first"))?;
    Ok((tensor, storage))
}

/// Permutes axes by walking every output element and gathering the source
/// element through the permuted strides.
pub struct TransposeKernel;

impl Kernel for TransposeKernel {
    fn name(&self) -> &'static str {
        "transpose-naive-cpu"
    }

    fn compute(&self, op: &Operator, graph: &Graph) -> Result<()> {
        let OpKind::Transpose { perm } = op.kind() else {
            return Err(anyhow!("transpose kernel dispatched for {op}"));
        };
        let (input, in_storage) = bound_storage(graph, op.inputs()[0])?;
        let (output, out_storage) = bound_storage(graph, op.outputs()[0])?;

        let elem = input.dtype().size_in_bytes();
        let in_strides = input.shape().strides();
        let out_shape = output.shape();
        let count = out_shape.num_elements();
        // Stride of output axis `a` in the input is the stride of the axis
        // it was drawn from, so one gather per element suffices.
        let gather_strides: Vec<usize> = perm.iter().map(|&axis| in_strides[axis]).collect();

        let src = in_storage.read_bytes(input.bytes());
        let mut dst = vec![0u8; output.bytes()];
        for out_index in 0..count {
            let coords = locate_index(out_index, out_shape);
            let in_index = delocate_index(&coords, &gather_strides);
            dst[out_index * elem..(out_index + 1) * elem]
                .copy_from_slice(&src[in_index * elem..(in_index + 1) * elem]);
        }
        out_storage.write_bytes(&dst);
        Ok(())
    }
}

/// Copies each input as contiguous per-outer-index blocks into its slice of
/// the concatenated axis.
pub struct ConcatKernel;

impl Kernel for ConcatKernel {
    fn name(&self) -> &'static str {
        "concat-naive-cpu"
    }

    fn compute(&self, op: &Operator, graph: &Graph) -> Result<()> {
        let OpKind::Concat { axis } = op.kind() else {
            return Err(anyhow!("concat kernel dispatched for {op}"));
        };
        let (output, out_storage) = bound_storage(graph, op.outputs()[0])?;
        let out_dims = output.shape().dims().to_vec();
        let axis = normalize_axis(*axis, out_dims.len())?;
        let elem = output.dtype().size_in_bytes();

        let inner: usize = out_dims[axis + 1..].iter().product();
        let outer: usize = out_dims[..axis].iter().product();
        let out_block = out_dims[axis] * inner;

        let mut dst = vec![0u8; output.bytes()];
        let mut axis_offset = 0usize;
        for &id in op.inputs() {
            let (input, in_storage) = bound_storage(graph, id)?;
            let in_extent = input.shape().dims()[axis];
            let copy = in_extent * inner;
            let src = in_storage.read_bytes(input.bytes());
            for outer_index in 0..outer {
                let src_start = outer_index * copy * elem;
                let dst_start = (outer_index * out_block + axis_offset * inner) * elem;
                dst[dst_start..dst_start + copy * elem]
                    .copy_from_slice(&src[src_start..src_start + copy * elem]);
            }
            axis_offset += in_extent;
        }
        out_storage.write_bytes(&dst);
        Ok(())
    }
}
