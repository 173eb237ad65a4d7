//! Operator nodes and the closed set of operator kinds.
//!
//! Kind-specific attributes live in the [`OpKind`] tagged variant; every
//! site that needs a permutation, transpose flag, or concat axis matches on
//! it exhaustively, so adding a kind is a compile-checked change.

mod concat;
mod matmul;
mod transpose;

pub use concat::infer_concat;
pub use matmul::{infer_matmul, MatmulDims};
pub use transpose::{infer_transpose, is_inverse_perm, swaps_last_two_axes};

use std::fmt;

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

use crate::ids::{Guid, OpId, TensorId};
use crate::tensor::Shape;
use crate::utils::ShapeError;

/// Attribute-free operator tag; the operator half of the kernel-dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OpType {
    MatMul,
    Transpose,
    Concat,
}

/// Closed tagged variant of all operator kinds and their attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum OpKind {
    MatMul {
        trans_a: bool,
        trans_b: bool,
        /// Derived (m, n, k); recorded by shape inference, zero before.
        dims: MatmulDims,
    },
    Transpose {
        perm: Vec<usize>,
    },
    Concat {
        /// May be negative; resolved against the rank at inference time.
        axis: isize,
    },
}

impl OpKind {
    pub fn matmul(trans_a: bool, trans_b: bool) -> Self {
        OpKind::MatMul {
            trans_a,
            trans_b,
            dims: MatmulDims::default(),
        }
    }

    pub fn transpose<P: Into<Vec<usize>>>(perm: P) -> Self {
        OpKind::Transpose { perm: perm.into() }
    }

    pub fn concat(axis: isize) -> Self {
        OpKind::Concat { axis }
    }

    pub fn op_type(&self) -> OpType {
        match self {
            OpKind::MatMul { .. } => OpType::MatMul,
            OpKind::Transpose { .. } => OpType::Transpose,
            OpKind::Concat { .. } => OpType::Concat,
        }
    }
}

/// Typed compute node: ordered tensor edges plus derived operator edges.
///
/// Input/output lists are the only edges shape inference reads; the
/// predecessor/successor sets are derived from tensor producer/consumer
/// edges and kept consistent with them by the owning graph.
#[derive(Debug, Clone)]
pub struct Operator {
    guid: Guid,
    id: OpId,
    kind: OpKind,
    inputs: SmallVec<[TensorId; 2]>,
    outputs: SmallVec<[TensorId; 1]>,
    predecessors: SmallVec<[OpId; 4]>,
    successors: SmallVec<[OpId; 4]>,
}

impl Operator {
    pub(crate) fn new(id: OpId, kind: OpKind, inputs: &[TensorId], outputs: &[TensorId]) -> Self {
        Operator {
            guid: Guid::next(),
            id,
            kind,
            inputs: inputs.iter().copied().collect(),
            outputs: outputs.iter().copied().collect(),
            predecessors: SmallVec::new(),
            successors: SmallVec::new(),
        }
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    pub fn id(&self) -> OpId {
        self.id
    }

    pub fn kind(&self) -> &OpKind {
        &self.kind
    }

    pub fn op_type(&self) -> OpType {
        self.kind.op_type()
    }

    pub fn inputs(&self) -> &[TensorId] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[TensorId] {
        &self.outputs
    }

    pub fn predecessors(&self) -> &[OpId] {
        &self.predecessors
    }

    pub fn successors(&self) -> &[OpId] {
        &self.successors
    }

    /// Runs the pure shape-inference function for this operator kind over
    /// the given input shapes. Derived matmul dims are returned to the
    /// caller, never written here.
    pub fn infer_shape(&self, input_shapes: &[&Shape]) -> Result<InferredShape, ShapeError> {
        match &self.kind {
            OpKind::MatMul {
                trans_a, trans_b, ..
            } => {
                let (shape, dims) =
                    infer_matmul(input_shapes[0], input_shapes[1], *trans_a, *trans_b)?;
                Ok(InferredShape {
                    output: shape,
                    matmul_dims: Some(dims),
                })
            }
            OpKind::Transpose { perm } => Ok(InferredShape {
                output: infer_transpose(input_shapes[0], perm)?,
                matmul_dims: None,
            }),
            OpKind::Concat { axis } => Ok(InferredShape {
                output: infer_concat(input_shapes, *axis)?,
                matmul_dims: None,
            }),
        }
    }

    pub(crate) fn kind_mut(&mut self) -> &mut OpKind {
        &mut self.kind
    }

    pub(crate) fn replace_input(&mut self, from: TensorId, to: TensorId) {
        for input in &mut self.inputs {
            if *input == from {
                *input = to;
            }
        }
    }

    pub(crate) fn add_predecessor(&mut self, op: OpId) {
        if !self.predecessors.contains(&op) {
            self.predecessors.push(op);
        }
    }

    pub(crate) fn add_successor(&mut self, op: OpId) {
        if !self.successors.contains(&op) {
            self.successors.push(op);
        }
    }

    pub(crate) fn clear_derived_edges(&mut self) {
        self.predecessors.clear();
        self.successors.clear();
    }
}

/// Result of one pure shape-inference call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InferredShape {
    pub output: Shape,
    /// Present only for matmul; stored on the operator in a distinct step.
    pub matmul_dims: Option<MatmulDims>,
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.kind {
            OpKind::MatMul {
                trans_a,
                trans_b,
                dims,
            } => write!(
                f,
                "Matmul[{}]([{},{}],A={},B={},C={},mnk=[{},{},{}])",
                self.guid,
                if *trans_a { "A^T" } else { "A" },
                if *trans_b { "B^T" } else { "B" },
                self.inputs[0],
                self.inputs[1],
                self.outputs[0],
                dims.m,
                dims.n,
                dims.k
            ),
            OpKind::Transpose { perm } => write!(
                f,
                "Transpose[{}](perm={:?},input={},output={})",
                self.guid, perm, self.inputs[0], self.outputs[0]
            ),
            OpKind::Concat { axis } => {
                write!(f, "Concat[{}](axis={},input=", self.guid, axis)?;
                for input in &self.inputs {
                    write!(f, "{input},")?;
                }
                write!(f, "output={})", self.outputs[0])
            }
        }
    }
}
