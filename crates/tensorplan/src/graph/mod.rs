//! Graph ownership, construction, validity, scheduling, and memory planning.
//!
//! The graph owns flat tables of tensors and operators; every edge between
//! them is a stable id into those tables, so deleting a node during
//! optimization is a table removal plus edge-list cleanup, with no
//! reference cycles anywhere.

mod allocator;
mod optimizer;

pub use allocator::Allocator;

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use smallvec::SmallVec;
use thiserror::Error;

use crate::ids::{OpId, TensorId};
use crate::ops::{OpKind, Operator};
use crate::runtime::{Runtime, StorageHandle};
use crate::tensor::{DType, Shape, Tensor};

/// Raised by [`Graph::topo_sort`] when a sweep places no operator: the
/// remaining subgraph is cyclic. This is the one recoverable error in the
/// planning core; a cyclic graph is a legitimate caller mistake to catch.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("graph contains a cycle: {remaining} operators have unsatisfiable inputs")]
pub struct CycleError {
    pub remaining: usize,
}

/// Directed acyclic graph of tensors and operators, with one arena planner.
pub struct Graph {
    runtime: Arc<dyn Runtime>,
    tensors: Vec<Tensor>,
    ops: Vec<Operator>,
    sorted: bool,
    allocator: Allocator,
    next_tensor_id: u32,
    next_op_id: u32,
}

impl Graph {
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        Graph {
            allocator: Allocator::new(Arc::clone(&runtime)),
            runtime,
            tensors: Vec::new(),
            ops: Vec::new(),
            sorted: false,
            next_tensor_id: 0,
            next_op_id: 0,
        }
    }

    pub fn runtime(&self) -> &Arc<dyn Runtime> {
        &self.runtime
    }

    pub fn tensors(&self) -> &[Tensor] {
        &self.tensors
    }

    /// Operators in insertion order, or in dependency order after a
    /// successful [`Graph::topo_sort`].
    pub fn ops(&self) -> &[Operator] {
        &self.ops
    }

    pub fn allocator(&self) -> &Allocator {
        &self.allocator
    }

    /// Creates and registers a tensor with a fresh FUID.
    pub fn add_tensor<D: Into<Vec<usize>>>(&mut self, dims: D, dtype: DType) -> TensorId {
        let id = TensorId(self.next_tensor_id);
        self.next_tensor_id += 1;
        self.tensors.push(Tensor::new(id, Shape::new(dims), dtype));
        id
    }

    /// Inserts an operator and derives all edges from the tensors' current
    /// producer/consumer state, so operators may be added in any order.
    pub fn add_op(&mut self, kind: OpKind, inputs: &[TensorId], outputs: &[TensorId]) -> OpId {
        match &kind {
            OpKind::MatMul { .. } => {
                assert!(
                    inputs.len() == 2 && outputs.len() == 1,
                    "matmul takes 2 inputs and 1 output, got {}/{}",
                    inputs.len(),
                    outputs.len()
                );
            }
            OpKind::Transpose { .. } => {
                assert!(
                    inputs.len() == 1 && outputs.len() == 1,
                    "transpose takes 1 input and 1 output, got {}/{}",
                    inputs.len(),
                    outputs.len()
                );
            }
            OpKind::Concat { .. } => {
                assert!(
                    !inputs.is_empty() && outputs.len() == 1,
                    "concat takes >=1 inputs and 1 output, got {}/{}",
                    inputs.len(),
                    outputs.len()
                );
            }
        }
        for id in inputs.iter().chain(outputs) {
            assert!(
                self.find_tensor(*id).is_some(),
                "dangling tensor reference {id} in new operator"
            );
        }

        let id = OpId(self.next_op_id);
        self.next_op_id += 1;
        self.sorted = false;
        self.ops.push(Operator::new(id, kind, inputs, outputs));

        for &input in inputs {
            self.tensor_mut(input).add_target(id);
            if let Some(pred) = self.tensor(input).source() {
                self.op_mut(pred).add_successor(id);
                self.op_mut(id).add_predecessor(pred);
            }
        }
        for &output in outputs {
            self.tensor_mut(output).set_source(id);
            let consumers: SmallVec<[OpId; 4]> =
                self.tensor(output).targets().iter().copied().collect();
            for succ in consumers {
                self.op_mut(succ).add_predecessor(id);
                self.op_mut(id).add_successor(succ);
            }
        }
        id
    }

    pub fn find_tensor(&self, id: TensorId) -> Option<&Tensor> {
        self.tensors.iter().find(|tensor| tensor.id() == id)
    }

    /// Looks a tensor up by its FUID; a missing id is a dangling reference
    /// and panics.
    pub fn tensor(&self, id: TensorId) -> &Tensor {
        self.find_tensor(id)
            .unwrap_or_else(|| panic!("dangling tensor reference {id}"))
    }

    pub fn find_op(&self, id: OpId) -> Option<&Operator> {
        self.ops.iter().find(|op| op.id() == id)
    }

    pub fn op(&self, id: OpId) -> &Operator {
        self.find_op(id)
            .unwrap_or_else(|| panic!("dangling operator reference {id}"))
    }

    fn tensor_mut(&mut self, id: TensorId) -> &mut Tensor {
        self.tensors
            .iter_mut()
            .find(|tensor| tensor.id() == id)
            .unwrap_or_else(|| panic!("dangling tensor reference {id}"))
    }

    fn op_mut(&mut self, id: OpId) -> &mut Operator {
        self.ops
            .iter_mut()
            .find(|op| op.id() == id)
            .unwrap_or_else(|| panic!("dangling operator reference {id}"))
    }

    /// Re-verifies every structural invariant; panics naming the offending
    /// entity. Intended to run after every structural mutation in tests.
    ///
    /// Checked invariants:
    /// - no orphan tensors (neither source nor targets);
    /// - tensor↔operator edges are mutually consistent in both directions;
    /// - predecessor/successor sets agree with tensor producer/consumer
    ///   edges;
    /// - FUIDs are unique within the graph.
    pub fn check_valid(&self) {
        for tensor in &self.tensors {
            assert!(
                tensor.source().is_some() || !tensor.targets().is_empty(),
                "orphan tensor in graph: {tensor}"
            );
            for &target in tensor.targets() {
                let op = self
                    .find_op(target)
                    .unwrap_or_else(|| panic!("tensor {tensor} targets missing operator {target}"));
                assert!(
                    op.inputs().contains(&tensor.id()),
                    "tensor {tensor} lists {target} as target, but that operator does not read it"
                );
            }
            if let Some(source) = tensor.source() {
                let op = self
                    .find_op(source)
                    .unwrap_or_else(|| panic!("tensor {tensor} names missing source {source}"));
                assert!(
                    op.outputs().contains(&tensor.id()),
                    "tensor {tensor} names {source} as source, but that operator does not write it"
                );
            }
        }
        for op in &self.ops {
            for &input in op.inputs() {
                let tensor = self
                    .find_tensor(input)
                    .unwrap_or_else(|| panic!("operator {op} reads missing tensor {input}"));
                assert!(
                    tensor.targets().contains(&op.id()),
                    "operator {op} reads {input}, but the tensor does not list it as target"
                );
            }
            for &output in op.outputs() {
                let tensor = self
                    .find_tensor(output)
                    .unwrap_or_else(|| panic!("operator {op} writes missing tensor {output}"));
                assert_eq!(
                    tensor.source(),
                    Some(op.id()),
                    "operator {op} writes {output}, but the tensor names a different source"
                );
            }
            for &pred in op.predecessors() {
                let pred_op = self
                    .find_op(pred)
                    .unwrap_or_else(|| panic!("operator {op} names missing predecessor {pred}"));
                assert!(
                    op.inputs()
                        .iter()
                        .any(|&input| self.tensor(input).source() == Some(pred)),
                    "operator {op} names predecessor {}, but consumes none of its outputs",
                    pred_op.id()
                );
            }
            for &succ in op.successors() {
                let succ_op = self
                    .find_op(succ)
                    .unwrap_or_else(|| panic!("operator {op} names missing successor {succ}"));
                assert!(
                    op.outputs()
                        .iter()
                        .any(|&output| self.tensor(output).targets().contains(&succ)),
                    "operator {op} names successor {}, but feeds none of its inputs",
                    succ_op.id()
                );
            }
        }
        let mut fuids = HashSet::new();
        for tensor in &self.tensors {
            assert!(
                fuids.insert(tensor.id()),
                "duplicate FUID {} in graph",
                tensor.id()
            );
        }
    }

    /// Reorders the operator list into a dependency-respecting order, or
    /// reports a cycle. The result is cached until the next structural
    /// mutation.
    ///
    /// Repeatedly sweeps the unsorted set; an operator is placed once every
    /// input either has no source or a source already placed. A sweep that
    /// places nothing proves the remainder cyclic.
    pub fn topo_sort(&mut self) -> Result<(), CycleError> {
        if self.sorted {
            return Ok(());
        }

        let mut placed: HashSet<OpId> = HashSet::with_capacity(self.ops.len());
        let mut order: Vec<usize> = Vec::with_capacity(self.ops.len());
        while order.len() < self.ops.len() {
            let mut modified = false;
            for (index, op) in self.ops.iter().enumerate() {
                if placed.contains(&op.id()) {
                    continue;
                }
                let ready = op.inputs().iter().all(|&input| {
                    match self.tensor(input).source() {
                        None => true,
                        Some(source) => placed.contains(&source),
                    }
                });
                if ready {
                    placed.insert(op.id());
                    order.push(index);
                    modified = true;
                }
            }
            if !modified {
                return Err(CycleError {
                    remaining: self.ops.len() - order.len(),
                });
            }
        }

        let mut slots: Vec<Option<Operator>> = self.ops.drain(..).map(Some).collect();
        self.ops = order
            .into_iter()
            .map(|index| slots[index].take().expect("operator placed twice"))
            .collect();
        self.sorted = true;
        Ok(())
    }

    /// Applies the local rewrite rules until a fixpoint is reached. The
    /// external inputs/outputs and the numerical result of the graph are
    /// preserved; the operator and tensor counts only shrink.
    pub fn optimize(&mut self) {
        optimizer::run_to_fixpoint(self);
    }

    /// Runs operators in their current order, re-deriving every output
    /// shape from the current input shapes. Changed shapes are written back
    /// through FUID lookup; derived matmul (m, n, k) scalars are stored on
    /// the operator in a separate explicit step. Incompatible shapes are a
    /// contract violation and panic.
    pub fn shape_infer(&mut self) {
        for index in 0..self.ops.len() {
            let (inferred, output) = {
                let op = &self.ops[index];
                let input_shapes: Vec<&Shape> = op
                    .inputs()
                    .iter()
                    .map(|&input| self.tensor(input).shape())
                    .collect();
                let inferred = op.infer_shape(&input_shapes).unwrap_or_else(|err| {
                    panic!("shape inference failed for {op}: {err}");
                });
                (inferred, op.outputs()[0])
            };

            if let Some(dims) = inferred.matmul_dims {
                match self.ops[index].kind_mut() {
                    OpKind::MatMul {
                        dims: stored_dims, ..
                    } => *stored_dims = dims,
                    kind => panic!("matmul dims inferred for non-matmul kind {kind:?}"),
                }
            }
            if self.tensor(output).shape() != &inferred.output {
                self.tensor_mut(output).set_shape(inferred.output);
            }
        }
    }

    /// Plans an offset for every tensor, commits one physical buffer sized
    /// to the high-water mark, and binds each planned tensor to its range.
    ///
    /// Source-less tensors (graph inputs) are planned first in creation
    /// order; operator outputs are planned in sorted order, and every
    /// tensor is released back to the arena right after its last reader,
    /// so non-overlapping live ranges share bytes.
    pub fn data_malloc(&mut self) -> Result<(), CycleError> {
        self.topo_sort()?;

        let mut last_use: HashMap<TensorId, usize> = HashMap::new();
        for (index, op) in self.ops.iter().enumerate() {
            for &id in op.inputs().iter().chain(op.outputs()) {
                last_use.insert(id, index);
            }
        }

        let mut offsets: HashMap<TensorId, usize> = HashMap::new();
        let graph_inputs: Vec<(TensorId, usize)> = self
            .tensors
            .iter()
            .filter(|tensor| tensor.source().is_none())
            .map(|tensor| (tensor.id(), tensor.bytes()))
            .collect();
        for (id, bytes) in graph_inputs {
            offsets.insert(id, self.allocator.alloc(bytes));
        }

        for index in 0..self.ops.len() {
            let outputs: SmallVec<[(TensorId, usize); 1]> = self.ops[index]
                .outputs()
                .iter()
                .map(|&id| (id, self.tensor(id).bytes()))
                .collect();
            for (id, bytes) in outputs {
                offsets.insert(id, self.allocator.alloc(bytes));
            }

            let mut seen: SmallVec<[TensorId; 2]> = SmallVec::new();
            let inputs: SmallVec<[TensorId; 2]> =
                self.ops[index].inputs().iter().copied().collect();
            for id in inputs {
                if seen.contains(&id) {
                    continue;
                }
                seen.push(id);
                if last_use.get(&id) == Some(&index) {
                    if let Some(&offset) = offsets.get(&id) {
                        let bytes = self.tensor(id).bytes();
                        self.allocator.free(offset, bytes);
                    }
                }
            }
        }

        let buffer = self.allocator.commit();
        for (id, offset) in offsets {
            self.tensor_mut(id)
                .bind_storage(StorageHandle::new(Arc::clone(&buffer), offset));
        }
        self.allocator.info();
        Ok(())
    }

    // Rewrite-side helpers; every structural change funnels through these
    // so the sorted cache and derived edges stay coherent.

    pub(crate) fn remove_tensor(&mut self, id: TensorId) {
        self.tensors.retain(|tensor| tensor.id() != id);
    }

    pub(crate) fn remove_op(&mut self, id: OpId) {
        self.ops.retain(|op| op.id() != id);
    }

    /// Recomputes predecessor/successor sets from tensor producer/consumer
    /// edges and invalidates the sorted cache. Called after every rewrite.
    pub(crate) fn finish_rewrite(&mut self) {
        self.sorted = false;
        for op in &mut self.ops {
            op.clear_derived_edges();
        }
        let mut pred_pairs: Vec<(OpId, OpId)> = Vec::new();
        let mut succ_pairs: Vec<(OpId, OpId)> = Vec::new();
        for op in &self.ops {
            for &input in op.inputs() {
                if let Some(source) = self.tensor(input).source() {
                    pred_pairs.push((op.id(), source));
                }
            }
            for &output in op.outputs() {
                for &target in self.tensor(output).targets() {
                    succ_pairs.push((op.id(), target));
                }
            }
        }
        for (op, pred) in pred_pairs {
            self.op_mut(op).add_predecessor(pred);
        }
        for (op, succ) in succ_pairs {
            self.op_mut(op).add_successor(succ);
        }
    }
}

impl fmt::Display for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Graph Tensors:")?;
        for tensor in &self.tensors {
            writeln!(f, "{tensor}")?;
        }
        writeln!(f, "Graph operators:")?;
        for op in &self.ops {
            let preds: Vec<u64> = op
                .predecessors()
                .iter()
                .map(|&id| self.op(id).guid().0)
                .collect();
            let succs: Vec<u64> = op
                .successors()
                .iter()
                .map(|&id| self.op(id).guid().0)
                .collect();
            writeln!(f, "OP {}, pred {:?}, succ {:?}, {op}", op.guid(), preds, succs)?;
        }
        Ok(())
    }
}
