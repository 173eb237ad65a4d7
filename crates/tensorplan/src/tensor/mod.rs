//! Tensor value nodes: identity, shape, dtype, and non-owning graph edges.

mod dtype;
mod shape;

pub use dtype::{DType, WIDEST_DTYPE_BYTES};
pub use shape::Shape;

use std::fmt;

use smallvec::SmallVec;

use crate::ids::{Guid, OpId, TensorId};
use crate::runtime::StorageHandle;

/// Typed, shaped value node of a graph. Carries identity and edge
/// endpoints only; all compute lives on operators.
///
/// Edges are stored as ids into the owning graph's operator table, so the
/// tensor↔operator back-references form no ownership cycle.
#[derive(Debug, Clone)]
pub struct Tensor {
    guid: Guid,
    id: TensorId,
    shape: Shape,
    dtype: DType,
    /// Operator producing this tensor, if any.
    source: Option<OpId>,
    /// Operators consuming this tensor; insertion order is irrelevant.
    targets: SmallVec<[OpId; 4]>,
    /// Bound only after memory planning.
    storage: Option<StorageHandle>,
}

impl Tensor {
    pub(crate) fn new(id: TensorId, shape: Shape, dtype: DType) -> Self {
        Tensor {
            guid: Guid::next(),
            id,
            shape,
            dtype,
            source: None,
            targets: SmallVec::new(),
            storage: None,
        }
    }

    pub fn guid(&self) -> Guid {
        self.guid
    }

    /// The stable functional id (FUID) of this tensor within its graph.
    pub fn id(&self) -> TensorId {
        self.id
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Byte size derived from shape and element width.
    pub fn bytes(&self) -> usize {
        self.shape.num_elements() * self.dtype.size_in_bytes()
    }

    pub fn source(&self) -> Option<OpId> {
        self.source
    }

    pub fn targets(&self) -> &[OpId] {
        &self.targets
    }

    pub fn storage(&self) -> Option<&StorageHandle> {
        self.storage.as_ref()
    }

    /// Shape may be overwritten once construction is done, during shape
    /// inference only.
    pub(crate) fn set_shape(&mut self, shape: Shape) {
        self.shape = shape;
    }

    pub(crate) fn set_source(&mut self, op: OpId) {
        self.source = Some(op);
    }

    pub(crate) fn add_target(&mut self, op: OpId) {
        if !self.targets.contains(&op) {
            self.targets.push(op);
        }
    }

    pub(crate) fn remove_target(&mut self, op: OpId) {
        self.targets.retain(|id| *id != op);
    }

    pub(crate) fn bind_storage(&mut self, storage: StorageHandle) {
        self.storage = Some(storage);
    }
}

impl fmt::Display for Tensor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Tensor {}, Fuid {}, shape {}, dtype {:?}",
            self.guid, self.id.0, self.shape, self.dtype
        )
    }
}
