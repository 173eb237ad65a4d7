//! Middle-end of a tensor-computation engine.
//!
//! Represents a numeric computation as a DAG of operators and tensors,
//! rewrites it with algebraic simplifications, topologically schedules it,
//! and plans a single contiguous memory arena in which every intermediate
//! tensor lives during execution. Numeric kernels and physical memory are
//! external collaborators reached through the [`kernels`] dispatch table
//! and the [`runtime::Runtime`] contract.

pub mod graph;
pub mod ids;
pub mod kernels;
pub mod ops;
pub mod runtime;
pub mod tensor;
pub mod utils;

pub use graph::{Allocator, CycleError, Graph};
pub use ids::{Guid, OpId, TensorId};
pub use ops::{MatmulDims, OpKind, OpType, Operator};
pub use runtime::{Buffer, CpuRuntime, Device, Runtime, StorageHandle};
pub use tensor::{DType, Shape, Tensor};
