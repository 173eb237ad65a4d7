//! Identifier newtypes shared by the graph data model.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Process-unique identifier assigned to every tensor and operator at
/// creation. Tensors and operators draw from the same counter, so a guid
/// names exactly one entity for the lifetime of the process. Used for
/// debug display and equality outside FUID scope.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Guid(pub u64);

static GUID_COUNTER: AtomicU64 = AtomicU64::new(0);

impl Guid {
    /// Reserves the next process-unique identifier.
    pub fn next() -> Self {
        Guid(GUID_COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for Guid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Stable functional identifier (FUID) of a tensor: graph-local,
/// sequential, unique within its graph, and stable across rewrite and
/// inference passes. All tensor edges in the graph are expressed through
/// this id rather than references.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TensorId(pub u32);

impl fmt::Display for TensorId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%t{}", self.0)
    }
}

/// Graph-local identifier of an operator node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct OpId(pub u32);

impl fmt::Display for OpId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "%op{}", self.0)
    }
}
