//! Enumerates the scalar element types carried by graph tensors.

use serde::{Deserialize, Serialize};

/// Logical dtype identifier for tensor elements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DType {
    /// 32-bit floating point following IEEE-754 semantics.
    F32,
    /// 16-bit floating point with full mantissa (fp16).
    F16,
    /// 32-bit signed integer, primarily for index data.
    I32,
    /// 32-bit unsigned integer.
    U32,
    /// 64-bit signed integer; the widest supported element and therefore
    /// the allocator alignment granularity.
    I64,
}

/// Minimum allocation granularity: the byte width of the widest dtype.
pub const WIDEST_DTYPE_BYTES: usize = 8;

impl DType {
    /// Returns the number of bytes required per scalar element.
    pub fn size_in_bytes(self) -> usize {
        match self {
            DType::F32 => 4,
            DType::F16 => 2,
            DType::I32 => 4,
            DType::U32 => 4,
            DType::I64 => 8,
        }
    }

    /// Returns `true` when the dtype is a floating-point representation.
    pub fn is_float(self) -> bool {
        matches!(self, DType::F32 | DType::F16)
    }
}
