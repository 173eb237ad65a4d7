//! Arena-style offset planner.
//!
//! Plans byte offsets inside one contiguous region before any physical
//! memory exists. The block list partitions `[0, used)` contiguously with
//! no gaps and never holds two adjacent free blocks; `peak` records the
//! high-water mark of `used` and determines the committed buffer size.

use std::fmt;
use std::sync::Arc;

use tracing::debug;

use crate::runtime::{Buffer, Runtime};
use crate::tensor::WIDEST_DTYPE_BYTES;

#[derive(Debug, Clone, Copy)]
struct Block {
    offset: usize,
    size: usize,
    free: bool,
}

/// Offset planner bound to a runtime; commits physical memory exactly once.
pub struct Allocator {
    runtime: Arc<dyn Runtime>,
    blocks: Vec<Block>,
    used: usize,
    peak: usize,
    alignment: usize,
    buffer: Option<Arc<Buffer>>,
}

impl Allocator {
    /// Constructs an empty arena. The alignment is the width of the
    /// longest supported element type.
    pub fn new(runtime: Arc<dyn Runtime>) -> Self {
        Allocator {
            runtime,
            blocks: Vec::new(),
            used: 0,
            peak: 0,
            alignment: WIDEST_DTYPE_BYTES,
            buffer: None,
        }
    }

    /// Current high edge of the partition, in bytes.
    pub fn used(&self) -> usize {
        self.used
    }

    /// Maximum `used` ever observed; the committed buffer size.
    pub fn peak(&self) -> usize {
        self.peak
    }

    pub fn alignment(&self) -> usize {
        self.alignment
    }

    /// Rounds a size up to the allocation granularity.
    pub fn aligned_size(&self, size: usize) -> usize {
        size.div_ceil(self.alignment) * self.alignment
    }

    /// Plans `size` bytes and returns the byte offset, first-fit over the
    /// free blocks with an exact split, appending at `used` when nothing
    /// fits. Misuse after [`Allocator::commit`] panics: offsets are frozen
    /// once physical memory exists.
    pub fn alloc(&mut self, size: usize) -> usize {
        assert!(
            self.buffer.is_none(),
            "allocator misuse: alloc after the arena pointer was committed"
        );
        let size = self.aligned_size(size);

        for index in 0..self.blocks.len() {
            let block = self.blocks[index];
            if !block.free || block.size < size {
                continue;
            }
            if block.size > size {
                // Split into an allocated prefix and a free remainder.
                self.blocks.insert(
                    index + 1,
                    Block {
                        offset: block.offset + size,
                        size: block.size - size,
                        free: true,
                    },
                );
            }
            let chosen = &mut self.blocks[index];
            chosen.size = size;
            chosen.free = false;
            return chosen.offset;
        }

        let offset = self.used;
        self.blocks.push(Block {
            offset,
            size,
            free: false,
        });
        self.used += size;
        self.peak = self.peak.max(self.used);
        offset
    }

    /// Returns a planned range to the arena. The block at `offset` must
    /// exist and be currently allocated with the same aligned size; any
    /// other call is a contract violation and panics.
    ///
    /// Freed space merges with free neighbours, and trailing free blocks
    /// are reclaimed so `used` tracks the true high edge. `peak` is never
    /// decreased.
    pub fn free(&mut self, offset: usize, size: usize) {
        assert!(
            self.buffer.is_none(),
            "allocator misuse: free after the arena pointer was committed"
        );
        let size = self.aligned_size(size);

        let index = self
            .blocks
            .iter()
            .position(|block| block.offset == offset)
            .unwrap_or_else(|| panic!("allocator misuse: free of unknown offset {offset}"));
        let block = &mut self.blocks[index];
        assert!(
            !block.free,
            "allocator misuse: double free at offset {offset}"
        );
        assert_eq!(
            block.size, size,
            "allocator misuse: free of {size} bytes at offset {offset} planned as {} bytes",
            block.size
        );
        block.free = true;

        // Merge with the following block, then with the preceding one.
        if index + 1 < self.blocks.len() && self.blocks[index + 1].free {
            self.blocks[index].size += self.blocks[index + 1].size;
            self.blocks.remove(index + 1);
        }
        if index > 0 && self.blocks[index - 1].free {
            self.blocks[index - 1].size += self.blocks[index].size;
            self.blocks.remove(index);
        }

        while let Some(last) = self.blocks.last() {
            if !last.free {
                break;
            }
            self.used -= last.size;
            self.blocks.pop();
        }
    }

    /// Commits the arena: on first call, requests `peak` bytes from the
    /// runtime and freezes the layout. Idempotent; later calls return the
    /// same buffer.
    pub fn commit(&mut self) -> Arc<Buffer> {
        if let Some(buffer) = &self.buffer {
            return Arc::clone(buffer);
        }
        let buffer = self.runtime.allocate(self.peak);
        debug!(
            bytes = self.peak,
            device = %self.runtime.device(),
            "arena committed"
        );
        self.buffer = Some(Arc::clone(&buffer));
        buffer
    }

    /// Reports current usage, mirroring the planner's view of the arena.
    pub fn info(&self) {
        debug!(used = self.used, peak = self.peak, "allocator usage");
    }
}

impl fmt::Debug for Allocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Allocator")
            .field("used", &self.used)
            .field("peak", &self.peak)
            .field("alignment", &self.alignment)
            .field("blocks", &self.blocks.len())
            .field("committed", &self.buffer.is_some())
            .finish()
    }
}
