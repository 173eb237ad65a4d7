//! Physical memory provider consumed by the arena planner.
//!
//! The planner never touches real memory until the whole arena layout is
//! known; at that point it asks a [`Runtime`] for a single [`Buffer`] sized
//! to the observed peak. Tensors reference that buffer through
//! [`StorageHandle`] pairs of (owning buffer, byte offset), so no tensor can
//! outlive the buffer it points into.

use std::fmt;
use std::sync::{Arc, Mutex};

/// Device tag used as half of the kernel-dispatch key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Device {
    Cpu,
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Device::Cpu => write!(f, "CPU"),
        }
    }
}

/// Memory provider contract: one `allocate` per arena lifetime; release
/// happens when the last [`StorageHandle`] drops the buffer.
pub trait Runtime: fmt::Debug + Send + Sync {
    fn device(&self) -> Device;
    fn allocate(&self, bytes: usize) -> Arc<Buffer>;
}

/// One contiguous physical region owned by a runtime.
///
/// Interior mutability lets kernels write disjoint planned ranges without
/// aliasing the planner's view of the graph.
pub struct Buffer {
    device: Device,
    bytes: Mutex<Vec<u8>>,
}

impl Buffer {
    fn new(device: Device, len: usize) -> Self {
        Buffer {
            device,
            bytes: Mutex::new(vec![0u8; len]),
        }
    }

    pub fn device(&self) -> Device {
        self.device
    }

    pub fn len(&self) -> usize {
        self.bytes.lock().expect("buffer poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies `len` bytes starting at `offset` out of the buffer.
    pub fn read(&self, offset: usize, len: usize) -> Vec<u8> {
        let bytes = self.bytes.lock().expect("buffer poisoned");
        assert!(
            offset + len <= bytes.len(),
            "buffer read out of range: [{offset}, {}) of {}",
            offset + len,
            bytes.len()
        );
        bytes[offset..offset + len].to_vec()
    }

    /// Copies `data` into the buffer starting at `offset`.
    pub fn write(&self, offset: usize, data: &[u8]) {
        let mut bytes = self.bytes.lock().expect("buffer poisoned");
        assert!(
            offset + data.len() <= bytes.len(),
            "buffer write out of range: [{offset}, {}) of {}",
            offset + data.len(),
            bytes.len()
        );
        bytes[offset..offset + data.len()].copy_from_slice(data);
    }
}

impl fmt::Debug for Buffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Buffer")
            .field("device", &self.device)
            .field("len", &self.len())
            .finish()
    }
}

/// Binding of a tensor to a byte range inside a committed arena buffer.
#[derive(Clone)]
pub struct StorageHandle {
    buffer: Arc<Buffer>,
    offset: usize,
}

impl StorageHandle {
    pub fn new(buffer: Arc<Buffer>, offset: usize) -> Self {
        StorageHandle { buffer, offset }
    }

    pub fn buffer(&self) -> &Arc<Buffer> {
        &self.buffer
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn read_bytes(&self, len: usize) -> Vec<u8> {
        self.buffer.read(self.offset, len)
    }

    pub fn write_bytes(&self, data: &[u8]) {
        self.buffer.write(self.offset, data);
    }

    /// Reads `count` little-endian f32 values from the bound range.
    pub fn read_f32(&self, count: usize) -> Vec<f32> {
        self.read_bytes(count * 4)
            .chunks_exact(4)
            .map(|chunk| f32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]))
            .collect()
    }

    /// Writes f32 values into the bound range in little-endian order.
    pub fn write_f32(&self, values: &[f32]) {
        let mut bytes = Vec::with_capacity(values.len() * 4);
        for value in values {
            bytes.extend_from_slice(&value.to_le_bytes());
        }
        self.write_bytes(&bytes);
    }
}

impl fmt::Debug for StorageHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StorageHandle")
            .field("device", &self.buffer.device())
            .field("offset", &self.offset)
            .finish()
    }
}

/// Host-memory runtime backing the CPU device.
#[derive(Debug, Default)]
pub struct CpuRuntime;

impl CpuRuntime {
    pub fn new() -> Arc<Self> {
        Arc::new(CpuRuntime)
    }
}

impl Runtime for CpuRuntime {
    fn device(&self) -> Device {
        Device::Cpu
    }

    fn allocate(&self, bytes: usize) -> Arc<Buffer> {
        Arc::new(Buffer::new(Device::Cpu, bytes))
    }
}
