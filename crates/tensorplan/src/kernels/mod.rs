//! Kernel dispatch: a lookup keyed by (device, operator kind) returning the
//! callable that performs the numeric work against bound tensor storage.

mod cpu;

pub use cpu::{ConcatKernel, TransposeKernel};

use std::collections::HashMap;

use anyhow::{anyhow, Context, Result};
use once_cell::sync::Lazy;

use crate::graph::Graph;
use crate::ops::{OpType, Operator};
use crate::runtime::Device;

/// One numeric kernel; reads and writes tensor storage planned by the graph.
pub trait Kernel: Send + Sync {
    fn name(&self) -> &'static str;

    fn compute(&self, op: &Operator, graph: &Graph) -> Result<()>;
}

/// Kernel table keyed by (device tag, operator kind).
#[derive(Default)]
pub struct KernelRegistry {
    kernels: HashMap<(Device, OpType), Box<dyn Kernel>>,
}

impl KernelRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry preloaded with the naive CPU kernel set. Matmul carries no
    /// CPU kernel; dispatching it reports an unsupported operator.
    pub fn with_cpu_kernels() -> Self {
        let mut registry = Self::new();
        registry.register(Device::Cpu, OpType::Transpose, Box::new(TransposeKernel));
        registry.register(Device::Cpu, OpType::Concat, Box::new(ConcatKernel));
        registry
    }

    pub fn register(&mut self, device: Device, op_type: OpType, kernel: Box<dyn Kernel>) {
        self.kernels.insert((device, op_type), kernel);
    }

    pub fn get(&self, device: Device, op_type: OpType) -> Option<&dyn Kernel> {
        self.kernels.get(&(device, op_type)).map(Box::as_ref)
    }
}

static GLOBAL_REGISTRY: Lazy<KernelRegistry> = Lazy::new(KernelRegistry::with_cpu_kernels);

/// Process-wide default registry holding the built-in kernels.
pub fn global_registry() -> &'static KernelRegistry {
    &GLOBAL_REGISTRY
}

/// Executes every operator of the graph in dependency order through the
/// registry. Requires [`Graph::data_malloc`] to have bound tensor storage.
pub fn execute(graph: &mut Graph, registry: &KernelRegistry) -> Result<()> {
    graph
        .topo_sort()
        .map_err(|err| anyhow!("cannot execute an unschedulable graph: {err}"))?;
    let device = graph.runtime().device();

    let ops: Vec<Operator> = graph.ops().to_vec();
    for op in &ops {
        let kernel = registry.get(device, op.op_type()).ok_or_else(|| {
            anyhow!(
                "unsupported operator: no kernel registered for ({device}, {:?})",
                op.op_type()
            )
        })?;
        kernel
            .compute(op, graph)
            .with_context(|| format!("kernel {} failed for {op}", kernel.name()))?;
    }
    Ok(())
}
