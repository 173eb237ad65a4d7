//! Fixpoint rewrite pass over the graph.
//!
//! Two local rules, each strictly shrinking the operator/tensor count, are
//! applied until neither matches. The rules act on disjoint local patterns,
//! so the fixpoint does not depend on scan order.

use tracing::debug;

use crate::ids::OpId;
use crate::ops::{is_inverse_perm, swaps_last_two_axes, OpKind};

use super::Graph;

trait RewriteRule {
    fn name(&self) -> &'static str;

    /// Applies the rule to the first matching site, if any.
    fn apply_once(&self, graph: &mut Graph) -> bool;
}

/// Deletes a transpose pair whose permutations undo each other, rewiring
/// the pair's consumers to the original input.
///
/// Matches a transpose whose sole output feeds exactly one consumer, itself
/// a transpose with the exact inverse permutation. Consumers of the second
/// transpose must exist; rewriting away a graph output would change the
/// visible result.
struct EliminateInverseTranspose;

impl RewriteRule for EliminateInverseTranspose {
    fn name(&self) -> &'static str {
        "eliminate-inverse-transpose"
    }

    fn apply_once(&self, graph: &mut Graph) -> bool {
        let mut matched = None;
        for op in graph.ops() {
            let OpKind::Transpose { perm: first } = op.kind() else {
                continue;
            };
            let mid = op.outputs()[0];
            let mid_tensor = graph.tensor(mid);
            let [next_id] = mid_tensor.targets() else {
                continue;
            };
            if *next_id == op.id() {
                continue;
            }
            let next = graph.op(*next_id);
            let OpKind::Transpose { perm: second } = next.kind() else {
                continue;
            };
            if !is_inverse_perm(first, second) {
                continue;
            }
            let out = next.outputs()[0];
            let consumers: Vec<OpId> = graph.tensor(out).targets().to_vec();
            if consumers.is_empty() {
                continue;
            }
            matched = Some((op.id(), *next_id, op.inputs()[0], mid, out, consumers));
            break;
        }

        let Some((first_id, second_id, input, mid, out, consumers)) = matched else {
            return false;
        };

        graph.tensor_mut(input).remove_target(first_id);
        for consumer in consumers {
            graph.op_mut(consumer).replace_input(out, input);
            graph.tensor_mut(input).add_target(consumer);
        }
        graph.remove_tensor(mid);
        graph.remove_tensor(out);
        graph.remove_op(first_id);
        graph.remove_op(second_id);
        graph.finish_rewrite();
        true
    }
}

/// Folds a last-two-axes transpose into the matmul consuming it by
/// flipping the matching transpose flag.
///
/// The transpose's output must have the matmul as its only consumer;
/// deleting a tensor still read elsewhere would change program semantics.
struct FuseTransposeIntoMatmul;

impl RewriteRule for FuseTransposeIntoMatmul {
    fn name(&self) -> &'static str {
        "fuse-transpose-into-matmul"
    }

    fn apply_once(&self, graph: &mut Graph) -> bool {
        let mut matched = None;
        'scan: for op in graph.ops() {
            let OpKind::MatMul { .. } = op.kind() else {
                continue;
            };
            if op.inputs()[0] == op.inputs()[1] {
                continue;
            }
            for operand in 0..2 {
                let transposed = op.inputs()[operand];
                let tensor = graph.tensor(transposed);
                let Some(source_id) = tensor.source() else {
                    continue;
                };
                if tensor.targets() != [op.id()] {
                    continue;
                }
                let source = graph.op(source_id);
                let OpKind::Transpose { perm } = source.kind() else {
                    continue;
                };
                if !swaps_last_two_axes(perm) {
                    continue;
                }
                matched = Some((op.id(), operand, source_id, transposed, source.inputs()[0]));
                break 'scan;
            }
        }

        let Some((matmul_id, operand, source_id, transposed, real_input)) = matched else {
            return false;
        };

        match graph.op_mut(matmul_id).kind_mut() {
            OpKind::MatMul {
                trans_a, trans_b, ..
            } => {
                if operand == 0 {
                    *trans_a = !*trans_a;
                } else {
                    *trans_b = !*trans_b;
                }
            }
            kind => panic!("matched matmul rewrote to non-matmul kind {kind:?}"),
        }
        graph.op_mut(matmul_id).replace_input(transposed, real_input);
        graph.tensor_mut(real_input).remove_target(source_id);
        graph.tensor_mut(real_input).add_target(matmul_id);
        graph.remove_tensor(transposed);
        graph.remove_op(source_id);
        graph.finish_rewrite();
        true
    }
}

/// Applies both rules until a fixpoint; returns the number of rewrites.
pub(crate) fn run_to_fixpoint(graph: &mut Graph) -> usize {
    let rules: [&dyn RewriteRule; 2] = [&EliminateInverseTranspose, &FuseTransposeIntoMatmul];
    let mut applied = 0usize;
    loop {
        let mut changed = false;
        for rule in rules {
            while rule.apply_once(graph) {
                debug!(rule = rule.name(), "rewrite applied");
                applied += 1;
                changed = true;
            }
        }
        if !changed {
            break;
        }
    }
    applied
}
