use tensorplan::{CpuRuntime, DType, Graph, OpKind};

#[test]
fn wiring_derives_predecessor_and_successor_edges() {
    let mut graph = Graph::new(CpuRuntime::new());
    let a = graph.add_tensor([2, 3], DType::F32);
    let b = graph.add_tensor([3, 2], DType::F32);
    let c = graph.add_tensor([3, 2], DType::F32);

    let first = graph.add_op(OpKind::transpose([1, 0]), &[a], &[b]);
    let second = graph.add_op(OpKind::concat(0), &[b], &[c]);
    graph.check_valid();

    assert_eq!(graph.tensor(a).targets(), &[first]);
    assert_eq!(graph.tensor(b).source(), Some(first));
    assert_eq!(graph.tensor(b).targets(), &[second]);
    assert_eq!(graph.op(first).successors(), &[second]);
    assert_eq!(graph.op(second).predecessors(), &[first]);
}

#[test]
fn operators_may_be_added_in_any_order() {
    let mut graph = Graph::new(CpuRuntime::new());
    let a = graph.add_tensor([4, 4], DType::F32);
    let b = graph.add_tensor([4, 4], DType::F32);
    let c = graph.add_tensor([4, 4], DType::F32);

    // Downstream operator first; edges must still come out consistent.
    let late = graph.add_op(OpKind::transpose([1, 0]), &[b], &[c]);
    let early = graph.add_op(OpKind::transpose([1, 0]), &[a], &[b]);
    graph.check_valid();

    assert_eq!(graph.op(late).predecessors(), &[early]);
    assert_eq!(graph.op(early).successors(), &[late]);

    graph.topo_sort().expect("acyclic graph must sort");
    let order: Vec<_> = graph.ops().iter().map(|op| op.id()).collect();
    assert_eq!(order, vec![early, late]);
}

#[test]
fn topo_sort_orders_every_operator_after_its_producers() {
    let mut graph = Graph::new(CpuRuntime::new());
    let a = graph.add_tensor([2, 2], DType::F32);
    let b = graph.add_tensor([2, 2], DType::F32);
    let c = graph.add_tensor([2, 2], DType::F32);
    let d = graph.add_tensor([2, 4], DType::F32);

    let concat = graph.add_op(OpKind::concat(1), &[b, c], &[d]);
    let t1 = graph.add_op(OpKind::transpose([1, 0]), &[a], &[b]);
    let t2 = graph.add_op(OpKind::transpose([1, 0]), &[a], &[c]);
    graph.check_valid();
    graph.topo_sort().expect("acyclic graph must sort");

    let position = |target| {
        graph
            .ops()
            .iter()
            .position(|op| op.id() == target)
            .expect("operator missing after sort")
    };
    assert!(position(t1) < position(concat));
    assert!(position(t2) < position(concat));
}

#[test]
fn topo_sort_reports_a_cycle() {
    let mut graph = Graph::new(CpuRuntime::new());
    let a = graph.add_tensor([2, 2], DType::F32);
    let b = graph.add_tensor([2, 2], DType::F32);

    graph.add_op(OpKind::transpose([1, 0]), &[a], &[b]);
    graph.add_op(OpKind::transpose([1, 0]), &[b], &[a]);

    let err = graph.topo_sort().expect_err("cycle must be reported");
    assert_eq!(err.remaining, 2);
}

#[test]
fn topo_sort_result_is_cached_until_mutation() {
    let mut graph = Graph::new(CpuRuntime::new());
    let a = graph.add_tensor([2, 2], DType::F32);
    let b = graph.add_tensor([2, 2], DType::F32);
    graph.add_op(OpKind::transpose([1, 0]), &[a], &[b]);

    graph.topo_sort().expect("acyclic graph must sort");
    graph.topo_sort().expect("cached result stays valid");

    // A structural mutation invalidates the cache and re-sorts cleanly.
    let c = graph.add_tensor([2, 2], DType::F32);
    graph.add_op(OpKind::transpose([1, 0]), &[b], &[c]);
    graph.topo_sort().expect("mutated graph must re-sort");
    assert_eq!(graph.ops().len(), 2);
}

#[test]
#[should_panic(expected = "orphan tensor")]
fn orphan_tensors_fail_validation() {
    let mut graph = Graph::new(CpuRuntime::new());
    let a = graph.add_tensor([2, 2], DType::F32);
    let b = graph.add_tensor([2, 2], DType::F32);
    graph.add_op(OpKind::transpose([1, 0]), &[a], &[b]);
    graph.add_tensor([5], DType::F32);
    graph.check_valid();
}

#[test]
#[should_panic(expected = "dangling tensor reference")]
fn dangling_tensor_references_fail_fast() {
    let mut graph = Graph::new(CpuRuntime::new());
    let a = graph.add_tensor([2, 2], DType::F32);
    let mut other = Graph::new(CpuRuntime::new());
    let _ = other.add_tensor([2, 2], DType::F32);
    let foreign = other.add_tensor([9, 9], DType::F32);
    // `foreign` has a fuid the first graph never issued.
    graph.add_op(OpKind::transpose([1, 0]), &[a], &[foreign]);
}

#[test]
fn debug_dump_lists_tensors_and_operators() {
    let mut graph = Graph::new(CpuRuntime::new());
    let a = graph.add_tensor([2, 3], DType::F32);
    let b = graph.add_tensor([3, 2], DType::F32);
    graph.add_op(OpKind::transpose([1, 0]), &[a], &[b]);

    let dump = graph.to_string();
    assert!(dump.contains("Graph Tensors:"));
    assert!(dump.contains("Graph operators:"));
    assert!(dump.contains("shape [2,3]"));
    assert!(dump.contains("Transpose"));
}
